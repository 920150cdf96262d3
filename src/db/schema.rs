//! Core table schema
//!
//! Four logical stores: idempotency records, ledger entries + escrow
//! receipts, reconciliation runs + issues, and the chain-op queue.
//! Each is indexed by its primary lookup key.

use anyhow::Result;
use sqlx::PgPool;

/// Initialize Postgres schema for the core tables
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing core schema...");

    for (name, ddl) in STATEMENTS {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to apply schema '{}': {}", name, e))?;
    }

    tracing::info!("Core schema initialized successfully");
    Ok(())
}

const STATEMENTS: &[(&str, &str)] = &[
    (
        "idempotency_records_tb",
        r#"
        CREATE TABLE IF NOT EXISTS idempotency_records_tb (
            id              BIGSERIAL PRIMARY KEY,
            command_id      TEXT NOT NULL,
            user_id         BIGINT NOT NULL,
            route           TEXT NOT NULL,
            request_hash    TEXT NOT NULL,
            response_body   JSONB NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (command_id, user_id, route)
        )
        "#,
    ),
    (
        "ledger_entries_tb",
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries_tb (
            id              BIGSERIAL PRIMARY KEY,
            ledger_type     TEXT NOT NULL,
            account_ref     TEXT NOT NULL,
            direction       TEXT NOT NULL,
            amount          NUMERIC(38, 18) NOT NULL CHECK (amount >= 0),
            currency        TEXT NOT NULL,
            entity_type     TEXT NOT NULL,
            entity_id       TEXT NOT NULL,
            external_ref    TEXT,
            idempotency_key TEXT,
            metadata        JSONB NOT NULL DEFAULT '{}'::jsonb,
            posted_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "idx_ledger_account_time",
        r#"
        CREATE INDEX IF NOT EXISTS idx_ledger_account_time
            ON ledger_entries_tb (account_ref, posted_at)
        "#,
    ),
    (
        "idx_ledger_external_ref",
        r#"
        CREATE INDEX IF NOT EXISTS idx_ledger_external_ref
            ON ledger_entries_tb (external_ref) WHERE external_ref IS NOT NULL
        "#,
    ),
    (
        "escrow_receipts_tb",
        r#"
        CREATE TABLE IF NOT EXISTS escrow_receipts_tb (
            id              BIGSERIAL PRIMARY KEY,
            external_ref    TEXT NOT NULL UNIQUE,
            source          TEXT NOT NULL,
            amount          NUMERIC(38, 18) NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            occurred_at     TIMESTAMPTZ NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "reconciliation_runs_tb",
        r#"
        CREATE TABLE IF NOT EXISTS reconciliation_runs_tb (
            run_id          TEXT PRIMARY KEY,
            source          TEXT NOT NULL,
            status          TEXT NOT NULL,
            matched_count   BIGINT NOT NULL DEFAULT 0,
            mismatch_count  BIGINT NOT NULL DEFAULT 0,
            error_message   TEXT,
            checked_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "reconciliation_issues_tb",
        r#"
        CREATE TABLE IF NOT EXISTS reconciliation_issues_tb (
            id              BIGSERIAL PRIMARY KEY,
            run_id          TEXT NOT NULL REFERENCES reconciliation_runs_tb(run_id),
            issue_type      TEXT NOT NULL,
            external_ref    TEXT NOT NULL,
            expected_amount NUMERIC(38, 18),
            actual_amount   NUMERIC(38, 18),
            message         TEXT NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "idx_recon_issues_run",
        r#"
        CREATE INDEX IF NOT EXISTS idx_recon_issues_run
            ON reconciliation_issues_tb (run_id)
        "#,
    ),
    (
        "chain_ops_tb",
        r#"
        CREATE TABLE IF NOT EXISTS chain_ops_tb (
            op_id           TEXT PRIMARY KEY,
            op_type         TEXT NOT NULL,
            entity_type     TEXT NOT NULL,
            entity_id       TEXT NOT NULL,
            payload         JSONB NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            tx_hash         TEXT,
            retry_count     INT NOT NULL DEFAULT 0,
            next_retry_at   TIMESTAMPTZ,
            error_message   TEXT,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "idx_chain_ops_due",
        r#"
        CREATE INDEX IF NOT EXISTS idx_chain_ops_due
            ON chain_ops_tb (status, next_retry_at, created_at)
        "#,
    ),
];
