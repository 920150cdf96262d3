//! Reconciliation persistence
//!
//! The Postgres snapshot reads receipts and escrow rows inside one
//! transaction so concurrent ledger writes during a pass cannot produce a
//! torn read.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::ReconcileError;
use super::types::{NewReconciliationIssue, ReconciliationRun, RunStatus};
use crate::ledger::{EscrowReceipt, LedgerEntry};

/// Consistent view of one audit's inputs
#[derive(Debug, Clone, Default)]
pub struct ReconcileSnapshot {
    /// Confirmed receipts only
    pub receipts: Vec<EscrowReceipt>,
    /// Escrow ledger rows carrying a non-null external ref
    pub escrow_entries: Vec<LedgerEntry>,
}

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Persist a provisional run row before the audit starts
    async fn begin_run(&self, run: &ReconciliationRun) -> Result<(), ReconcileError>;

    /// Load the audit inputs as one consistent snapshot
    async fn snapshot(&self) -> Result<ReconcileSnapshot, ReconcileError>;

    /// Persist issues and finalize the run's status and counts
    async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        matched_count: i64,
        mismatch_count: i64,
        issues: &[NewReconciliationIssue],
    ) -> Result<(), ReconcileError>;

    /// Mark the run failed. Called outside the aborted audit path.
    async fn fail_run(&self, run_id: &str, error: &str) -> Result<(), ReconcileError>;

    /// Read a run back (summaries, ops tooling)
    async fn get_run(&self, run_id: &str) -> Result<Option<ReconciliationRun>, ReconcileError>;
}

/// PostgreSQL-backed store
pub struct PgReconciliationStore {
    pool: PgPool,
}

impl PgReconciliationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReconciliationStore for PgReconciliationStore {
    async fn begin_run(&self, run: &ReconciliationRun) -> Result<(), ReconcileError> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_runs_tb (run_id, source, status, checked_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&run.run_id)
        .bind(run.source.as_str())
        .bind(run.status.as_str())
        .bind(run.checked_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn snapshot(&self) -> Result<ReconcileSnapshot, ReconcileError> {
        let mut txn = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *txn)
            .await?;

        let receipt_rows = sqlx::query(
            r#"
            SELECT external_ref, source, amount, status, occurred_at
            FROM escrow_receipts_tb
            WHERE status = 'confirmed'
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .fetch_all(&mut *txn)
        .await?;

        let entry_rows = sqlx::query(
            r#"
            SELECT id, ledger_type, account_ref, direction, amount, currency,
                   entity_type, entity_id, external_ref, idempotency_key, metadata, posted_at
            FROM ledger_entries_tb
            WHERE ledger_type = 'escrow' AND external_ref IS NOT NULL
            ORDER BY posted_at ASC, id ASC
            "#,
        )
        .fetch_all(&mut *txn)
        .await?;

        txn.commit().await?;

        let receipts = receipt_rows
            .iter()
            .map(crate::ledger::receipts::row_to_receipt)
            .collect::<Result<Vec<_>, _>>()?;
        let escrow_entries = entry_rows
            .iter()
            .map(crate::ledger::db::row_to_entry)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReconcileSnapshot {
            receipts,
            escrow_entries,
        })
    }

    async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        matched_count: i64,
        mismatch_count: i64,
        issues: &[NewReconciliationIssue],
    ) -> Result<(), ReconcileError> {
        let mut txn = self.pool.begin().await?;

        for issue in issues {
            sqlx::query(
                r#"
                INSERT INTO reconciliation_issues_tb
                    (run_id, issue_type, external_ref, expected_amount, actual_amount, message)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(run_id)
            .bind(issue.issue_type.as_str())
            .bind(&issue.external_ref)
            .bind(issue.expected_amount)
            .bind(issue.actual_amount)
            .bind(&issue.message)
            .execute(&mut *txn)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE reconciliation_runs_tb
            SET status = $1, matched_count = $2, mismatch_count = $3
            WHERE run_id = $4
            "#,
        )
        .bind(status.as_str())
        .bind(matched_count)
        .bind(mismatch_count)
        .bind(run_id)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    async fn fail_run(&self, run_id: &str, error: &str) -> Result<(), ReconcileError> {
        sqlx::query(
            r#"
            UPDATE reconciliation_runs_tb
            SET status = 'failed', error_message = $1
            WHERE run_id = $2
            "#,
        )
        .bind(error)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<ReconciliationRun>, ReconcileError> {
        let row = sqlx::query(
            r#"
            SELECT run_id, source, status, matched_count, mismatch_count, error_message, checked_at
            FROM reconciliation_runs_tb
            WHERE run_id = $1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let source_name: String = row.get("source");
        let status_name: String = row.get("status");
        let source = super::types::ReconcileSource::from_name(&source_name).ok_or_else(|| {
            ReconcileError::PassFailed {
                run_id: run_id.to_string(),
                message: format!("corrupt source '{}'", source_name),
            }
        })?;
        let status =
            RunStatus::from_name(&status_name).ok_or_else(|| ReconcileError::PassFailed {
                run_id: run_id.to_string(),
                message: format!("corrupt status '{}'", status_name),
            })?;

        Ok(Some(ReconciliationRun {
            run_id: row.get("run_id"),
            source,
            status,
            matched_count: row.get("matched_count"),
            mismatch_count: row.get("mismatch_count"),
            error_message: row.get("error_message"),
            checked_at: row.get("checked_at"),
        }))
    }
}

/// In-memory store for tests and lightweight embedding
#[derive(Default)]
pub struct MemoryReconciliationStore {
    snapshot: Mutex<ReconcileSnapshot>,
    runs: Mutex<HashMap<String, ReconciliationRun>>,
    issues: Mutex<HashMap<String, Vec<NewReconciliationIssue>>>,
    /// Test hook: make the next snapshot fail
    fail_next_snapshot: AtomicBool,
}

impl MemoryReconciliationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_snapshot(&self, snapshot: ReconcileSnapshot) {
        *self.snapshot.lock().expect("snapshot lock poisoned") = snapshot;
    }

    pub fn fail_next_snapshot(&self) {
        self.fail_next_snapshot.store(true, Ordering::SeqCst);
    }

    pub fn issues_for(&self, run_id: &str) -> Vec<NewReconciliationIssue> {
        self.issues
            .lock()
            .expect("issues lock poisoned")
            .get(run_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReconciliationStore for MemoryReconciliationStore {
    async fn begin_run(&self, run: &ReconciliationRun) -> Result<(), ReconcileError> {
        self.runs
            .lock()
            .expect("runs lock poisoned")
            .insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn snapshot(&self) -> Result<ReconcileSnapshot, ReconcileError> {
        if self.fail_next_snapshot.swap(false, Ordering::SeqCst) {
            return Err(ReconcileError::Database(sqlx::Error::PoolClosed));
        }
        Ok(self.snapshot.lock().expect("snapshot lock poisoned").clone())
    }

    async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        matched_count: i64,
        mismatch_count: i64,
        issues: &[NewReconciliationIssue],
    ) -> Result<(), ReconcileError> {
        let mut runs = self.runs.lock().expect("runs lock poisoned");
        if let Some(run) = runs.get_mut(run_id) {
            run.status = status;
            run.matched_count = matched_count;
            run.mismatch_count = mismatch_count;
        }
        self.issues
            .lock()
            .expect("issues lock poisoned")
            .insert(run_id.to_string(), issues.to_vec());
        Ok(())
    }

    async fn fail_run(&self, run_id: &str, error: &str) -> Result<(), ReconcileError> {
        let mut runs = self.runs.lock().expect("runs lock poisoned");
        if let Some(run) = runs.get_mut(run_id) {
            run.status = RunStatus::Failed;
            run.error_message = Some(error.to_string());
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<ReconciliationRun>, ReconcileError> {
        Ok(self
            .runs
            .lock()
            .expect("runs lock poisoned")
            .get(run_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ReceiptStatus;
    use crate::reconciliation::engine::run_reconciliation;
    use crate::reconciliation::types::ReconcileSource;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn snapshot_with_receipt() -> ReconcileSnapshot {
        ReconcileSnapshot {
            receipts: vec![EscrowReceipt {
                external_ref: "wire-1".to_string(),
                source: "bank".to_string(),
                amount: Decimal::new(10000, 2),
                status: ReceiptStatus::Confirmed,
                occurred_at: Utc::now(),
            }],
            escrow_entries: vec![],
        }
    }

    #[tokio::test]
    async fn test_memory_store_records_failed_run() {
        let store = MemoryReconciliationStore::new();
        store.set_snapshot(snapshot_with_receipt());
        store.fail_next_snapshot();

        let summary = run_reconciliation(&store, ReconcileSource::Manual, Decimal::ZERO)
            .await
            .unwrap();
        assert_eq!(summary.status, RunStatus::Failed);

        let run = store.get_run(&summary.run_id).await.unwrap().expect("run");
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.is_some());
    }

    #[tokio::test]
    async fn test_memory_store_persists_issues() {
        let store = MemoryReconciliationStore::new();
        store.set_snapshot(snapshot_with_receipt());

        let summary = run_reconciliation(&store, ReconcileSource::Bank, Decimal::ZERO)
            .await
            .unwrap();
        assert_eq!(summary.status, RunStatus::Mismatch);
        assert_eq!(summary.mismatch_count, 1);

        let issues = store.issues_for(&summary.run_id);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].external_ref, "wire-1");
    }
}
