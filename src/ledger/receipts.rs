//! Escrow receipts - external evidence of money received or moved
//!
//! Receipts are landed by the surrounding application (bank feed, provider
//! webhook, chain scan) and audited against escrow ledger entries by the
//! reconciliation engine. Recording is idempotent on `external_ref`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::fmt;

use super::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Pending,
    Confirmed,
    Failed,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Pending => "pending",
            ReceiptStatus::Confirmed => "confirmed",
            ReceiptStatus::Failed => "failed",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReceiptStatus::Pending),
            "confirmed" => Some(ReceiptStatus::Confirmed),
            "failed" => Some(ReceiptStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewEscrowReceipt {
    /// Unique reference from the external system (wire id, tx hash, ...)
    pub external_ref: String,
    pub source: String,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EscrowReceipt {
    pub external_ref: String,
    pub source: String,
    pub amount: Decimal,
    pub status: ReceiptStatus,
    pub occurred_at: DateTime<Utc>,
}

pub struct ReceiptDb {
    pool: PgPool,
}

impl ReceiptDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a receipt in `pending` status.
    /// Returns true if newly recorded, false if the ref was already known.
    pub async fn record(&self, receipt: &NewEscrowReceipt) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO escrow_receipts_tb (external_ref, source, amount, status, occurred_at)
            VALUES ($1, $2, $3, 'pending', $4)
            ON CONFLICT (external_ref) DO NOTHING
            "#,
        )
        .bind(&receipt.external_ref)
        .bind(&receipt.source)
        .bind(receipt.amount)
        .bind(receipt.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a receipt confirmed (evidence is final)
    pub async fn confirm(&self, external_ref: &str) -> Result<bool, LedgerError> {
        self.set_status(external_ref, ReceiptStatus::Confirmed).await
    }

    /// Mark a receipt failed (evidence withdrawn, e.g. bounced wire)
    pub async fn mark_failed(&self, external_ref: &str) -> Result<bool, LedgerError> {
        self.set_status(external_ref, ReceiptStatus::Failed).await
    }

    async fn set_status(
        &self,
        external_ref: &str,
        status: ReceiptStatus,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"UPDATE escrow_receipts_tb SET status = $1 WHERE external_ref = $2"#,
        )
        .bind(status.as_str())
        .bind(external_ref)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, external_ref: &str) -> Result<Option<EscrowReceipt>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT external_ref, source, amount, status, occurred_at
            FROM escrow_receipts_tb
            WHERE external_ref = $1
            "#,
        )
        .bind(external_ref)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_receipt(&row)?)),
            None => Ok(None),
        }
    }
}

/// Convert a database row to an EscrowReceipt
pub(crate) fn row_to_receipt(row: &sqlx::postgres::PgRow) -> Result<EscrowReceipt, LedgerError> {
    let status_name: String = row.get("status");
    let status = ReceiptStatus::from_name(&status_name).ok_or_else(|| {
        LedgerError::CorruptRow(format!("unknown receipt status '{}'", status_name))
    })?;

    Ok(EscrowReceipt {
        external_ref: row.get("external_ref"),
        source: row.get("source"),
        amount: row.get("amount"),
        status,
        occurred_at: row.get("occurred_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_status_roundtrip() {
        for status in [
            ReceiptStatus::Pending,
            ReceiptStatus::Confirmed,
            ReceiptStatus::Failed,
        ] {
            assert_eq!(ReceiptStatus::from_name(status.as_str()), Some(status));
        }
        assert_eq!(ReceiptStatus::from_name("CONFIRMED"), None);
    }
}
