//! Reconciliation pass
//!
//! The matching core is a pure function over an in-memory snapshot so the
//! tolerance arithmetic can be tested without a database. Amounts are exact
//! decimals throughout; no binary floating point touches the comparison.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{info, warn};
use ulid::Ulid;

use super::error::ReconcileError;
use super::store::ReconciliationStore;
use super::types::{
    IssueType, NewReconciliationIssue, ReconcileSource, ReconcileSummary, ReconciliationRun,
    RunStatus,
};
use crate::ledger::{EscrowReceipt, LedgerEntry};

/// Outcome of the pure matching pass
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub matched_count: i64,
    pub issues: Vec<NewReconciliationIssue>,
}

impl ReconcileReport {
    pub fn status(&self) -> RunStatus {
        if self.issues.is_empty() {
            RunStatus::Ok
        } else {
            RunStatus::Mismatch
        }
    }

    pub fn mismatch_count(&self) -> i64 {
        self.issues.len() as i64
    }
}

/// Compare confirmed receipts against escrow ledger rows.
///
/// For each receipt: no ledger rows sharing its external ref is
/// `missing_ledger`; otherwise the rows' net (Σcredits − Σdebits) must be
/// within `tolerance` of the receipt amount or an `amount_mismatch` is
/// emitted. Ledger groups whose external ref matches no receipt are
/// `orphan_ledger`, one issue per group.
pub fn reconcile(
    receipts: &[EscrowReceipt],
    escrow_entries: &[LedgerEntry],
    tolerance: Decimal,
) -> ReconcileReport {
    // BTreeMap keeps orphan emission order deterministic
    let mut groups: BTreeMap<&str, Decimal> = BTreeMap::new();
    for entry in escrow_entries {
        if let Some(external_ref) = entry.external_ref.as_deref() {
            *groups.entry(external_ref).or_insert(Decimal::ZERO) += entry.signed_amount();
        }
    }

    let mut matched_count = 0i64;
    let mut issues = Vec::new();

    for receipt in receipts {
        match groups.remove(receipt.external_ref.as_str()) {
            None => issues.push(NewReconciliationIssue {
                issue_type: IssueType::MissingLedger,
                external_ref: receipt.external_ref.clone(),
                expected_amount: Some(receipt.amount),
                actual_amount: None,
                message: format!(
                    "receipt {} for {} has no ledger entries",
                    receipt.external_ref, receipt.amount
                ),
            }),
            Some(actual_net) => {
                let drift = (receipt.amount - actual_net).abs();
                if drift <= tolerance {
                    matched_count += 1;
                } else {
                    issues.push(NewReconciliationIssue {
                        issue_type: IssueType::AmountMismatch,
                        external_ref: receipt.external_ref.clone(),
                        expected_amount: Some(receipt.amount),
                        actual_amount: Some(actual_net),
                        message: format!(
                            "receipt {} expected {} but ledger nets {} (drift {})",
                            receipt.external_ref, receipt.amount, actual_net, drift
                        ),
                    });
                }
            }
        }
    }

    // Remaining groups were never claimed by a receipt
    for (external_ref, actual_net) in groups {
        issues.push(NewReconciliationIssue {
            issue_type: IssueType::OrphanLedger,
            external_ref: external_ref.to_string(),
            expected_amount: None,
            actual_amount: Some(actual_net),
            message: format!(
                "ledger entries netting {} under {} match no receipt",
                actual_net, external_ref
            ),
        });
    }

    ReconcileReport {
        matched_count,
        issues,
    }
}

/// Run one full audit pass against the store.
///
/// Creates a provisional run row first so the failure path has something to
/// update; a pass that blows up mid-audit is persisted as a `failed` run
/// rather than left half-written.
pub async fn run_reconciliation(
    store: &dyn ReconciliationStore,
    source: ReconcileSource,
    tolerance: Decimal,
) -> Result<ReconcileSummary, ReconcileError> {
    let run = ReconciliationRun {
        run_id: Ulid::new().to_string(),
        source,
        status: RunStatus::Ok, // provisional
        matched_count: 0,
        mismatch_count: 0,
        error_message: None,
        checked_at: chrono::Utc::now(),
    };
    store.begin_run(&run).await?;

    match audit(store, &run.run_id, tolerance).await {
        Ok(summary) => {
            info!(
                run_id = %summary.run_id,
                source = %source,
                status = %summary.status,
                matched = summary.matched_count,
                mismatches = summary.mismatch_count,
                "Reconciliation pass completed"
            );
            Ok(summary)
        }
        Err(e) => {
            // Record the failure outside the aborted audit path
            let message = e.to_string();
            warn!(run_id = %run.run_id, error = %message, "Reconciliation pass failed");
            store.fail_run(&run.run_id, &message).await?;
            Ok(ReconcileSummary {
                run_id: run.run_id,
                status: RunStatus::Failed,
                matched_count: 0,
                mismatch_count: 0,
            })
        }
    }
}

async fn audit(
    store: &dyn ReconciliationStore,
    run_id: &str,
    tolerance: Decimal,
) -> Result<ReconcileSummary, ReconcileError> {
    let snapshot = store.snapshot().await?;
    let report = reconcile(&snapshot.receipts, &snapshot.escrow_entries, tolerance);
    let status = report.status();

    store
        .complete_run(
            run_id,
            status,
            report.matched_count,
            report.mismatch_count(),
            &report.issues,
        )
        .await?;

    Ok(ReconcileSummary {
        run_id: run_id.to_string(),
        status,
        matched_count: report.matched_count,
        mismatch_count: report.mismatch_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Direction, LedgerType, ReceiptStatus};
    use chrono::Utc;

    fn receipt(external_ref: &str, amount: &str) -> EscrowReceipt {
        EscrowReceipt {
            external_ref: external_ref.to_string(),
            source: "bank".to_string(),
            amount: amount.parse().unwrap(),
            status: ReceiptStatus::Confirmed,
            occurred_at: Utc::now(),
        }
    }

    fn entry(external_ref: &str, direction: Direction, amount: &str) -> LedgerEntry {
        LedgerEntry {
            id: 0,
            ledger_type: LedgerType::Escrow,
            account_ref: "escrow:offering:off-1".to_string(),
            direction,
            amount: amount.parse().unwrap(),
            currency: "USD".to_string(),
            entity_type: "subscription".to_string(),
            entity_id: "sub-1".to_string(),
            external_ref: Some(external_ref.to_string()),
            idempotency_key: None,
            metadata: serde_json::json!({}),
            posted_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_match_with_zero_tolerance() {
        let receipts = vec![receipt("wire-1", "100.00")];
        let entries = vec![
            entry("wire-1", Direction::Credit, "120.00"),
            entry("wire-1", Direction::Debit, "20.00"),
        ];

        let report = reconcile(&receipts, &entries, Decimal::ZERO);
        assert_eq!(report.matched_count, 1);
        assert!(report.issues.is_empty());
        assert_eq!(report.status(), RunStatus::Ok);
    }

    #[test]
    fn test_drift_beyond_tolerance_is_mismatch() {
        let receipts = vec![receipt("wire-1", "100.00")];
        let entries = vec![entry("wire-1", Direction::Credit, "100.60")];

        let tolerance: Decimal = "0.5".parse().unwrap();
        let report = reconcile(&receipts, &entries, tolerance);
        assert_eq!(report.matched_count, 0);
        assert_eq!(report.issues.len(), 1);
        let issue = &report.issues[0];
        assert_eq!(issue.issue_type, IssueType::AmountMismatch);
        assert_eq!(issue.expected_amount, Some("100.00".parse().unwrap()));
        assert_eq!(issue.actual_amount, Some("100.60".parse().unwrap()));
    }

    #[test]
    fn test_drift_within_tolerance_matches() {
        let receipts = vec![receipt("wire-1", "100.00")];
        let entries = vec![entry("wire-1", Direction::Credit, "100.40")];

        let tolerance: Decimal = "0.5".parse().unwrap();
        let report = reconcile(&receipts, &entries, tolerance);
        assert_eq!(report.matched_count, 1);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_missing_ledger() {
        let receipts = vec![receipt("wire-1", "100.00")];
        let report = reconcile(&receipts, &[], Decimal::ZERO);

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].issue_type, IssueType::MissingLedger);
        assert_eq!(report.issues[0].external_ref, "wire-1");
        assert_eq!(report.status(), RunStatus::Mismatch);
    }

    #[test]
    fn test_orphan_ledger_one_issue_per_group() {
        let entries = vec![
            entry("wire-9", Direction::Credit, "40.00"),
            entry("wire-9", Direction::Credit, "60.00"),
        ];
        let report = reconcile(&[], &entries, Decimal::ZERO);

        assert_eq!(report.issues.len(), 1, "one issue per ledger group");
        assert_eq!(report.issues[0].issue_type, IssueType::OrphanLedger);
        assert_eq!(report.issues[0].actual_amount, Some("100.00".parse().unwrap()));
    }

    #[test]
    fn test_entries_without_external_ref_are_ignored() {
        let mut unlinked = entry("ignored", Direction::Credit, "55.00");
        unlinked.external_ref = None;

        let report = reconcile(&[], &[unlinked], Decimal::ZERO);
        assert!(report.issues.is_empty());
        assert_eq!(report.matched_count, 0);
    }

    #[test]
    fn test_mixed_pass() {
        let receipts = vec![
            receipt("wire-1", "100.00"),
            receipt("wire-2", "250.00"),
            receipt("wire-3", "10.00"),
        ];
        let entries = vec![
            entry("wire-1", Direction::Credit, "100.00"),
            entry("wire-2", Direction::Credit, "249.00"),
            entry("wire-4", Direction::Credit, "5.00"),
        ];

        let report = reconcile(&receipts, &entries, Decimal::ZERO);
        assert_eq!(report.matched_count, 1);

        let types: Vec<IssueType> = report.issues.iter().map(|i| i.issue_type).collect();
        assert_eq!(
            types,
            vec![
                IssueType::AmountMismatch, // wire-2
                IssueType::MissingLedger,  // wire-3
                IssueType::OrphanLedger,   // wire-4
            ]
        );
    }
}
