//! Reconciliation record types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What triggered or feeds an audit pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileSource {
    Manual,
    Bank,
    Onchain,
    Provider,
}

impl ReconcileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileSource::Manual => "manual",
            ReconcileSource::Bank => "bank",
            ReconcileSource::Onchain => "onchain",
            ReconcileSource::Provider => "provider",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(ReconcileSource::Manual),
            "bank" => Some(ReconcileSource::Bank),
            "onchain" => Some(ReconcileSource::Onchain),
            "provider" => Some(ReconcileSource::Provider),
            _ => None,
        }
    }
}

impl fmt::Display for ReconcileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final status of one audit pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Mismatch,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Mismatch => "mismatch",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(RunStatus::Ok),
            "mismatch" => Some(RunStatus::Mismatch),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a discrepancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    /// A confirmed receipt has no ledger rows sharing its external ref
    MissingLedger,
    /// Ledger rows exist but their net differs beyond tolerance
    AmountMismatch,
    /// A ledger group's external ref matches no receipt
    OrphanLedger,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::MissingLedger => "missing_ledger",
            IssueType::AmountMismatch => "amount_mismatch",
            IssueType::OrphanLedger => "orphan_ledger",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit pass. Immutable after completion except for the failure path.
#[derive(Debug, Clone)]
pub struct ReconciliationRun {
    pub run_id: String,
    pub source: ReconcileSource,
    pub status: RunStatus,
    pub matched_count: i64,
    pub mismatch_count: i64,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Discrepancy found during a run. Created during the run, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReconciliationIssue {
    pub issue_type: IssueType,
    pub external_ref: String,
    pub expected_amount: Option<Decimal>,
    pub actual_amount: Option<Decimal>,
    pub message: String,
}

/// Caller-facing result of a triggered pass
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileSummary {
    pub run_id: String,
    #[serde(serialize_with = "serialize_status")]
    pub status: RunStatus,
    pub matched_count: i64,
    pub mismatch_count: i64,
}

fn serialize_status<S: serde::Serializer>(
    status: &RunStatus,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(status.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_roundtrip() {
        for source in [
            ReconcileSource::Manual,
            ReconcileSource::Bank,
            ReconcileSource::Onchain,
            ReconcileSource::Provider,
        ] {
            assert_eq!(ReconcileSource::from_name(source.as_str()), Some(source));
        }
    }

    #[test]
    fn test_summary_serializes_status_name() {
        let summary = ReconcileSummary {
            run_id: "run-1".to_string(),
            status: RunStatus::Mismatch,
            matched_count: 3,
            mismatch_count: 1,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "mismatch");
        assert_eq!(json["matched_count"], 3);
    }
}
