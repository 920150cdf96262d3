//! Ledger Reconciliation Engine
//!
//! Periodic audit comparing confirmed external payment receipts against
//! escrow ledger entries within a configured amount tolerance. Each pass
//! produces an immutable run record plus issue records for every receipt
//! without ledger rows, every amount mismatch, and every ledger group
//! without a receipt. A failed pass is persisted as a `failed` run - the
//! worker never lets an error escape its tick.

mod engine;
mod error;
mod store;
mod types;
mod worker;

pub use engine::{ReconcileReport, reconcile, run_reconciliation};
pub use error::ReconcileError;
pub use store::{
    MemoryReconciliationStore, PgReconciliationStore, ReconcileSnapshot, ReconciliationStore,
};
pub use types::{
    IssueType, NewReconciliationIssue, ReconcileSource, ReconcileSummary, ReconciliationRun,
    RunStatus,
};
pub use worker::ReconciliationWorker;
