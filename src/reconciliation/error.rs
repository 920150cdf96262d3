use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),

    /// Another pass is already in flight (single-flight guard)
    #[error("a reconciliation pass is already running")]
    Busy,

    #[error("reconciliation run '{run_id}' failed: {message}")]
    PassFailed { run_id: String, message: String },
}
