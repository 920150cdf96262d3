use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainOpError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("op {0} not found")]
    OpNotFound(String),

    /// External submission failed; retried with backoff
    #[error("chain submission failed: {0}")]
    Submit(String),

    /// Confirmation polling failed
    #[error("confirmation check failed: {0}")]
    Confirmation(String),

    /// The bounded confirmation wait elapsed without the required depth
    #[error("tx {tx_hash} not confirmed within {waited_ms}ms")]
    ConfirmationTimeout { tx_hash: String, waited_ms: u64 },

    #[error("corrupt chain-op row: {0}")]
    CorruptRow(String),
}
