use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("entry amount must be nonnegative, got {0}")]
    NegativeAmount(rust_decimal::Decimal),

    /// A stored row carries a value outside the closed enumerations
    #[error("corrupt ledger row: {0}")]
    CorruptRow(String),
}
