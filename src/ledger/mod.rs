//! Ledger - append-only monetary records
//!
//! Every money-moving domain event posts one or more signed entries. Entries
//! are never mutated or deleted; corrections are made by posting offsetting
//! entries. Balances are always derived by summing credits minus debits for
//! an account ref. Escrow receipts record the external payment evidence the
//! reconciliation engine audits against.

pub(crate) mod db;
mod error;
pub(crate) mod receipts;
mod types;

pub use db::LedgerDb;
pub use error::LedgerError;
pub use receipts::{EscrowReceipt, NewEscrowReceipt, ReceiptDb, ReceiptStatus};
pub use types::{Direction, LedgerEntry, LedgerType, NewLedgerEntry};
