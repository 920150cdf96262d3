//! rwa-backoffice - Financial-Consistency Core
//!
//! Back-office engine for real-asset investment workflows, built around four
//! subsystems that must stay correct under concurrency and partial failure.
//!
//! # Modules
//!
//! - [`transitions`] - Entity status transition guard (pure, no I/O)
//! - [`idempotency`] - At-most-once command execution keyed by client command ids
//! - [`ledger`] - Append-only monetary ledger and escrow receipts
//! - [`reconciliation`] - Periodic audit of ledger entries against receipts
//! - [`chain_ops`] - Durable outbox queue for asynchronous chain operations
//! - [`events`] - Publish seam for post-confirmation notification fan-out
//! - [`db`] - PostgreSQL connection management and schema
//! - [`config`] - YAML application configuration

pub mod config;
pub mod db;
pub mod events;
pub mod logging;

pub mod chain_ops;
pub mod idempotency;
pub mod ledger;
pub mod reconciliation;
pub mod transitions;

// Convenient re-exports at crate root
pub use chain_ops::{ChainAdapter, ChainOp, ChainOpId, ChainOpStatus, ChainOpWorker, OpPayload};
pub use events::{DomainEvent, EventPublisher};
pub use idempotency::{CommandError, CommandKey, run_idempotent_command};
pub use ledger::{Direction, LedgerEntry, LedgerType, NewLedgerEntry};
pub use reconciliation::{
    ReconcileSource, ReconcileSummary, ReconciliationWorker, run_reconciliation,
};
pub use transitions::{EntityKind, TransitionContext, TransitionError, assert_transition};
