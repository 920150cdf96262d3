//! Chain-Op Outbox Queue
//!
//! Durable queue of asynchronous chain writes, drained by a polling worker
//! independently of the requests that created them. Rows are claimed with a
//! compare-and-swap so concurrent worker instances never double-process;
//! a row already carrying a transaction hash is resumed by checking the
//! chain, never resubmitted. Failures retry with capped exponential backoff
//! until the dead-letter budget is exhausted; dead letters require an
//! explicit operator re-enqueue.

mod adapter;
mod error;
mod store;
mod types;
mod worker;

pub use adapter::{ChainAdapter, MockChainAdapter};
pub use error::ChainOpError;
pub use store::{ChainOpStore, MemoryChainOpStore, PgChainOpStore};
pub use types::{ChainOp, ChainOpId, ChainOpStatus, NewChainOp, OpPayload, PayoutItem};
pub use worker::{ChainOpWorker, backoff_delay};
