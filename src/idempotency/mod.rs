//! Idempotent Command Executor
//!
//! Wraps mutating commands with a client-supplied command id and guarantees
//! at-most-one execution per (command id, user, route). Replays return the
//! stored response of the first successful execution; reusing a command id
//! with a different payload is a conflict, never silently accepted.
//!
//! The uniqueness constraint on the record key is the sole concurrency
//! control: races are resolved by conditional insert, not locks.

mod error;
mod executor;
mod hash;
mod store;

pub use error::CommandError;
pub use executor::run_idempotent_command;
pub use hash::{canonical_json, request_hash};
pub use store::{
    CommandKey, IdempotencyRecord, IdempotencyStore, InsertOutcome, MemoryIdempotencyStore,
    PgIdempotencyStore,
};
