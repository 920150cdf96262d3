use super::types::EntityKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The attempted edge is not in the transition table. Never retried.
    #[error("invalid transition for {kind}: {from} -> {to}")]
    InvalidTransition {
        kind: EntityKind,
        from: &'static str,
        to: &'static str,
    },

    /// The edge exists but a guard condition is unmet. Actionable by the caller.
    #[error("precondition failed for {kind} {from} -> {to}: {condition} not met")]
    PreconditionFailed {
        kind: EntityKind,
        from: &'static str,
        to: &'static str,
        condition: &'static str,
    },

    /// A status name supplied by the caller does not belong to this entity kind
    #[error("unknown status '{status}' for {kind}")]
    UnknownStatus { kind: EntityKind, status: String },
}
