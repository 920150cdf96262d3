//! Entity Transition Guard
//!
//! Pure validation of status transitions for the money-bearing entity types.
//! Each entity kind has a static adjacency table; edges may additionally
//! require boolean preconditions supplied by the caller in a
//! [`TransitionContext`]. The guard performs no I/O - the caller persists the
//! new status only after validation succeeds.

mod error;
mod guard;
mod tables;
mod types;

pub use error::TransitionError;
pub use guard::{assert_transition, assert_transition_by_name};
pub use tables::{Edge, Lifecycle};
pub use types::{
    ApplicationStatus, DistributionStatus, EntityKind, MilestoneStatus, OfferingStatus,
    Precondition, SubscriptionStatus, TrancheStatus, TransitionContext,
};
