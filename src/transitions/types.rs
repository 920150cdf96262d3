//! Status and context types for the transition guard

use serde::{Deserialize, Serialize};
use std::fmt;

/// The entity kinds whose lifecycles the core validates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Application,
    Offering,
    Subscription,
    Distribution,
    Milestone,
    Tranche,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Application => "application",
            EntityKind::Offering => "offering",
            EntityKind::Subscription => "subscription",
            EntityKind::Distribution => "distribution",
            EntityKind::Milestone => "milestone",
            EntityKind::Tranche => "tranche",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Boolean preconditions a transition edge may require
///
/// The core never computes these - callers evaluate them against their own
/// documents and pass the results in a [`TransitionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    HasVerifiedReceipt,
    TasksComplete,
    AllocationSnapshotAnchored,
    TrusteeProcessCompleted,
    DocsComplete,
    FundingTargetReached,
}

impl Precondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precondition::HasVerifiedReceipt => "has_verified_receipt",
            Precondition::TasksComplete => "tasks_complete",
            Precondition::AllocationSnapshotAnchored => "allocation_snapshot_anchored",
            Precondition::TrusteeProcessCompleted => "trustee_process_completed",
            Precondition::DocsComplete => "docs_complete",
            Precondition::FundingTargetReached => "funding_target_reached",
        }
    }

    /// Evaluate this precondition against the caller-supplied context
    pub fn is_met(&self, ctx: &TransitionContext) -> bool {
        match self {
            Precondition::HasVerifiedReceipt => ctx.has_verified_receipt,
            Precondition::TasksComplete => ctx.tasks_complete,
            Precondition::AllocationSnapshotAnchored => ctx.allocation_snapshot_anchored,
            Precondition::TrusteeProcessCompleted => ctx.trustee_process_completed,
            Precondition::DocsComplete => ctx.docs_complete,
            Precondition::FundingTargetReached => ctx.funding_target_reached,
        }
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied guard context
///
/// Fields default to `false`; a guarded edge fails with `PreconditionFailed`
/// unless the caller explicitly sets the required field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionContext {
    pub has_verified_receipt: bool,
    pub tasks_complete: bool,
    pub allocation_snapshot_anchored: bool,
    pub trustee_process_completed: bool,
    pub docs_complete: bool,
    pub funding_target_reached: bool,
}

macro_rules! status_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn from_name(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant)),+ ,
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

status_enum!(ApplicationStatus {
    Draft => "draft",
    Submitted => "submitted",
    UnderReview => "under_review",
    InfoRequested => "info_requested",
    Approved => "approved",
    Rejected => "rejected",
});

status_enum!(OfferingStatus {
    Draft => "draft",
    PendingApproval => "pending_approval",
    Live => "live",
    Paused => "paused",
    Funded => "funded",
    Cancelled => "cancelled",
    Closed => "closed",
});

status_enum!(SubscriptionStatus {
    Initiated => "initiated",
    PaymentPending => "payment_pending",
    PaymentReceived => "payment_received",
    Allocated => "allocated",
    Settled => "settled",
    Cancelled => "cancelled",
});

status_enum!(DistributionStatus {
    Declared => "declared",
    Approved => "approved",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

status_enum!(MilestoneStatus {
    Pending => "pending",
    Submitted => "submitted",
    Verified => "verified",
    Released => "released",
    Rejected => "rejected",
});

status_enum!(TrancheStatus {
    Locked => "locked",
    UnlockPending => "unlock_pending",
    Unlocked => "unlocked",
    Exited => "exited",
});
