//! Static transition tables
//!
//! One adjacency table per entity kind. Terminal states have no outgoing
//! edges. Guarded edges carry the preconditions checked in table order.

use super::types::{
    ApplicationStatus, DistributionStatus, EntityKind, MilestoneStatus, OfferingStatus,
    Precondition, SubscriptionStatus, TrancheStatus,
};
use std::fmt;

/// One legal edge out of a status, with its guard preconditions
#[derive(Debug, Clone, Copy)]
pub struct Edge<S: 'static> {
    pub to: S,
    pub guards: &'static [Precondition],
}

/// Statuses that participate in a guarded lifecycle
pub trait Lifecycle: Copy + Eq + fmt::Display + 'static {
    const KIND: EntityKind;

    /// Legal successors of this status. Empty for terminal states.
    fn successors(self) -> &'static [Edge<Self>];

    /// Canonical snake_case status name
    fn name(self) -> &'static str;

    /// Parse a canonical status name
    fn from_status_name(s: &str) -> Option<Self>;

    fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

macro_rules! lifecycle_names {
    () => {
        fn name(self) -> &'static str {
            self.as_str()
        }

        fn from_status_name(s: &str) -> Option<Self> {
            Self::from_name(s)
        }
    };
}

impl Lifecycle for ApplicationStatus {
    const KIND: EntityKind = EntityKind::Application;
    lifecycle_names!();

    fn successors(self) -> &'static [Edge<Self>] {
        use ApplicationStatus::*;
        match self {
            Draft => &[Edge {
                to: Submitted,
                guards: &[],
            }],
            Submitted => &[Edge {
                to: UnderReview,
                guards: &[Precondition::DocsComplete],
            }],
            UnderReview => &[
                Edge {
                    to: Approved,
                    guards: &[Precondition::TasksComplete],
                },
                Edge {
                    to: Rejected,
                    guards: &[],
                },
                Edge {
                    to: InfoRequested,
                    guards: &[],
                },
            ],
            InfoRequested => &[Edge {
                to: UnderReview,
                guards: &[],
            }],
            Approved | Rejected => &[],
        }
    }
}

impl Lifecycle for OfferingStatus {
    const KIND: EntityKind = EntityKind::Offering;
    lifecycle_names!();

    fn successors(self) -> &'static [Edge<Self>] {
        use OfferingStatus::*;
        match self {
            Draft => &[Edge {
                to: PendingApproval,
                guards: &[],
            }],
            PendingApproval => &[
                Edge {
                    to: Live,
                    guards: &[Precondition::DocsComplete],
                },
                Edge {
                    to: Cancelled,
                    guards: &[],
                },
            ],
            Live => &[
                Edge {
                    to: Funded,
                    guards: &[Precondition::FundingTargetReached],
                },
                Edge {
                    to: Paused,
                    guards: &[],
                },
                Edge {
                    to: Cancelled,
                    guards: &[],
                },
            ],
            Paused => &[
                Edge {
                    to: Live,
                    guards: &[],
                },
                Edge {
                    to: Cancelled,
                    guards: &[],
                },
            ],
            Funded => &[Edge {
                to: Closed,
                guards: &[],
            }],
            Cancelled | Closed => &[],
        }
    }
}

impl Lifecycle for SubscriptionStatus {
    const KIND: EntityKind = EntityKind::Subscription;
    lifecycle_names!();

    fn successors(self) -> &'static [Edge<Self>] {
        use SubscriptionStatus::*;
        match self {
            Initiated => &[
                Edge {
                    to: PaymentPending,
                    guards: &[],
                },
                Edge {
                    to: Cancelled,
                    guards: &[],
                },
            ],
            PaymentPending => &[
                Edge {
                    to: PaymentReceived,
                    guards: &[Precondition::HasVerifiedReceipt],
                },
                Edge {
                    to: Cancelled,
                    guards: &[],
                },
            ],
            PaymentReceived => &[Edge {
                to: Allocated,
                guards: &[Precondition::AllocationSnapshotAnchored],
            }],
            Allocated => &[Edge {
                to: Settled,
                guards: &[],
            }],
            Settled | Cancelled => &[],
        }
    }
}

impl Lifecycle for DistributionStatus {
    const KIND: EntityKind = EntityKind::Distribution;
    lifecycle_names!();

    fn successors(self) -> &'static [Edge<Self>] {
        use DistributionStatus::*;
        match self {
            Declared => &[
                Edge {
                    to: Approved,
                    guards: &[Precondition::TrusteeProcessCompleted],
                },
                Edge {
                    to: Cancelled,
                    guards: &[],
                },
            ],
            Approved => &[Edge {
                to: Processing,
                guards: &[],
            }],
            Processing => &[
                Edge {
                    to: Completed,
                    guards: &[],
                },
                Edge {
                    to: Failed,
                    guards: &[],
                },
            ],
            Completed | Failed | Cancelled => &[],
        }
    }
}

impl Lifecycle for MilestoneStatus {
    const KIND: EntityKind = EntityKind::Milestone;
    lifecycle_names!();

    fn successors(self) -> &'static [Edge<Self>] {
        use MilestoneStatus::*;
        match self {
            Pending => &[Edge {
                to: Submitted,
                guards: &[],
            }],
            Submitted => &[
                Edge {
                    to: Verified,
                    guards: &[Precondition::TasksComplete],
                },
                Edge {
                    to: Rejected,
                    guards: &[],
                },
            ],
            Verified => &[Edge {
                to: Released,
                guards: &[],
            }],
            Rejected => &[Edge {
                to: Pending,
                guards: &[],
            }],
            Released => &[],
        }
    }
}

impl Lifecycle for TrancheStatus {
    const KIND: EntityKind = EntityKind::Tranche;
    lifecycle_names!();

    fn successors(self) -> &'static [Edge<Self>] {
        use TrancheStatus::*;
        match self {
            Locked => &[Edge {
                to: UnlockPending,
                guards: &[Precondition::TasksComplete],
            }],
            UnlockPending => &[Edge {
                to: Unlocked,
                guards: &[],
            }],
            Unlocked => &[Edge {
                to: Exited,
                guards: &[],
            }],
            Exited => &[],
        }
    }
}
