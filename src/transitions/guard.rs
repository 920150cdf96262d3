//! Transition validation

use super::error::TransitionError;
use super::tables::Lifecycle;
use super::types::{
    ApplicationStatus, DistributionStatus, EntityKind, MilestoneStatus, OfferingStatus,
    SubscriptionStatus, TrancheStatus, TransitionContext,
};

/// Validate a status transition against the entity's adjacency table and
/// edge guards. Pure gate: no side effects, the caller persists the new
/// status only after this succeeds.
///
/// Guards are checked in table order; the first unmet precondition is
/// reported.
pub fn assert_transition<S: Lifecycle>(
    from: S,
    to: S,
    ctx: &TransitionContext,
) -> Result<(), TransitionError> {
    let edge = from.successors().iter().find(|e| e.to == to).ok_or(
        TransitionError::InvalidTransition {
            kind: S::KIND,
            from: from.name(),
            to: to.name(),
        },
    )?;

    for guard in edge.guards {
        if !guard.is_met(ctx) {
            return Err(TransitionError::PreconditionFailed {
                kind: S::KIND,
                from: from.name(),
                to: to.name(),
                condition: guard.as_str(),
            });
        }
    }

    Ok(())
}

/// String-level entry point for callers holding raw status names
/// (entity documents store statuses as strings).
pub fn assert_transition_by_name(
    kind: EntityKind,
    from: &str,
    to: &str,
    ctx: &TransitionContext,
) -> Result<(), TransitionError> {
    fn checked<S: Lifecycle>(
        from: &str,
        to: &str,
        ctx: &TransitionContext,
    ) -> Result<(), TransitionError> {
        let from = parse::<S>(from)?;
        let to = parse::<S>(to)?;
        assert_transition(from, to, ctx)
    }

    match kind {
        EntityKind::Application => checked::<ApplicationStatus>(from, to, ctx),
        EntityKind::Offering => checked::<OfferingStatus>(from, to, ctx),
        EntityKind::Subscription => checked::<SubscriptionStatus>(from, to, ctx),
        EntityKind::Distribution => checked::<DistributionStatus>(from, to, ctx),
        EntityKind::Milestone => checked::<MilestoneStatus>(from, to, ctx),
        EntityKind::Tranche => checked::<TrancheStatus>(from, to, ctx),
    }
}

fn parse<S: Lifecycle>(s: &str) -> Result<S, TransitionError> {
    S::from_status_name(s).ok_or_else(|| TransitionError::UnknownStatus {
        kind: S::KIND,
        status: s.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_all_true() -> TransitionContext {
        TransitionContext {
            has_verified_receipt: true,
            tasks_complete: true,
            allocation_snapshot_anchored: true,
            trustee_process_completed: true,
            docs_complete: true,
            funding_target_reached: true,
        }
    }

    #[test]
    fn test_all_pairs_not_in_table_are_invalid() {
        // Exhaustive sweep: any (from, to) pair absent from the table must
        // fail with InvalidTransition even when every precondition holds.
        fn sweep<S: Lifecycle>(all: &[S]) {
            let ctx = ctx_all_true();
            for from in all {
                let legal: Vec<S> = from.successors().iter().map(|e| e.to).collect();
                for to in all {
                    let result = assert_transition(*from, *to, &ctx);
                    if legal.contains(to) {
                        assert!(result.is_ok(), "{} -> {} should be legal", from, to);
                    } else {
                        assert!(
                            matches!(result, Err(TransitionError::InvalidTransition { .. })),
                            "{} -> {} should be invalid",
                            from,
                            to
                        );
                    }
                }
            }
        }

        sweep(ApplicationStatus::ALL);
        sweep(OfferingStatus::ALL);
        sweep(SubscriptionStatus::ALL);
        sweep(DistributionStatus::ALL);
        sweep(MilestoneStatus::ALL);
        sweep(TrancheStatus::ALL);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let ctx = ctx_all_true();
        for to in ApplicationStatus::ALL {
            assert!(matches!(
                assert_transition(ApplicationStatus::Approved, *to, &ctx),
                Err(TransitionError::InvalidTransition { .. })
            ));
        }
        for to in TrancheStatus::ALL {
            assert!(matches!(
                assert_transition(TrancheStatus::Exited, *to, &ctx),
                Err(TransitionError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn test_guarded_edge_requires_precondition() {
        let result = assert_transition(
            SubscriptionStatus::PaymentPending,
            SubscriptionStatus::PaymentReceived,
            &TransitionContext::default(),
        );
        match result {
            Err(TransitionError::PreconditionFailed { condition, .. }) => {
                assert_eq!(condition, "has_verified_receipt");
            }
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }

        let ctx = TransitionContext {
            has_verified_receipt: true,
            ..Default::default()
        };
        assert!(
            assert_transition(
                SubscriptionStatus::PaymentPending,
                SubscriptionStatus::PaymentReceived,
                &ctx
            )
            .is_ok()
        );
    }

    #[test]
    fn test_guarded_edges_across_entities() {
        let ctx = TransitionContext::default();

        assert!(matches!(
            assert_transition(
                ApplicationStatus::UnderReview,
                ApplicationStatus::Approved,
                &ctx
            ),
            Err(TransitionError::PreconditionFailed {
                condition: "tasks_complete",
                ..
            })
        ));
        assert!(matches!(
            assert_transition(OfferingStatus::Live, OfferingStatus::Funded, &ctx),
            Err(TransitionError::PreconditionFailed {
                condition: "funding_target_reached",
                ..
            })
        ));
        assert!(matches!(
            assert_transition(
                DistributionStatus::Declared,
                DistributionStatus::Approved,
                &ctx
            ),
            Err(TransitionError::PreconditionFailed {
                condition: "trustee_process_completed",
                ..
            })
        ));

        // Unguarded edges pass with an empty context
        assert!(assert_transition(DistributionStatus::Declared, DistributionStatus::Cancelled, &ctx).is_ok());
        assert!(assert_transition(MilestoneStatus::Rejected, MilestoneStatus::Pending, &ctx).is_ok());
    }

    #[test]
    fn test_by_name_dispatch() {
        let ctx = TransitionContext {
            allocation_snapshot_anchored: true,
            ..Default::default()
        };
        assert!(
            assert_transition_by_name(
                EntityKind::Subscription,
                "payment_received",
                "allocated",
                &ctx
            )
            .is_ok()
        );

        assert!(matches!(
            assert_transition_by_name(EntityKind::Offering, "live", "approved", &ctx),
            Err(TransitionError::UnknownStatus { .. })
        ));
        assert!(matches!(
            assert_transition_by_name(EntityKind::Offering, "live", "draft", &ctx),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }
}
