//! End-to-end subscription settlement flow across the core subsystems,
//! using the in-memory stores and the mock chain adapter.
//!
//! Walks one subscription from payment to settlement the way the command
//! handlers drive it: idempotent allocation command, escrow reconciliation,
//! mint through the outbox worker, and a status transition at each step.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use rwa_backoffice::chain_ops::{
    ChainOpStatus, ChainOpStore, ChainOpWorker, MemoryChainOpStore, MockChainAdapter, NewChainOp,
    OpPayload,
};
use rwa_backoffice::config::ChainWorkerConfig;
use rwa_backoffice::events::RecordingPublisher;
use rwa_backoffice::idempotency::MemoryIdempotencyStore;
use rwa_backoffice::ledger::{Direction, EscrowReceipt, LedgerEntry, LedgerType, ReceiptStatus};
use rwa_backoffice::reconciliation::{
    MemoryReconciliationStore, ReconcileSnapshot, ReconcileSource, RunStatus, run_reconciliation,
};
use rwa_backoffice::transitions::{SubscriptionStatus, TransitionContext};
use rwa_backoffice::{CommandError, assert_transition, run_idempotent_command};

fn escrow_entry(external_ref: &str, amount: Decimal) -> LedgerEntry {
    LedgerEntry {
        id: 1,
        ledger_type: LedgerType::Escrow,
        account_ref: "escrow:off-1".to_string(),
        direction: Direction::Credit,
        amount,
        currency: "USD".to_string(),
        entity_type: "subscription".to_string(),
        entity_id: "sub-1".to_string(),
        external_ref: Some(external_ref.to_string()),
        idempotency_key: None,
        metadata: json!({}),
        posted_at: Utc::now(),
    }
}

fn confirmed_receipt(external_ref: &str, amount: Decimal) -> EscrowReceipt {
    EscrowReceipt {
        external_ref: external_ref.to_string(),
        source: "bank".to_string(),
        amount,
        status: ReceiptStatus::Confirmed,
        occurred_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_subscription_settles_end_to_end() {
    // Verified receipt: payment_pending -> payment_received
    let ctx = TransitionContext {
        has_verified_receipt: true,
        ..TransitionContext::default()
    };
    assert_transition(
        SubscriptionStatus::PaymentPending,
        SubscriptionStatus::PaymentReceived,
        &ctx,
    )
    .expect("verified receipt should allow payment confirmation");

    // Allocation command enqueues the mint; replays must not enqueue twice
    let idem = MemoryIdempotencyStore::new();
    let chain_store = Arc::new(MemoryChainOpStore::new());
    let payload = json!({"subscription": "sub-1", "units": 500});

    for _ in 0..2 {
        let response = run_idempotent_command(
            &idem,
            Some("cmd-alloc-1"),
            7,
            "subscriptions.allocate",
            &payload,
            || async {
                let id = chain_store
                    .enqueue(&NewChainOp {
                        entity_type: "subscription".to_string(),
                        entity_id: "sub-1".to_string(),
                        payload: OpPayload::Mint {
                            token: "0xT0K".to_string(),
                            to_wallet: "0xW4LL".to_string(),
                            amount: Decimal::new(500, 0),
                            lockup_days: None,
                        },
                    })
                    .await
                    .map_err(|e| CommandError::Execution(e.to_string()))?;
                Ok(json!({"chain_op_id": id.to_string()}))
            },
        )
        .await
        .expect("allocation command should succeed");
        assert!(response["chain_op_id"].is_string());
    }
    assert_eq!(chain_store.len(), 1, "replay must not enqueue a second mint");

    // Escrow audit over the receipt and ledger rows backing the allocation
    let recon_store = MemoryReconciliationStore::new();
    recon_store.set_snapshot(ReconcileSnapshot {
        receipts: vec![confirmed_receipt("bank-tx-77", Decimal::new(50_000, 2))],
        escrow_entries: vec![escrow_entry("bank-tx-77", Decimal::new(50_000, 2))],
    });
    let summary = run_reconciliation(&recon_store, ReconcileSource::Bank, Decimal::ZERO)
        .await
        .expect("reconciliation pass should complete");
    assert_eq!(summary.status, RunStatus::Ok);
    assert_eq!(summary.matched_count, 1);
    assert_eq!(summary.mismatch_count, 0);

    // Outbox worker drives the mint to confirmation
    let adapter = Arc::new(MockChainAdapter::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let worker = ChainOpWorker::new(
        Arc::clone(&chain_store) as Arc<dyn ChainOpStore>,
        Arc::clone(&adapter) as _,
        Arc::clone(&publisher) as _,
        ChainWorkerConfig {
            confirm_poll_ms: 1,
            ..ChainWorkerConfig::default()
        },
    );
    assert_eq!(worker.tick().await, 1);

    let ops = chain_store.all();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].status, ChainOpStatus::Confirmed);
    assert_eq!(adapter.submission_count(), 1);
    assert_eq!(publisher.topics(), vec!["chain_op.confirmed"]);

    // Allocation snapshot anchored on-chain: payment_received -> allocated,
    // then settlement
    let ctx = TransitionContext {
        allocation_snapshot_anchored: true,
        ..TransitionContext::default()
    };
    assert_transition(
        SubscriptionStatus::PaymentReceived,
        SubscriptionStatus::Allocated,
        &ctx,
    )
    .expect("anchored snapshot should allow allocation");
    assert_transition(
        SubscriptionStatus::Allocated,
        SubscriptionStatus::Settled,
        &TransitionContext::default(),
    )
    .expect("allocated subscription should settle");
}

#[tokio::test]
async fn test_unanchored_allocation_is_rejected() {
    let err = assert_transition(
        SubscriptionStatus::PaymentReceived,
        SubscriptionStatus::Allocated,
        &TransitionContext::default(),
    )
    .expect_err("allocation without an anchored snapshot must fail");
    assert!(err.to_string().contains("allocation_snapshot_anchored"));
}

#[tokio::test]
async fn test_amount_drift_surfaces_as_mismatch_run() {
    let recon_store = MemoryReconciliationStore::new();
    recon_store.set_snapshot(ReconcileSnapshot {
        receipts: vec![confirmed_receipt("bank-tx-77", Decimal::new(50_060, 2))],
        escrow_entries: vec![escrow_entry("bank-tx-77", Decimal::new(50_000, 2))],
    });

    let summary = run_reconciliation(&recon_store, ReconcileSource::Bank, Decimal::new(5, 1))
        .await
        .expect("reconciliation pass should complete");
    assert_eq!(summary.status, RunStatus::Mismatch);
    assert_eq!(summary.mismatch_count, 1);
}
