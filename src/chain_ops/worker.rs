//! Outbox drain worker
//!
//! Polls the queue for due rows, claims each one, and drives it through
//! submit → confirm. A row that already carries a tx hash is resumed by
//! checking the chain rather than resubmitted, which keeps the external
//! side effect at-most-once across crashes and retries.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::ChainWorkerConfig;
use crate::events::{DomainEvent, EventPublisher};

use super::adapter::ChainAdapter;
use super::error::ChainOpError;
use super::store::ChainOpStore;
use super::types::{ChainOp, ChainOpId, NewChainOp, OpPayload};

/// Capped exponential backoff: min(base * 2^retry_count, cap)
pub fn backoff_delay(retry_count: i32, base_ms: u64, cap_ms: u64) -> Duration {
    let shift = retry_count.clamp(0, 63) as u32;
    let delay = 2u64
        .checked_pow(shift)
        .and_then(|factor| base_ms.checked_mul(factor))
        .unwrap_or(cap_ms)
        .min(cap_ms);
    Duration::from_millis(delay)
}

pub struct ChainOpWorker {
    store: Arc<dyn ChainOpStore>,
    adapter: Arc<dyn ChainAdapter>,
    publisher: Arc<dyn EventPublisher>,
    cfg: ChainWorkerConfig,
    /// Ops currently being driven by this instance, consulted on shutdown
    in_flight: Mutex<HashSet<ChainOpId>>,
    /// Single-flight guard: at most one tick runs at a time
    ticking: AtomicBool,
    stopped: AtomicBool,
}

impl ChainOpWorker {
    pub fn new(
        store: Arc<dyn ChainOpStore>,
        adapter: Arc<dyn ChainAdapter>,
        publisher: Arc<dyn EventPublisher>,
        cfg: ChainWorkerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            adapter,
            publisher,
            cfg,
            in_flight: Mutex::new(HashSet::new()),
            ticking: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Spawn the polling loop
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                poll_interval_ms = worker.cfg.poll_interval_ms,
                batch_size = worker.cfg.batch_size,
                "Chain-op worker started"
            );
            let mut interval =
                tokio::time::interval(Duration::from_millis(worker.cfg.poll_interval_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Consume the immediate first tick
            interval.tick().await;

            while !worker.stopped.load(Ordering::SeqCst) {
                interval.tick().await;
                if worker.stopped.load(Ordering::SeqCst) {
                    break;
                }
                worker.tick().await;
            }
            info!("Chain-op worker stopped");
        })
    }

    /// Run one drain pass immediately, outside the poll schedule.
    /// Returns the number of ops processed; 0 if a pass was already running.
    pub async fn trigger_now(&self) -> usize {
        self.tick().await
    }

    /// One drain pass: resume stale submissions, then claim and process
    /// due pending rows
    pub async fn tick(&self) -> usize {
        if self.ticking.swap(true, Ordering::SeqCst) {
            debug!("Drain pass already in progress, skipping");
            return 0;
        }

        let mut processed = 0;

        match self
            .store
            .find_stale_submitted(
                Duration::from_secs(self.cfg.stale_submitted_secs),
                self.cfg.batch_size,
            )
            .await
        {
            Ok(stale) => {
                for op in stale {
                    // Take over via the updated_at CAS so another instance
                    // scanning the same rows cannot also resume this one
                    match self.store.claim_stale(op.id, op.updated_at).await {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!(op_id = %op.id, "Stale op taken by another instance, skipping");
                            continue;
                        }
                        Err(e) => {
                            error!(op_id = %op.id, error = %e, "Stale takeover failed");
                            continue;
                        }
                    }
                    if !self.track(op.id) {
                        continue;
                    }
                    warn!(op = %op, "Resuming stale submitted op");
                    self.process_op(op).await;
                    processed += 1;
                }
            }
            Err(e) => error!(error = %e, "Failed to query stale submissions"),
        }

        match self
            .store
            .due(self.cfg.batch_size, self.cfg.max_retries)
            .await
        {
            Ok(due) => {
                for op in due {
                    if self.stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    // Work on the row as claimed, not the due() snapshot:
                    // retry bookkeeping may have moved in between
                    let claimed = match self.store.claim(op.id).await {
                        Ok(Some(claimed)) => claimed,
                        Ok(None) => {
                            debug!(op_id = %op.id, "Lost claim, skipping");
                            continue;
                        }
                        Err(e) => {
                            error!(op_id = %op.id, error = %e, "Claim failed");
                            continue;
                        }
                    };
                    if !self.track(claimed.id) {
                        continue;
                    }
                    self.process_op(claimed).await;
                    processed += 1;
                }
            }
            Err(e) => error!(error = %e, "Failed to query due ops"),
        }

        self.ticking.store(false, Ordering::SeqCst);
        processed
    }

    fn track(&self, id: ChainOpId) -> bool {
        self.in_flight
            .lock()
            .expect("in_flight lock poisoned")
            .insert(id)
    }

    fn untrack(&self, id: ChainOpId) {
        self.in_flight
            .lock()
            .expect("in_flight lock poisoned")
            .remove(&id);
    }

    /// Drive one claimed op to a terminal or retryable outcome.
    /// Never returns an error: every failure becomes retry bookkeeping.
    async fn process_op(&self, op: ChainOp) {
        let id = op.id;
        let result = self.execute(&op).await;
        match result {
            Ok(tx_hash) => self.confirm_op(&op, &tx_hash).await,
            Err(e) => self.fail_op(&op, &e).await,
        }
        self.untrack(id);
    }

    async fn execute(&self, op: &ChainOp) -> Result<String, ChainOpError> {
        let tx_hash = match &op.tx_hash {
            // Already submitted once: resume, never resubmit
            Some(existing) => existing.clone(),
            None => {
                let tx_hash = self.adapter.submit(&op.payload).await?;
                info!(op = %op, tx_hash = %tx_hash, "Chain op submitted");
                if !self.store.mark_submitted(op.id, &tx_hash).await? {
                    warn!(
                        op = %op, tx_hash = %tx_hash,
                        "Row left submitted state before the hash landed"
                    );
                }
                tx_hash
            }
        };

        self.wait_for_confirmation(&tx_hash).await?;
        Ok(tx_hash)
    }

    /// Poll the adapter until the tx confirms or the bounded wait elapses
    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<(), ChainOpError> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.cfg.confirm_timeout_ms);
        loop {
            if self.adapter.is_confirmed(tx_hash).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ChainOpError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited_ms: self.cfg.confirm_timeout_ms,
                });
            }
            tokio::time::sleep(Duration::from_millis(self.cfg.confirm_poll_ms)).await;
        }
    }

    async fn confirm_op(&self, op: &ChainOp, tx_hash: &str) {
        // Post-confirmation effects only fire when this update actually
        // moved the row; a row pulled out of `submitted` by an operator or
        // another instance gets no event and no follow-on ops
        match self.store.mark_confirmed(op.id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(op = %op, "Row no longer submitted, skipping confirmation effects");
                return;
            }
            Err(e) => {
                error!(op = %op, error = %e, "Failed to persist confirmation");
                return;
            }
        }
        info!(op = %op, tx_hash = %tx_hash, "Chain op confirmed");

        self.publisher
            .publish(DomainEvent {
                topic: "chain_op.confirmed",
                entity_type: op.entity_type.clone(),
                entity_id: op.entity_id.clone(),
                payload: serde_json::json!({
                    "op_id": op.id.to_string(),
                    "op_type": op.payload.op_type(),
                    "tx_hash": tx_hash,
                }),
            })
            .await;

        // A mint with a lockup schedules the lock as its own queued op,
        // so a crash between the two leaves a resumable row rather than
        // an unlocked position
        if let OpPayload::Mint {
            token,
            to_wallet,
            amount,
            lockup_days: Some(days),
        } = &op.payload
            && *days > 0
        {
            let follow_on = NewChainOp {
                entity_type: op.entity_type.clone(),
                entity_id: op.entity_id.clone(),
                payload: OpPayload::LockTokens {
                    token: token.clone(),
                    wallet: to_wallet.clone(),
                    amount: *amount,
                    until: Utc::now() + chrono::Duration::days(i64::from(*days)),
                },
            };
            match self.store.enqueue(&follow_on).await {
                Ok(lock_id) => {
                    info!(op_id = %op.id, lock_op_id = %lock_id, lockup_days = days, "Enqueued follow-on lock")
                }
                Err(e) => error!(op_id = %op.id, error = %e, "Failed to enqueue follow-on lock"),
            }
        }
    }

    async fn fail_op(&self, op: &ChainOp, cause: &ChainOpError) {
        let retry_count = op.retry_count + 1;
        if retry_count >= self.cfg.max_retries {
            error!(op = %op, error = %cause, "Retry budget exhausted, dead-lettering");
            if let Err(e) = self.store.mark_dead_letter(op.id, &cause.to_string()).await {
                error!(op = %op, error = %e, "Failed to persist dead letter");
                return;
            }
            self.publisher
                .publish(DomainEvent {
                    topic: "chain_op.dead_letter",
                    entity_type: op.entity_type.clone(),
                    entity_id: op.entity_id.clone(),
                    payload: serde_json::json!({
                        "op_id": op.id.to_string(),
                        "op_type": op.payload.op_type(),
                        "error": cause.to_string(),
                    }),
                })
                .await;
            return;
        }

        let delay = backoff_delay(
            op.retry_count,
            self.cfg.base_backoff_ms,
            self.cfg.backoff_cap_ms,
        );
        let next_retry_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(0));
        warn!(
            op = %op, error = %cause, retry_count, delay_ms = delay.as_millis() as u64,
            "Chain op failed, scheduling retry"
        );
        if let Err(e) = self
            .store
            .record_failure(op.id, &cause.to_string(), retry_count, next_retry_at)
            .await
        {
            error!(op = %op, error = %e, "Failed to persist retry state");
        }
    }

    /// Signal the loop to stop without waiting for in-flight ops
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Stop accepting work and wait up to `shutdown_wait_ms` for in-flight
    /// ops to finish
    pub async fn stop_and_drain(&self) {
        self.stop();
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.cfg.shutdown_wait_ms);
        loop {
            let remaining: Vec<ChainOpId> = self
                .in_flight
                .lock()
                .expect("in_flight lock poisoned")
                .iter()
                .copied()
                .collect();
            if remaining.is_empty() {
                info!("Chain-op worker drained");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    count = remaining.len(),
                    ops = ?remaining.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
                    "Shutdown wait elapsed with ops still in flight; they will resume on restart"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
