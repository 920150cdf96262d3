//! Chain-op queue persistence
//!
//! The claim is the critical concurrency safeguard: a conditional update
//! that moves a row out of `pending` only if it is still `pending`, so two
//! worker instances can never both process the same op. Stale-submitted
//! takeover uses the same shape with `updated_at` as the token, since the
//! status alone cannot arbitrate there. All other updates are keyed by id
//! and status to stay CAS-shaped.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::error::ChainOpError;
use super::types::{ChainOp, ChainOpId, ChainOpStatus, NewChainOp, OpPayload};

#[async_trait]
pub trait ChainOpStore: Send + Sync {
    /// Append a new op in `pending` status
    async fn enqueue(&self, op: &NewChainOp) -> Result<ChainOpId, ChainOpError>;

    async fn get(&self, id: ChainOpId) -> Result<Option<ChainOp>, ChainOpError>;

    /// Pending rows eligible for processing: retry budget left and
    /// `next_retry_at` unset or in the past. Oldest first.
    async fn due(&self, limit: i64, max_retries: i32) -> Result<Vec<ChainOp>, ChainOpError>;

    /// Atomically claim a pending row (CAS on status == pending).
    /// Returns the row as claimed, so the caller works on fresh retry
    /// bookkeeping rather than its pre-claim snapshot; None if another
    /// worker got there first.
    async fn claim(&self, id: ChainOpId) -> Result<Option<ChainOp>, ChainOpError>;

    /// Atomically take over a stale submitted row (CAS on status plus the
    /// `updated_at` observed in the stale scan, which the takeover bumps).
    /// Two instances holding the same scan result cannot both win.
    async fn claim_stale(
        &self,
        id: ChainOpId,
        observed_updated_at: DateTime<Utc>,
    ) -> Result<bool, ChainOpError>;

    /// Record the transaction handle returned by submission.
    /// Returns false if the row is no longer `submitted`.
    async fn mark_submitted(&self, id: ChainOpId, tx_hash: &str) -> Result<bool, ChainOpError>;

    /// Returns false if the row is no longer `submitted`; callers must not
    /// run post-confirmation effects in that case.
    async fn mark_confirmed(&self, id: ChainOpId) -> Result<bool, ChainOpError>;

    /// Return a claimed row to `pending` with its retry bookkeeping
    async fn record_failure(
        &self,
        id: ChainOpId,
        error: &str,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), ChainOpError>;

    async fn mark_dead_letter(&self, id: ChainOpId, error: &str) -> Result<(), ChainOpError>;

    /// Submitted rows untouched for longer than `threshold` - crash
    /// leftovers picked up for idempotent resumption
    async fn find_stale_submitted(
        &self,
        threshold: Duration,
        limit: i64,
    ) -> Result<Vec<ChainOp>, ChainOpError>;

    /// Operator action: return a dead-lettered op to the queue with a
    /// fresh retry budget
    async fn requeue_dead_letter(&self, id: ChainOpId) -> Result<bool, ChainOpError>;
}

/// PostgreSQL-backed queue
pub struct PgChainOpStore {
    pool: PgPool,
}

impl PgChainOpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_op(row: &sqlx::postgres::PgRow) -> Result<ChainOp, ChainOpError> {
        let id_str: String = row.get("op_id");
        let id: ChainOpId = id_str
            .parse()
            .map_err(|_| ChainOpError::CorruptRow(format!("bad op_id '{}'", id_str)))?;

        let status_name: String = row.get("status");
        let status = ChainOpStatus::from_name(&status_name)
            .ok_or_else(|| ChainOpError::CorruptRow(format!("bad status '{}'", status_name)))?;

        let payload_value: serde_json::Value = row.get("payload");
        let payload: OpPayload = serde_json::from_value(payload_value)
            .map_err(|e| ChainOpError::CorruptRow(format!("bad payload for {}: {}", id, e)))?;

        Ok(ChainOp {
            id,
            entity_type: row.get("entity_type"),
            entity_id: row.get("entity_id"),
            payload,
            status,
            tx_hash: row.get("tx_hash"),
            retry_count: row.get("retry_count"),
            next_retry_at: row.get("next_retry_at"),
            error: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

const SELECT_COLUMNS: &str = "op_id, op_type, entity_type, entity_id, payload, status, \
     tx_hash, retry_count, next_retry_at, error_message, created_at, updated_at";

#[async_trait]
impl ChainOpStore for PgChainOpStore {
    async fn enqueue(&self, op: &NewChainOp) -> Result<ChainOpId, ChainOpError> {
        let id = ChainOpId::new();
        let payload = serde_json::to_value(&op.payload)
            .map_err(|e| ChainOpError::CorruptRow(format!("unserializable payload: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO chain_ops_tb (op_id, op_type, entity_type, entity_id, payload, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            "#,
        )
        .bind(id.to_string())
        .bind(op.payload.op_type())
        .bind(&op.entity_type)
        .bind(&op.entity_id)
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        tracing::info!(op_id = %id, op_type = op.payload.op_type(), "Chain op enqueued");
        Ok(id)
    }

    async fn get(&self, id: ChainOpId) -> Result<Option<ChainOp>, ChainOpError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM chain_ops_tb WHERE op_id = $1",
            SELECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_op(&row)?)),
            None => Ok(None),
        }
    }

    async fn due(&self, limit: i64, max_retries: i32) -> Result<Vec<ChainOp>, ChainOpError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM chain_ops_tb
            WHERE status = 'pending'
              AND retry_count < $1
              AND (next_retry_at IS NULL OR next_retry_at <= NOW())
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            SELECT_COLUMNS
        ))
        .bind(max_retries)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_op).collect()
    }

    async fn claim(&self, id: ChainOpId) -> Result<Option<ChainOp>, ChainOpError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE chain_ops_tb
            SET status = 'submitted', updated_at = NOW()
            WHERE op_id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_op(&row)?)),
            None => Ok(None),
        }
    }

    async fn claim_stale(
        &self,
        id: ChainOpId,
        observed_updated_at: DateTime<Utc>,
    ) -> Result<bool, ChainOpError> {
        let result = sqlx::query(
            r#"
            UPDATE chain_ops_tb
            SET updated_at = NOW()
            WHERE op_id = $1 AND status = 'submitted' AND updated_at = $2
            "#,
        )
        .bind(id.to_string())
        .bind(observed_updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_submitted(&self, id: ChainOpId, tx_hash: &str) -> Result<bool, ChainOpError> {
        let result = sqlx::query(
            r#"
            UPDATE chain_ops_tb
            SET tx_hash = $1, updated_at = NOW()
            WHERE op_id = $2 AND status = 'submitted'
            "#,
        )
        .bind(tx_hash)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_confirmed(&self, id: ChainOpId) -> Result<bool, ChainOpError> {
        let result = sqlx::query(
            r#"
            UPDATE chain_ops_tb
            SET status = 'confirmed', error_message = NULL, updated_at = NOW()
            WHERE op_id = $1 AND status = 'submitted'
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_failure(
        &self,
        id: ChainOpId,
        error: &str,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), ChainOpError> {
        sqlx::query(
            r#"
            UPDATE chain_ops_tb
            SET status = 'pending', error_message = $1, retry_count = $2,
                next_retry_at = $3, updated_at = NOW()
            WHERE op_id = $4
            "#,
        )
        .bind(error)
        .bind(retry_count)
        .bind(next_retry_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_dead_letter(&self, id: ChainOpId, error: &str) -> Result<(), ChainOpError> {
        sqlx::query(
            r#"
            UPDATE chain_ops_tb
            SET status = 'dead_letter', error_message = $1, updated_at = NOW()
            WHERE op_id = $2
            "#,
        )
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_stale_submitted(
        &self,
        threshold: Duration,
        limit: i64,
    ) -> Result<Vec<ChainOp>, ChainOpError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM chain_ops_tb
            WHERE status = 'submitted'
              AND updated_at < NOW() - INTERVAL '1 second' * $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
            SELECT_COLUMNS
        ))
        .bind(threshold.as_secs() as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_op).collect()
    }

    async fn requeue_dead_letter(&self, id: ChainOpId) -> Result<bool, ChainOpError> {
        let result = sqlx::query(
            r#"
            UPDATE chain_ops_tb
            SET status = 'pending', retry_count = 0, next_retry_at = NULL,
                error_message = NULL, updated_at = NOW()
            WHERE op_id = $1 AND status = 'dead_letter'
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-memory queue for tests and lightweight embedding.
/// Mirrors the Postgres CAS semantics under one mutex.
#[derive(Default)]
pub struct MemoryChainOpStore {
    ops: Mutex<HashMap<ChainOpId, ChainOp>>,
}

impl MemoryChainOpStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.lock().expect("ops lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All ops in creation order (test inspection)
    pub fn all(&self) -> Vec<ChainOp> {
        let mut ops: Vec<ChainOp> = self
            .ops
            .lock()
            .expect("ops lock poisoned")
            .values()
            .cloned()
            .collect();
        ops.sort_by_key(|op| op.id.inner());
        ops
    }

    fn update<F>(&self, id: ChainOpId, apply: F) -> Result<(), ChainOpError>
    where
        F: FnOnce(&mut ChainOp),
    {
        let mut ops = self.ops.lock().expect("ops lock poisoned");
        let op = ops
            .get_mut(&id)
            .ok_or_else(|| ChainOpError::OpNotFound(id.to_string()))?;
        apply(op);
        op.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ChainOpStore for MemoryChainOpStore {
    async fn enqueue(&self, op: &NewChainOp) -> Result<ChainOpId, ChainOpError> {
        let id = ChainOpId::new();
        let now = Utc::now();
        self.ops.lock().expect("ops lock poisoned").insert(
            id,
            ChainOp {
                id,
                entity_type: op.entity_type.clone(),
                entity_id: op.entity_id.clone(),
                payload: op.payload.clone(),
                status: ChainOpStatus::Pending,
                tx_hash: None,
                retry_count: 0,
                next_retry_at: None,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get(&self, id: ChainOpId) -> Result<Option<ChainOp>, ChainOpError> {
        Ok(self.ops.lock().expect("ops lock poisoned").get(&id).cloned())
    }

    async fn due(&self, limit: i64, max_retries: i32) -> Result<Vec<ChainOp>, ChainOpError> {
        let now = Utc::now();
        let mut due: Vec<ChainOp> = self
            .ops
            .lock()
            .expect("ops lock poisoned")
            .values()
            .filter(|op| {
                op.status == ChainOpStatus::Pending
                    && op.retry_count < max_retries
                    && op.next_retry_at.is_none_or(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|op| op.created_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claim(&self, id: ChainOpId) -> Result<Option<ChainOp>, ChainOpError> {
        let mut ops = self.ops.lock().expect("ops lock poisoned");
        match ops.get_mut(&id) {
            Some(op) if op.status == ChainOpStatus::Pending => {
                op.status = ChainOpStatus::Submitted;
                op.updated_at = Utc::now();
                Ok(Some(op.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn claim_stale(
        &self,
        id: ChainOpId,
        observed_updated_at: DateTime<Utc>,
    ) -> Result<bool, ChainOpError> {
        let mut ops = self.ops.lock().expect("ops lock poisoned");
        match ops.get_mut(&id) {
            Some(op)
                if op.status == ChainOpStatus::Submitted
                    && op.updated_at == observed_updated_at =>
            {
                // Must move the timestamp even inside the clock's resolution,
                // or a same-instant takeover would leave the CAS token valid.
                let now = Utc::now();
                op.updated_at = if now > observed_updated_at {
                    now
                } else {
                    observed_updated_at + ChronoDuration::microseconds(1)
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_submitted(&self, id: ChainOpId, tx_hash: &str) -> Result<bool, ChainOpError> {
        let mut ops = self.ops.lock().expect("ops lock poisoned");
        match ops.get_mut(&id) {
            Some(op) if op.status == ChainOpStatus::Submitted => {
                op.tx_hash = Some(tx_hash.to_string());
                op.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_confirmed(&self, id: ChainOpId) -> Result<bool, ChainOpError> {
        let mut ops = self.ops.lock().expect("ops lock poisoned");
        match ops.get_mut(&id) {
            Some(op) if op.status == ChainOpStatus::Submitted => {
                op.status = ChainOpStatus::Confirmed;
                op.error = None;
                op.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_failure(
        &self,
        id: ChainOpId,
        error: &str,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), ChainOpError> {
        self.update(id, |op| {
            op.status = ChainOpStatus::Pending;
            op.error = Some(error.to_string());
            op.retry_count = retry_count;
            op.next_retry_at = Some(next_retry_at);
        })
    }

    async fn mark_dead_letter(&self, id: ChainOpId, error: &str) -> Result<(), ChainOpError> {
        self.update(id, |op| {
            op.status = ChainOpStatus::DeadLetter;
            op.error = Some(error.to_string());
        })
    }

    async fn find_stale_submitted(
        &self,
        threshold: Duration,
        limit: i64,
    ) -> Result<Vec<ChainOp>, ChainOpError> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(threshold).unwrap_or_else(|_| ChronoDuration::seconds(0));
        let mut stale: Vec<ChainOp> = self
            .ops
            .lock()
            .expect("ops lock poisoned")
            .values()
            .filter(|op| op.status == ChainOpStatus::Submitted && op.updated_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|op| op.updated_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn requeue_dead_letter(&self, id: ChainOpId) -> Result<bool, ChainOpError> {
        let mut ops = self.ops.lock().expect("ops lock poisoned");
        match ops.get_mut(&id) {
            Some(op) if op.status == ChainOpStatus::DeadLetter => {
                op.status = ChainOpStatus::Pending;
                op.retry_count = 0;
                op.next_retry_at = None;
                op.error = None;
                op.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
