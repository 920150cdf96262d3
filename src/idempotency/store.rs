//! Idempotency record persistence
//!
//! Records are created exactly once on first successful execution and never
//! updated. The unique index on (command_id, user_id, route) resolves
//! concurrent insert races: losers observe `DuplicateKey` and re-read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;

use super::error::CommandError;

/// Key identifying one command instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandKey {
    pub command_id: String,
    pub user_id: i64,
    pub route: String,
}

impl CommandKey {
    pub fn new(command_id: impl Into<String>, user_id: i64, route: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            user_id,
            route: route.into(),
        }
    }
}

/// Durable record of one executed command
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub key: CommandKey,
    /// Content hash of the normalized payload; immutable after first write
    pub request_hash: String,
    /// Serialized result of the first successful execution
    pub response_body: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a conditional insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same key already exists (a concurrent request won)
    DuplicateKey,
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn find(&self, key: &CommandKey) -> Result<Option<IdempotencyRecord>, CommandError>;

    /// Conditional insert: never overwrites an existing record
    async fn insert(&self, record: &IdempotencyRecord) -> Result<InsertOutcome, CommandError>;
}

/// PostgreSQL-backed store
pub struct PgIdempotencyStore {
    pool: PgPool,
}

impl PgIdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn find(&self, key: &CommandKey) -> Result<Option<IdempotencyRecord>, CommandError> {
        let row = sqlx::query(
            r#"
            SELECT command_id, user_id, route, request_hash, response_body, created_at
            FROM idempotency_records_tb
            WHERE command_id = $1 AND user_id = $2 AND route = $3
            "#,
        )
        .bind(&key.command_id)
        .bind(key.user_id)
        .bind(&key.route)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| IdempotencyRecord {
            key: CommandKey {
                command_id: r.get("command_id"),
                user_id: r.get("user_id"),
                route: r.get("route"),
            },
            request_hash: r.get("request_hash"),
            response_body: r.get("response_body"),
            created_at: r.get("created_at"),
        }))
    }

    async fn insert(&self, record: &IdempotencyRecord) -> Result<InsertOutcome, CommandError> {
        // ON CONFLICT DO NOTHING + rows_affected distinguishes a lost race
        // from success without raising a unique-violation error.
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_records_tb
                (command_id, user_id, route, request_hash, response_body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (command_id, user_id, route) DO NOTHING
            "#,
        )
        .bind(&record.key.command_id)
        .bind(record.key.user_id)
        .bind(&record.key.route)
        .bind(&record.request_hash)
        .bind(&record.response_body)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::DuplicateKey)
        }
    }
}

/// In-memory store for tests and lightweight embedding
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    records: Mutex<HashMap<CommandKey, IdempotencyRecord>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("records lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn find(&self, key: &CommandKey) -> Result<Option<IdempotencyRecord>, CommandError> {
        Ok(self
            .records
            .lock()
            .expect("records lock poisoned")
            .get(key)
            .cloned())
    }

    async fn insert(&self, record: &IdempotencyRecord) -> Result<InsertOutcome, CommandError> {
        let mut records = self.records.lock().expect("records lock poisoned");
        if records.contains_key(&record.key) {
            return Ok(InsertOutcome::DuplicateKey);
        }
        records.insert(record.key.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }
}
