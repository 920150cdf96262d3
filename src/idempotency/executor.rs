//! At-most-once command execution

use chrono::Utc;
use serde_json::Value;
use std::future::Future;
use tracing::{debug, info};

use super::error::CommandError;
use super::hash::request_hash;
use super::store::{CommandKey, IdempotencyRecord, IdempotencyStore, InsertOutcome};

/// Run a mutating command with replay protection.
///
/// Without a command id the command executes directly (the caller opted out
/// of idempotency). With one, the durable record is the single source of
/// truth for "did this already happen":
///
/// - existing record with matching payload hash: the stored response is
///   returned and `execute` is not called;
/// - existing record with a different hash: [`CommandError::Conflict`];
/// - no record: `execute` runs, then the record is inserted. If a concurrent
///   identical request won the insert race, the winner's record is re-read
///   and the same match/conflict logic applies - the just-run result is not
///   silently discarded in favor of an incompatible record.
///
/// Only successful executions are recorded; a failed command may be retried
/// under the same command id.
pub async fn run_idempotent_command<S, F, Fut>(
    store: &S,
    command_id: Option<&str>,
    user_id: i64,
    route: &str,
    payload: &Value,
    execute: F,
) -> Result<Value, CommandError>
where
    S: IdempotencyStore + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, CommandError>>,
{
    let Some(command_id) = command_id else {
        return execute().await;
    };

    let key = CommandKey::new(command_id, user_id, route);
    let hash = request_hash(payload);

    if let Some(existing) = store.find(&key).await? {
        return replay_or_conflict(existing, &hash);
    }

    let response = execute().await?;

    let record = IdempotencyRecord {
        key: key.clone(),
        request_hash: hash.clone(),
        response_body: response.clone(),
        created_at: Utc::now(),
    };

    match store.insert(&record).await? {
        InsertOutcome::Inserted => Ok(response),
        InsertOutcome::DuplicateKey => {
            // A concurrent request with the same key won the race. Its record
            // is the durable truth; apply the same match/conflict logic.
            info!(
                command_id = %key.command_id,
                route = %key.route,
                "Lost idempotency insert race, resolving against winner"
            );
            let winner = store
                .find(&key)
                .await?
                .ok_or_else(|| CommandError::RecordVanished {
                    command_id: key.command_id.clone(),
                })?;
            replay_or_conflict(winner, &hash)
        }
    }
}

fn replay_or_conflict(record: IdempotencyRecord, hash: &str) -> Result<Value, CommandError> {
    if record.request_hash == hash {
        debug!(
            command_id = %record.key.command_id,
            route = %record.key.route,
            "Replaying stored command response"
        );
        Ok(record.response_body)
    } else {
        Err(CommandError::Conflict {
            command_id: record.key.command_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::store::MemoryIdempotencyStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_no_command_id_executes_directly() {
        let store = MemoryIdempotencyStore::new();
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let result = run_idempotent_command(
                &store,
                None,
                7,
                "subscriptions.create",
                &json!({"offering": "off-1"}),
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"id": "sub-1"}))
                },
            )
            .await
            .unwrap();
            assert_eq!(result, json!({"id": "sub-1"}));
        }

        // No idempotency requested: both calls executed, nothing recorded
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_replay_returns_cached_response_once_executed() {
        let store = MemoryIdempotencyStore::new();
        let calls = AtomicU32::new(0);

        // Byte-different but semantically equal payloads (key order)
        let first: Value = serde_json::from_str(r#"{"offering": "off-1", "units": 10}"#).unwrap();
        let second: Value = serde_json::from_str(r#"{"units": 10, "offering": "off-1"}"#).unwrap();

        for payload in [&first, &second] {
            let result = run_idempotent_command(
                &store,
                Some("cmd-1"),
                7,
                "subscriptions.create",
                payload,
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"id": "sub-1"}))
                },
            )
            .await
            .unwrap();
            assert_eq!(result, json!({"id": "sub-1"}));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "execute must run at most once");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_same_command_id_different_payload_conflicts() {
        let store = MemoryIdempotencyStore::new();

        run_idempotent_command(
            &store,
            Some("cmd-1"),
            7,
            "subscriptions.create",
            &json!({"units": 10}),
            || async { Ok(json!({"id": "sub-1"})) },
        )
        .await
        .unwrap();

        let result = run_idempotent_command(
            &store,
            Some("cmd-1"),
            7,
            "subscriptions.create",
            &json!({"units": 999}),
            || async { Ok(json!({"id": "sub-2"})) },
        )
        .await;

        assert!(matches!(result, Err(CommandError::Conflict { .. })));
        assert_eq!(store.len(), 1, "conflicting request must not overwrite");
    }

    #[tokio::test]
    async fn test_failed_execution_is_not_recorded() {
        let store = MemoryIdempotencyStore::new();

        let result = run_idempotent_command(
            &store,
            Some("cmd-1"),
            7,
            "subscriptions.create",
            &json!({"units": 10}),
            || async { Err(CommandError::Execution("escrow unavailable".to_string())) },
        )
        .await;
        assert!(matches!(result, Err(CommandError::Execution(_))));
        assert!(store.is_empty());

        // Retry with the same command id succeeds and records
        let result = run_idempotent_command(
            &store,
            Some("cmd-1"),
            7,
            "subscriptions.create",
            &json!({"units": 10}),
            || async { Ok(json!({"id": "sub-1"})) },
        )
        .await
        .unwrap();
        assert_eq!(result, json!({"id": "sub-1"}));
        assert_eq!(store.len(), 1);
    }

    /// Store that simulates losing the insert race: `find` misses until an
    /// insert is attempted, the insert reports a duplicate, and subsequent
    /// reads observe the concurrent winner's record.
    struct RacingStore {
        winner: IdempotencyRecord,
        raced: Mutex<bool>,
    }

    #[async_trait]
    impl IdempotencyStore for RacingStore {
        async fn find(&self, _key: &CommandKey) -> Result<Option<IdempotencyRecord>, CommandError> {
            let raced = *self.raced.lock().unwrap();
            Ok(raced.then(|| self.winner.clone()))
        }

        async fn insert(&self, _record: &IdempotencyRecord) -> Result<InsertOutcome, CommandError> {
            *self.raced.lock().unwrap() = true;
            Ok(InsertOutcome::DuplicateKey)
        }
    }

    #[tokio::test]
    async fn test_lost_race_replays_winner_result() {
        let payload = json!({"units": 10});
        let store = RacingStore {
            winner: IdempotencyRecord {
                key: CommandKey::new("cmd-1", 7, "subscriptions.create"),
                request_hash: request_hash(&payload),
                response_body: json!({"id": "sub-winner"}),
                created_at: Utc::now(),
            },
            raced: Mutex::new(false),
        };

        let result = run_idempotent_command(
            &store,
            Some("cmd-1"),
            7,
            "subscriptions.create",
            &payload,
            || async { Ok(json!({"id": "sub-loser"})) },
        )
        .await
        .unwrap();

        // The loser's execute ran, but the durable record wins
        assert_eq!(result, json!({"id": "sub-winner"}));
    }

    #[tokio::test]
    async fn test_lost_race_with_different_payload_conflicts() {
        let store = RacingStore {
            winner: IdempotencyRecord {
                key: CommandKey::new("cmd-1", 7, "subscriptions.create"),
                request_hash: request_hash(&json!({"units": 999})),
                response_body: json!({"id": "sub-winner"}),
                created_at: Utc::now(),
            },
            raced: Mutex::new(false),
        };

        let result = run_idempotent_command(
            &store,
            Some("cmd-1"),
            7,
            "subscriptions.create",
            &json!({"units": 10}),
            || async { Ok(json!({"id": "sub-loser"})) },
        )
        .await;

        assert!(matches!(result, Err(CommandError::Conflict { .. })));
    }
}
