//! Idempotency Guard: at-most-once execution per caller-supplied key.
//!
//! # Flow
//!
//! 1. Validate the key
//! 2. Replay the stored response if the key was seen before
//! 3. Otherwise run the handler, then record its response
//!
//! The record is written after the handler completes. Two concurrent first
//! uses of one key may both run the handler; the unique key constraint keeps
//! a single record and the losing caller returns that record's response.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use swiftslot_domain::{IdempotencyKey, IdempotencyRecord, StoredResponse};
use swiftslot_store::{Store, StoreError};

use crate::error::{EngineError, EngineResult};

/// Scope label for booking creation
pub const CREATE_BOOKING_SCOPE: &str = "create-booking";

/// Wraps state-mutating handlers with replay-on-retry semantics.
pub struct IdempotencyGuard<S: Store> {
    store: Arc<S>,
}

impl<S: Store> IdempotencyGuard<S> {
    /// Create a new guard.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run `handler` at most once for `key`.
    ///
    /// Server failures (status 5xx) are returned but not recorded, so the
    /// caller may retry with the same key.
    ///
    /// # Errors
    /// - `Validation` (`missing_idempotency_key`) if the key is absent, blank or too long
    /// - `Conflict` (`idempotency_conflict`) if the stored response cannot be
    ///   decoded or was recorded under another scope
    pub async fn execute<F, Fut>(
        &self,
        key: Option<&str>,
        scope: &str,
        handler: F,
    ) -> EngineResult<StoredResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoredResponse>,
    {
        let key = IdempotencyKey::new(key.unwrap_or_default()).map_err(|_| {
            EngineError::validation("missing_idempotency_key", "Missing Idempotency-Key header")
        })?;

        if let Some(record) = self.store.idempotency().find(key.as_str()).await? {
            debug!(key = %key, scope, "Replaying stored response");
            return replay(&record, scope);
        }

        let response = handler().await;
        if response.status >= 500 {
            warn!(key = %key, scope, status = response.status, "Handler failed, response not recorded");
            return Ok(response);
        }

        let record = IdempotencyRecord::new(key.as_str(), scope, &response)?;
        match self.store.idempotency().insert(&record).await {
            Ok(()) => {
                info!(key = %key, scope, status = response.status, "Response recorded");
                Ok(response)
            },
            Err(e) if e.is_duplicate() => {
                warn!(key = %key, scope, "Concurrent first use of key, returning surviving response");
                let surviving = self
                    .store
                    .idempotency()
                    .find(key.as_str())
                    .await?
                    .ok_or_else(|| StoreError::not_found("idempotency_record", key.as_str()))?;
                replay(&surviving, scope)
            },
            Err(e) => Err(e.into()),
        }
    }
}

fn replay(record: &IdempotencyRecord, scope: &str) -> EngineResult<StoredResponse> {
    if record.scope != scope {
        warn!(key = %record.key, stored = %record.scope, requested = scope, "Idempotency key reused across scopes");
        return Err(EngineError::conflict(
            "idempotency_conflict",
            format!("Idempotency key already used for {}", record.scope),
        ));
    }

    record.response().map_err(|e| {
        warn!(key = %record.key, error = %e, "Stored response is unreadable");
        EngineError::conflict("idempotency_conflict", "Idempotency conflict")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use swiftslot_store::{IdempotencyRepository, MemoryStore};

    fn guard() -> (Arc<MemoryStore>, IdempotencyGuard<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), IdempotencyGuard::new(store))
    }

    fn created(body: &str) -> StoredResponse {
        StoredResponse { status: 201, body: body.to_string() }
    }

    #[tokio::test]
    async fn test_handler_runs_once_and_replays_bytes() {
        let (store, guard) = guard();
        let calls = AtomicUsize::new(0);

        let first = guard
            .execute(Some("abc"), CREATE_BOOKING_SCOPE, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                created(r#"{"id":"b1","status":"pending"}"#)
            })
            .await
            .unwrap();

        let second = guard
            .execute(Some("abc"), CREATE_BOOKING_SCOPE, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                created(r#"{"id":"b2","status":"pending"}"#)
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(second.body, r#"{"id":"b1","status":"pending"}"#);
        assert_eq!(store.idempotency_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_or_oversized_key_skips_handler() {
        let (store, guard) = guard();
        let calls = AtomicUsize::new(0);
        let long = "k".repeat(256);

        for key in [None, Some(""), Some("   "), Some(long.as_str())] {
            let err = guard
                .execute(key, CREATE_BOOKING_SCOPE, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    created("{}")
                })
                .await
                .unwrap_err();
            assert_eq!(err.code(), "missing_idempotency_key");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.idempotency_count(), 0);
    }

    #[tokio::test]
    async fn test_client_errors_are_recorded() {
        let (_, guard) = guard();
        let conflict = StoredResponse { status: 409, body: r#"{"error":"Slot already booked"}"#.into() };

        let expected = conflict.clone();
        guard.execute(Some("k"), CREATE_BOOKING_SCOPE, || async move { conflict }).await.unwrap();
        let replayed = guard
            .execute(Some("k"), CREATE_BOOKING_SCOPE, || async { created("{}") })
            .await
            .unwrap();

        assert_eq!(replayed, expected);
    }

    #[tokio::test]
    async fn test_server_errors_are_not_recorded() {
        let (store, guard) = guard();

        let failed = guard
            .execute(Some("k"), CREATE_BOOKING_SCOPE, || async {
                StoredResponse { status: 500, body: "{}".into() }
            })
            .await
            .unwrap();
        assert_eq!(failed.status, 500);
        assert_eq!(store.idempotency_count(), 0);

        let retried = guard
            .execute(Some("k"), CREATE_BOOKING_SCOPE, || async { created(r#"{"ok":true}"#) })
            .await
            .unwrap();
        assert_eq!(retried.status, 201);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_conflict() {
        let (store, guard) = guard();
        let mut record = IdempotencyRecord::new("k", CREATE_BOOKING_SCOPE, &created("{}")).unwrap();
        record.response_payload = "not json".to_string();
        store.insert(&record).await.unwrap();

        let err = guard
            .execute(Some("k"), CREATE_BOOKING_SCOPE, || async { created("{}") })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { code: "idempotency_conflict", .. }));
    }

    #[tokio::test]
    async fn test_scope_mismatch_is_conflict() {
        let (_, guard) = guard();
        guard.execute(Some("k"), "initialize-payment", || async { created("{}") }).await.unwrap();

        let err = guard
            .execute(Some("k"), CREATE_BOOKING_SCOPE, || async { created("{}") })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "idempotency_conflict");
    }

    #[tokio::test]
    async fn test_race_loser_returns_surviving_response() {
        let (store, guard) = guard();

        // Another request records first while this handler is running
        let winner = created(r#"{"winner":true}"#);
        let response = guard
            .execute(Some("race"), CREATE_BOOKING_SCOPE, || {
                let record = IdempotencyRecord::new("race", CREATE_BOOKING_SCOPE, &winner).unwrap();
                let store = store.clone();
                async move {
                    store.insert(&record).await.unwrap();
                    created(r#"{"winner":false}"#)
                }
            })
            .await
            .unwrap();

        assert_eq!(response, winner);
        assert_eq!(store.idempotency_count(), 1);
    }
}
