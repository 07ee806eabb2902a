//! Conflict-safe create-or-update

use crate::{ApplyError, ApplyResult, Backoff, BackoffConfig, StoreError, VersionedStore};
use quorum_types::Versioned;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What the applier did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyKind {
    Created,
    Updated,
    /// Merged result equalled the stored object; nothing was written
    Unchanged,
}

/// Result of a successful apply
#[derive(Debug, Clone)]
pub struct ApplyOutcome<T> {
    pub kind: ApplyKind,
    pub object: Versioned<T>,
    /// Stale-token conflicts absorbed before success
    pub conflicts: u32,
}

impl<T> ApplyOutcome<T> {
    pub fn is_write(&self) -> bool {
        self.kind != ApplyKind::Unchanged
    }
}

/// Wraps every managed write in bounded conflict retry.
///
/// Each attempt re-reads the object, re-runs the merge against the fresh
/// value and writes with the fresh token. Retries stop at
/// `max_attempts` or once the next delay would pass `max_elapsed_ms`.
#[derive(Debug, Clone, Default)]
pub struct ConflictSafeApplier {
    config: BackoffConfig,
}

impl ConflictSafeApplier {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Create or update the object at `key` with `merge(current)`.
    pub async fn apply<T, S, F>(&self, store: &S, key: &str, merge: F) -> ApplyResult<ApplyOutcome<T>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        S: VersionedStore<T> + ?Sized,
        F: Fn(Option<&T>) -> T + Send + Sync,
    {
        let started = Instant::now();
        let mut backoff = Backoff::new(&self.config);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let current = store.get(key).await?;
            let desired = merge(current.as_ref().map(|c| &c.value));

            let written = match current {
                Some(current) if current.value == desired => {
                    return Ok(ApplyOutcome {
                        kind: ApplyKind::Unchanged,
                        object: current,
                        conflicts: attempts - 1,
                    });
                }
                Some(current) => store
                    .update(key, desired.clone(), current.version)
                    .await
                    .map(|token| (ApplyKind::Updated, Versioned::new(desired, token))),
                None => store
                    .create(key, desired.clone())
                    .await
                    .map(|token| (ApplyKind::Created, Versioned::new(desired, token))),
            };

            let error = match written {
                Ok((kind, object)) => {
                    if attempts > 1 {
                        debug!(key, attempts, "Apply succeeded after conflicts");
                    }
                    return Ok(ApplyOutcome {
                        kind,
                        object,
                        conflicts: attempts - 1,
                    });
                }
                // Deleted between read and write: re-read like a conflict.
                Err(e) if e.is_conflict() || matches!(e, StoreError::NotFound(_)) => e,
                Err(e) => return Err(e.into()),
            };

            let delay = backoff.next_delay();
            let elapsed = started.elapsed();
            if attempts >= max_attempts || elapsed + delay > self.config.max_elapsed() {
                warn!(key, attempts, error = %error, "Apply retries exhausted");
                return Err(ApplyError::Exhausted {
                    key: key.to_string(),
                    attempts,
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }

            debug!(
                key,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Version conflict, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryVersionedStore, StoreResult};
    use async_trait::async_trait;
    use quorum_types::VersionToken;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Store that lets another writer slip in before the first `races` updates
    struct RacingStore {
        inner: InMemoryVersionedStore<Vec<String>>,
        races: AtomicU32,
    }

    impl RacingStore {
        fn new(races: u32) -> Self {
            Self {
                inner: InMemoryVersionedStore::new(),
                races: AtomicU32::new(races),
            }
        }
    }

    #[async_trait]
    impl VersionedStore<Vec<String>> for RacingStore {
        async fn get(&self, key: &str) -> StoreResult<Option<Versioned<Vec<String>>>> {
            self.inner.get(key).await
        }

        async fn create(&self, key: &str, value: Vec<String>) -> StoreResult<VersionToken> {
            self.inner.create(key, value).await
        }

        async fn update(
            &self,
            key: &str,
            value: Vec<String>,
            expected: VersionToken,
        ) -> StoreResult<VersionToken> {
            let remaining = self.races.load(Ordering::SeqCst);
            if remaining > 0 {
                self.races.store(remaining - 1, Ordering::SeqCst);
                let mut other = self.inner.get(key).await?.unwrap().value;
                other.push(format!("other-{remaining}"));
                self.inner.update(key, other, expected).await?;
            }
            self.inner.update(key, value, expected).await
        }

        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.inner.delete(key).await
        }

        async fn list(&self, prefix: &str) -> StoreResult<Vec<(String, Versioned<Vec<String>>)>> {
            self.inner.list(prefix).await
        }
    }

    fn append_mine(current: Option<&Vec<String>>) -> Vec<String> {
        let mut next = current.cloned().unwrap_or_default();
        if !next.iter().any(|v| v == "mine") {
            next.push("mine".to_string());
        }
        next
    }

    #[tokio::test]
    async fn test_creates_missing_object() {
        let store = InMemoryVersionedStore::new();
        let applier = ConflictSafeApplier::default();

        let outcome = applier.apply(&store, "k", append_mine).await.unwrap();
        assert_eq!(outcome.kind, ApplyKind::Created);
        assert_eq!(outcome.object.value, vec!["mine".to_string()]);
    }

    #[tokio::test]
    async fn test_unchanged_skips_write() {
        let store = InMemoryVersionedStore::new();
        store.create("k", vec!["mine".to_string()]).await.unwrap();
        let applier = ConflictSafeApplier::default();

        let outcome = applier.apply(&store, "k", append_mine).await.unwrap();
        assert_eq!(outcome.kind, ApplyKind::Unchanged);
        assert!(!outcome.is_write());
        assert_eq!(outcome.object.version, VersionToken::INITIAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_retried_without_losing_other_write() {
        let store = RacingStore::new(2);
        store.inner.create("k", vec!["base".to_string()]).await.unwrap();
        let applier = ConflictSafeApplier::default();

        let outcome = applier.apply(&store, "k", append_mine).await.unwrap();
        assert_eq!(outcome.kind, ApplyKind::Updated);
        assert_eq!(outcome.conflicts, 2);

        let stored = store.get("k").await.unwrap().unwrap().value;
        assert!(stored.contains(&"other-2".to_string()));
        assert!(stored.contains(&"other-1".to_string()));
        assert!(stored.contains(&"mine".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_transient() {
        let store = RacingStore::new(100);
        store.inner.create("k", vec![]).await.unwrap();
        let applier = ConflictSafeApplier::new(BackoffConfig {
            max_attempts: 3,
            ..Default::default()
        });

        let err = applier.apply(&store, "k", append_mine).await.unwrap_err();
        match &err {
            ApplyError::Exhausted { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_bound_stops_retries() {
        let store = RacingStore::new(100);
        store.inner.create("k", vec![]).await.unwrap();
        let applier = ConflictSafeApplier::new(BackoffConfig {
            initial_delay_ms: 100,
            multiplier: 2.0,
            jitter: 0.0,
            max_delay_ms: 10_000,
            max_attempts: 50,
            max_elapsed_ms: 350,
        });

        let err = applier.apply(&store, "k", append_mine).await.unwrap_err();
        match err {
            // 100 + 200 fit, the next 400ms delay would pass 350ms
            ApplyError::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
