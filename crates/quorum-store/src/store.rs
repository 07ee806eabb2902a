//! Versioned object storage

use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use quorum_types::{VersionToken, Versioned};

/// Declarative object store with optimistic concurrency
#[async_trait]
pub trait VersionedStore<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Read an object together with its current token
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned<T>>>;

    /// Create an object; fails with `AlreadyExists` if the key is taken
    async fn create(&self, key: &str, value: T) -> StoreResult<VersionToken>;

    /// Replace an object if `expected` is still current
    async fn update(&self, key: &str, value: T, expected: VersionToken) -> StoreResult<VersionToken>;

    /// Remove an object
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// List keys starting with `prefix`
    async fn list(&self, prefix: &str) -> StoreResult<Vec<(String, Versioned<T>)>>;
}

/// In-memory implementation for development and tests
pub struct InMemoryVersionedStore<T> {
    objects: DashMap<String, Versioned<T>>,
}

impl<T> InMemoryVersionedStore<T> {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl<T> Default for InMemoryVersionedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> VersionedStore<T> for InMemoryVersionedStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned<T>>> {
        Ok(self.objects.get(key).map(|o| o.clone()))
    }

    async fn create(&self, key: &str, value: T) -> StoreResult<VersionToken> {
        match self.objects.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Versioned::new(value, VersionToken::INITIAL));
                Ok(VersionToken::INITIAL)
            }
        }
    }

    async fn update(&self, key: &str, value: T, expected: VersionToken) -> StoreResult<VersionToken> {
        let mut stored = self
            .objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if stored.version != expected {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual: stored.version,
            });
        }
        let next = stored.version.next();
        *stored = Versioned::new(value, next);
        Ok(next)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<(String, Versioned<T>)>> {
        let mut items: Vec<_> = self
            .objects
            .iter()
            .filter(|o| o.key().starts_with(prefix))
            .map(|o| (o.key().clone(), o.value().clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }
}
