//! Relation metadata caching with TTL
//!
//! Loadings of the same relation run over and over; their column and
//! constraint definitions rarely change. [`CachedCatalog`] keeps fetched
//! relations for a configurable time-to-live in front of any
//! [`CatalogAdapter`].

use crate::adapter::{CatalogAdapter, FetchError};
use dwhrecon_core::{Relation, RelationIdentifier};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Cache entry for one relation
#[derive(Debug, Clone)]
struct CacheEntry {
    relation: Arc<Relation>,
    created_at: Instant,
}

/// Metadata provider wrapper with a TTL cache
///
/// Expired entries are evicted on access. Errors are never cached.
///
/// ```rust,ignore
/// let catalog = CachedCatalog::new(PostgresCatalog::connect(..).await?, Duration::from_secs(300));
/// let relation = catalog.fetch_relation(&id).await?; // hits the database
/// let relation = catalog.fetch_relation(&id).await?; // served from cache
/// ```
pub struct CachedCatalog<A> {
    inner: A,
    cache: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl<A: CatalogAdapter> CachedCatalog<A> {
    /// Wrap `inner` with the given time-to-live
    pub fn new(inner: A, ttl: Duration) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// The wrapped provider
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Cached relation if present and not expired
    pub fn get(&self, relation: &RelationIdentifier) -> Option<Arc<Relation>> {
        let key = relation.fqn();

        if let Ok(cache) = self.cache.read() {
            if let Some(entry) = cache.get(&key) {
                if entry.created_at.elapsed() < self.ttl {
                    return Some(Arc::clone(&entry.relation));
                }
            }
        }

        // Entry doesn't exist or is expired - evict it
        self.evict(relation);
        None
    }

    /// Store a relation
    pub fn insert(&self, relation: Relation) {
        let entry = CacheEntry {
            relation: Arc::new(relation),
            created_at: Instant::now(),
        };
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(entry.relation.identifier().fqn(), entry);
        }
    }

    /// Evict a specific entry
    pub fn evict(&self, relation: &RelationIdentifier) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(&relation.fqn());
        }
    }

    /// Clear all entries
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    /// Number of entries (including expired)
    pub fn len(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns (total_entries, valid_entries, expired_entries)
    pub fn stats(&self) -> (usize, usize, usize) {
        if let Ok(cache) = self.cache.read() {
            let total = cache.len();
            let valid = cache
                .values()
                .filter(|e| e.created_at.elapsed() < self.ttl)
                .count();
            (total, valid, total - valid)
        } else {
            (0, 0, 0)
        }
    }
}

#[async_trait::async_trait]
impl<A: CatalogAdapter> CatalogAdapter for CachedCatalog<A> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn fetch_relation(&self, relation: &RelationIdentifier) -> Result<Relation, FetchError> {
        if let Some(cached) = self.get(relation) {
            tracing::trace!(relation = %relation, "relation metadata cache hit");
            return Ok((*cached).clone());
        }

        tracing::debug!(
            relation = %relation,
            catalog = self.inner.name(),
            "fetching relation metadata"
        );
        let fetched = self.inner.fetch_relation(relation).await?;
        self.insert(fetched.clone());
        Ok(fetched)
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        self.inner.test_connection().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCatalog;
    use dwhrecon_core::{Column, Constraint, LogicalType};

    fn users() -> Relation {
        Relation::new(
            RelationIdentifier::new("crm", "public", "users"),
            vec![Column::new("id", 1, LogicalType::Int)],
            vec![Constraint::primary_key("users_pk", &["id"])],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_cache_serves_second_fetch() {
        let mock = MockCatalog::new();
        mock.add_relation(users()).await;

        let catalog = CachedCatalog::new(mock.clone(), Duration::from_secs(60));
        let id = RelationIdentifier::new("crm", "public", "users");

        catalog.fetch_relation(&id).await.unwrap();
        assert_eq!(catalog.len(), 1);

        // Errors on the inner catalog are invisible while the entry is valid
        mock.add_error_for_relation(&id, FetchError::NetworkError("down".to_string()))
            .await;
        assert!(catalog.fetch_relation(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_cache_expiration() {
        let mock = MockCatalog::new();
        mock.add_relation(users()).await;

        let catalog = CachedCatalog::new(mock.clone(), Duration::from_millis(50));
        let id = RelationIdentifier::new("crm", "public", "users");
        catalog.fetch_relation(&id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(catalog.stats(), (1, 0, 1));
        assert!(catalog.get(&id).is_none());
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let catalog = CachedCatalog::new(MockCatalog::new(), Duration::from_secs(60));
        let id = RelationIdentifier::new("crm", "public", "users");

        assert!(catalog.fetch_relation(&id).await.is_err());
        assert!(catalog.is_empty());

        catalog.inner().add_relation(users()).await;
        assert!(catalog.fetch_relation(&id).await.is_ok());
    }

    #[test]
    fn test_manual_insert_and_evict() {
        let catalog = CachedCatalog::new(MockCatalog::new(), Duration::from_secs(60));
        let id = RelationIdentifier::new("crm", "public", "users");

        catalog.insert(users());
        assert!(catalog.get(&id).is_some());

        catalog.evict(&id);
        assert!(catalog.get(&id).is_none());

        catalog.insert(users());
        catalog.clear();
        assert!(catalog.is_empty());
    }
}
