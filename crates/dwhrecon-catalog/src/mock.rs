//! Mock metadata provider for testing
//!
//! This catalog returns predefined relations without connecting to any
//! source system. It's useful for:
//! - Unit testing loading runs
//! - Feeding relation definitions read from JSON files
//! - Simulating metadata failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dwhrecon_catalog::{CatalogAdapter, MockCatalog};
//!
//! let catalog = MockCatalog::new();
//! catalog.add_relation(orders_relation).await;
//!
//! let fetched = catalog.fetch_relation(&"crm.public.orders".parse()?).await?;
//! ```
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! // Simulate connection failure
//! let catalog = MockCatalog::new().with_connection_failure();
//! assert!(catalog.test_connection().await.is_err());
//!
//! // Simulate network latency
//! let catalog = MockCatalog::new().with_latency(100); // 100ms delay
//! ```

use crate::adapter::{CatalogAdapter, FetchError};
use dwhrecon_core::{Relation, RelationIdentifier};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mock metadata provider
///
/// Relations are stored in memory by fully qualified name. Clones share
/// the same storage.
pub struct MockCatalog {
    /// Predefined relations by FQN
    relations: Arc<RwLock<HashMap<String, Relation>>>,

    /// Errors to return for specific relations
    errors: Arc<RwLock<HashMap<String, FetchError>>>,

    /// Simulate connection failure
    fail_connection: bool,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,

    /// Name to return from name() method
    catalog_name: &'static str,
}

impl MockCatalog {
    /// Create a new mock catalog with no predefined relations
    pub fn new() -> Self {
        Self::from_relations(Vec::new())
    }

    /// Create a mock catalog from pre-built relations
    pub fn from_relations(relations: Vec<Relation>) -> Self {
        let relations = relations
            .into_iter()
            .map(|r| (r.identifier().fqn(), r))
            .collect();

        Self {
            relations: Arc::new(RwLock::new(relations)),
            errors: Arc::new(RwLock::new(HashMap::new())),
            fail_connection: false,
            latency_ms: 0,
            catalog_name: "Mock",
        }
    }

    /// Add (or replace) a relation
    pub async fn add_relation(&self, relation: Relation) {
        self.relations
            .write()
            .await
            .insert(relation.identifier().fqn(), relation);
    }

    /// Configure an error to be returned for a specific relation
    pub async fn add_error_for_relation(&self, relation: &RelationIdentifier, error: FetchError) {
        self.errors.write().await.insert(relation.fqn(), error);
    }

    /// Configure to fail all connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure simulated latency for all operations
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set a custom catalog name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.catalog_name = name;
        self
    }

    /// Get the number of relations stored
    pub async fn relation_count(&self) -> usize {
        self.relations.read().await.len()
    }

    /// Check if a relation is defined
    pub async fn has_relation(&self, relation: &RelationIdentifier) -> bool {
        self.relations.read().await.contains_key(&relation.fqn())
    }

    /// Clear all stored errors
    pub async fn clear_errors(&self) {
        self.errors.write().await.clear();
    }

    /// Simulate latency if configured
    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockCatalog {
    fn clone(&self) -> Self {
        Self {
            relations: Arc::clone(&self.relations),
            errors: Arc::clone(&self.errors),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
            catalog_name: self.catalog_name,
        }
    }
}

#[async_trait::async_trait]
impl CatalogAdapter for MockCatalog {
    fn name(&self) -> &'static str {
        self.catalog_name
    }

    async fn fetch_relation(&self, relation: &RelationIdentifier) -> Result<Relation, FetchError> {
        self.simulate_latency().await;

        // Check for configured errors first
        if let Some(error) = self.errors.read().await.get(&relation.fqn()) {
            return Err(error.clone());
        }

        self.relations
            .read()
            .await
            .get(&relation.fqn())
            .cloned()
            .ok_or_else(|| FetchError::RelationNotFound(relation.fqn()))
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        self.simulate_latency().await;

        if self.fail_connection {
            Err(FetchError::NetworkError(
                "Simulated connection failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Builder for creating a MockCatalog with multiple relations
///
/// ```rust,ignore
/// let catalog = MockCatalogBuilder::new()
///     .with_relation(orders)
///     .with_error("crm.public.secret".parse()?, FetchError::PermissionDenied("no".into()))
///     .with_latency(50)
///     .build();
/// ```
pub struct MockCatalogBuilder {
    relations: Vec<Relation>,
    errors: HashMap<String, FetchError>,
    fail_connection: bool,
    latency_ms: u64,
    catalog_name: &'static str,
}

impl MockCatalogBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            relations: Vec::new(),
            errors: HashMap::new(),
            fail_connection: false,
            latency_ms: 0,
            catalog_name: "Mock",
        }
    }

    /// Add a relation
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Add an error for a specific relation
    pub fn with_error(mut self, relation: RelationIdentifier, error: FetchError) -> Self {
        self.errors.insert(relation.fqn(), error);
        self
    }

    /// Configure connection failure
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set catalog name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.catalog_name = name;
        self
    }

    /// Build the MockCatalog
    pub fn build(self) -> MockCatalog {
        let mut catalog = MockCatalog::from_relations(self.relations);
        catalog.errors = Arc::new(RwLock::new(self.errors));
        catalog.fail_connection = self.fail_connection;
        catalog.latency_ms = self.latency_ms;
        catalog.catalog_name = self.catalog_name;
        catalog
    }
}

impl Default for MockCatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}
