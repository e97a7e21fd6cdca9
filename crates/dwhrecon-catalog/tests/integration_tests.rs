//! Integration tests for metadata providers and row sources
//!
//! Tests requiring a real PostgreSQL server are marked with `#[ignore]` and
//! can be run with `cargo test -- --ignored`.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all non-ignored tests (no credentials required)
//! cargo test -p dwhrecon-catalog --test integration_tests
//!
//! # Run PostgreSQL integration tests
//! PGHOST=localhost \
//! PGPORT=5432 \
//! PGDATABASE=mydb \
//! PGUSER=user \
//! PGPASSWORD=pass \
//! DWHRECON_PG_RELATION=public.orders \
//! cargo test -p dwhrecon-catalog --features postgres --test integration_tests -- --ignored
//! ```

mod fixtures;

use dwhrecon_catalog::{
    CachedCatalog, CatalogAdapter, FetchError, InMemoryRowSource, JsonLinesSource,
    MockCatalog, MockCatalogBuilder, RangePredicate, RowSource, ScanRequest,
};
use dwhrecon_core::{
    ConstraintKind, LogicalType, Relation, RelationIdentifier, RelationType, Row, Value,
};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;

// =============================================================================
// Helper Functions
// =============================================================================

/// Check if PostgreSQL credentials are available
#[cfg(feature = "postgres")]
fn has_postgres_credentials() -> bool {
    std::env::var("PGHOST").is_ok()
}

fn collect(source: &dyn RowSource, relation: &Relation, request: &ScanRequest) -> Vec<Row> {
    source
        .scan(relation, request)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn ids(rows: &[Row]) -> Vec<Value> {
    rows.iter().map(|r| r.value_or_null("id").clone()).collect()
}

// =============================================================================
// Mock Catalog Tests (No credentials required)
// =============================================================================

#[tokio::test]
async fn test_mock_catalog_with_fixtures() {
    let catalog = MockCatalogBuilder::new()
        .with_relation(fixtures::orders_relation())
        .with_relation(fixtures::users_relation())
        .with_relation(fixtures::order_lines_relation())
        .with_relation(fixtures::keyless_view())
        .build();

    let users = catalog
        .fetch_relation(&"crm.public.users".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(users.column_names(), vec!["id", "email", "name", "created_at", "is_active"]);
    assert_eq!(users.constraints()[1].kind, ConstraintKind::Unique);

    let lines = catalog
        .fetch_relation(&RelationIdentifier::new("crm", "public", "order_lines"))
        .await
        .unwrap();
    let identity: Vec<&str> = lines
        .identity_columns()
        .unwrap()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(identity, vec!["order_id", "line_no"]);

    let view = catalog
        .fetch_relation(&RelationIdentifier::new("crm", "reporting", "daily_totals"))
        .await
        .unwrap();
    assert_eq!(view.relation_type(), RelationType::View);
    assert_eq!(
        view.identity_columns().unwrap_err().code(),
        "MISSING_IDENTITY_COLUMN"
    );
}

#[tokio::test]
async fn test_mock_catalog_not_found_message() {
    let catalog = MockCatalog::new();
    let result = catalog
        .fetch_relation(&RelationIdentifier::new("crm", "public", "nonexistent"))
        .await;

    match result {
        Err(FetchError::RelationNotFound(msg)) => assert!(msg.contains("crm.public.nonexistent")),
        other => panic!("expected RelationNotFound, got {:?}", other.map(|r| r.name().to_string())),
    }
}

#[tokio::test]
async fn test_mock_catalog_latency_simulation() {
    let catalog = MockCatalog::from_relations(vec![fixtures::orders_relation()]).with_latency(100);

    let start = std::time::Instant::now();
    let _ = catalog
        .fetch_relation(&RelationIdentifier::new("crm", "public", "orders"))
        .await;

    assert!(start.elapsed().as_millis() >= 100);
}

#[tokio::test]
async fn test_relation_json_roundtrip_through_catalog() {
    let json = serde_json::to_string(&fixtures::order_lines_relation()).unwrap();
    let parsed: Relation = serde_json::from_str(&json).unwrap();

    let catalog = MockCatalog::from_relations(vec![parsed]);
    let fetched = catalog
        .fetch_relation(&RelationIdentifier::new("crm", "public", "order_lines"))
        .await
        .unwrap();
    assert_eq!(fetched, fixtures::order_lines_relation());
}

#[tokio::test]
async fn test_relation_json_with_unknown_constraint_column_is_rejected() {
    let json = r#"{
        "identifier": "crm.public.orders",
        "columns": [{"name": "id", "position": 1, "logical_type": {"type": "int"}}],
        "constraints": [{"name": "pk", "kind": "PRIMARY_KEY", "columns": ["order_id"]}]
    }"#;

    let err = serde_json::from_str::<Relation>(json).unwrap_err();
    assert!(err.to_string().contains("has no column 'order_id'"));
}

// =============================================================================
// Cached Catalog Tests
// =============================================================================

#[tokio::test]
async fn test_cached_catalog_hides_inner_failures_until_expiry() {
    let mock = MockCatalog::from_relations(vec![fixtures::orders_relation()]);
    let catalog = CachedCatalog::new(mock.clone(), Duration::from_millis(100));
    let id = RelationIdentifier::new("crm", "public", "orders");

    assert!(catalog.fetch_relation(&id).await.is_ok());

    mock.add_error_for_relation(&id, FetchError::NetworkError("down".to_string()))
        .await;
    assert!(catalog.fetch_relation(&id).await.is_ok());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(matches!(
        catalog.fetch_relation(&id).await,
        Err(FetchError::NetworkError(_))
    ));
}

// =============================================================================
// Row Source Tests
// =============================================================================

#[test]
fn test_in_memory_scan_is_reissued() {
    let relation = fixtures::orders_relation();
    let source = InMemoryRowSource::new("memory").with_rows(
        relation.identifier(),
        vec![fixtures::order(2, 20, 5), fixtures::order(1, 10, 5)],
    );
    let request = ScanRequest::new().ordered_by(["id"]);

    let first = collect(&source, &relation, &request);
    source.append_rows(relation.identifier(), vec![fixtures::order(3, 30, 6)]);
    let second = collect(&source, &relation, &request);

    assert_eq!(ids(&first), vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(ids(&second), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(source.scan_count(), 2);
}

#[test]
fn test_in_memory_range_filters_combine() {
    let relation = fixtures::orders_relation();
    let rows = (1..=10).map(|i| fixtures::order(i, i * 10, i % 4)).collect();
    let source = InMemoryRowSource::new("memory").with_rows(relation.identifier(), rows);

    let request = ScanRequest::new()
        .ordered_by(["id"])
        .with_filter(RangePredicate::between("id", Value::Int(3), Value::Int(8)))
        .with_filter(RangePredicate::at_least("updated_at", Value::Int(2)));

    let result = collect(&source, &relation, &request);
    assert_eq!(
        ids(&result),
        vec![Value::Int(3), Value::Int(6), Value::Int(7)]
    );
}

#[test]
fn test_jsonl_source_composite_keys() {
    let relation = fixtures::order_lines_relation();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{"order_id": 2, "line_no": 1, "price": "5.00", "shipped_on": "2024-02-01"}}"#
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"order_id": 1, "line_no": 2, "price": "7.25", "shipped_on": null}}"#
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"order_id": 1, "line_no": 1, "price": 3, "shipped_on": "2024-01-15"}}"#
    )
    .unwrap();

    let source = JsonLinesSource::new("files");
    assert_eq!(source.load_file(&relation, file.path()).unwrap(), 3);

    let rows = collect(
        &source,
        &relation,
        &ScanRequest::new().ordered_by(["order_id", "line_no"]),
    );
    let keys: Vec<(Value, Value)> = rows
        .iter()
        .map(|r| (r.value_or_null("order_id").clone(), r.value_or_null("line_no").clone()))
        .collect();
    assert_eq!(
        keys,
        vec![
            (Value::Int(1), Value::Int(1)),
            (Value::Int(1), Value::Int(2)),
            (Value::Int(2), Value::Int(1)),
        ]
    );
    assert_eq!(rows[0].get("price"), Some(&Value::Decimal("3".to_string())));
    assert!(matches!(rows[0].get("shipped_on"), Some(Value::Date(_))));
}

#[test]
fn test_jsonl_source_rejects_mistyped_values() {
    let relation = fixtures::users_relation();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{"id": 1, "email": "a@example.com", "created_at": "2024-01-01T00:00:00"}}"#
    )
    .unwrap();
    writeln!(file, r#"{{"id": 2, "email": "b@example.com", "created_at": "not a time"}}"#).unwrap();

    let err = JsonLinesSource::new("files")
        .load_file(&relation, file.path())
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_RESPONSE");
    assert!(err.to_string().contains("line 2"));
}

#[test]
fn test_logical_types_of_fixtures() {
    let relation = fixtures::users_relation();
    assert_eq!(relation.find_column("created_at").unwrap().logical_type, LogicalType::Timestamp);
    assert!(!relation.find_column("email").unwrap().nullable);
}

// =============================================================================
// PostgreSQL Integration Tests (Requires credentials)
// =============================================================================

#[cfg(feature = "postgres")]
#[tokio::test]
#[ignore]
async fn test_postgres_fetch_relation() {
    use dwhrecon_catalog::PostgresCatalog;

    if !has_postgres_credentials() {
        eprintln!("Skipping: PGHOST not set");
        return;
    }

    let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
    let catalog = PostgresCatalog::connect(
        env("PGHOST", "localhost"),
        env("PGPORT", "5432").parse().unwrap_or(5432),
        env("PGDATABASE", "postgres"),
        env("PGUSER", "postgres"),
        env("PGPASSWORD", ""),
    )
    .await
    .expect("Failed to connect to PostgreSQL");

    catalog.test_connection().await.expect("Connection test failed");

    let relation: RelationIdentifier =
        format!("pg.{}", env("DWHRECON_PG_RELATION", "public.orders"))
            .parse()
            .unwrap();
    let fetched = catalog.fetch_relation(&relation).await.expect("Failed to fetch relation");
    assert!(!fetched.columns().is_empty());
}
