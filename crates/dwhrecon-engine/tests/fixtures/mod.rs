//! Test fixtures for reconciliation runs
//!
//! An orders table in a CRM source system, mirrored into `dwh.raw.orders`.

#![allow(dead_code)]

use dwhrecon_catalog::{InMemoryRowSource, MockCatalog};
use dwhrecon_core::{
    ChunkingStrategy, Column, Constraint, DwhRelation, Loading, LogicalType, Relation,
    RelationIdentifier, Row,
};

pub const WAREHOUSE_FQN: &str = "dwh.raw.orders";

pub fn source_id() -> RelationIdentifier {
    RelationIdentifier::new("crm", "public", "orders")
}

pub fn mirror_id() -> RelationIdentifier {
    RelationIdentifier::new("dwh", "raw", "orders")
}

/// `crm.public.orders(id PK, amount, updated_at, _etl_batch)`
pub fn orders_relation() -> Relation {
    Relation::new(
        source_id(),
        vec![
            Column::new("id", 1, LogicalType::Int).with_nullable(false),
            Column::new("amount", 2, LogicalType::Int),
            Column::new("updated_at", 3, LogicalType::Int),
            Column::new("_etl_batch", 4, LogicalType::Int),
        ],
        vec![Constraint::primary_key("orders_pk", &["id"])],
    )
    .unwrap()
}

/// Same columns, no key
pub fn keyless_relation() -> Relation {
    Relation::new(
        source_id(),
        vec![
            Column::new("id", 1, LogicalType::Int),
            Column::new("amount", 2, LogicalType::Int),
            Column::new("updated_at", 3, LogicalType::Int),
        ],
        Vec::new(),
    )
    .unwrap()
}

pub fn order(id: i64, amount: i64, updated_at: i64) -> Row {
    Row::new()
        .with("id", id)
        .with("amount", amount)
        .with("updated_at", updated_at)
}

/// Snapshot loading ignoring `updated_at` in signatures
pub fn snapshot_loading() -> Loading {
    Loading::snapshot("orders", source_id(), DwhRelation::new(WAREHOUSE_FQN))
        .with_excluded_columns(["updated_at"])
}

/// Incremental loading on `updated_at`
pub fn incremental_loading(is_overlapping: bool) -> Loading {
    Loading::incremental(
        "orders",
        source_id(),
        DwhRelation::new(WAREHOUSE_FQN),
        Some("updated_at"),
        is_overlapping,
    )
    .unwrap()
}

/// Snapshot loading chunked by `id`
pub fn chunked_loading(chunk_size: usize) -> Loading {
    Loading::snapshot("orders", source_id(), DwhRelation::new(WAREHOUSE_FQN))
        .with_chunking(ChunkingStrategy::new("orders", "id", chunk_size).unwrap())
}

/// Snapshot loading chunked by `updated_at`, which is left out of signatures
pub fn chunked_by_update_loading(chunk_size: usize) -> Loading {
    snapshot_loading()
        .with_chunking(ChunkingStrategy::new("orders", "updated_at", chunk_size).unwrap())
}

/// Order without an `updated_at` value
pub fn undated_order(id: i64, amount: i64) -> Row {
    Row::new().with("id", id).with("amount", amount)
}

pub fn catalog_with(relation: Relation) -> MockCatalog {
    MockCatalog::from_relations(vec![relation])
}

pub fn source_with(rows: Vec<Row>) -> InMemoryRowSource {
    InMemoryRowSource::new("crm").with_rows(&source_id(), rows)
}

pub fn mirror_with(rows: Vec<Row>) -> InMemoryRowSource {
    InMemoryRowSource::new("dwh").with_rows(&mirror_id(), rows)
}
