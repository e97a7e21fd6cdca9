//! Test fixtures for catalog and row source integration tests
//!
//! Reusable relation definitions modelled on typical operational tables
//! that get mirrored into a warehouse.

#![allow(dead_code)]

use dwhrecon_core::{
    Column, Constraint, ConstraintKind, LogicalType, Relation, RelationIdentifier, Row,
};

/// `crm.public.orders(id PK, amount, updated_at)`
pub fn orders_relation() -> Relation {
    Relation::new(
        RelationIdentifier::new("crm", "public", "orders"),
        vec![
            Column::new("id", 1, LogicalType::Int).with_nullable(false),
            Column::new("amount", 2, LogicalType::Int),
            Column::new("updated_at", 3, LogicalType::Int),
        ],
        vec![Constraint::primary_key("orders_pk", &["id"])],
    )
    .unwrap()
}

/// Users table with a unique email next to the primary key
pub fn users_relation() -> Relation {
    Relation::new(
        RelationIdentifier::new("crm", "public", "users"),
        vec![
            Column::new("id", 1, LogicalType::Int).with_nullable(false),
            Column::new("email", 2, LogicalType::String).with_nullable(false),
            Column::new("name", 3, LogicalType::String),
            Column::new("created_at", 4, LogicalType::Timestamp).with_nullable(false),
            Column::new("is_active", 5, LogicalType::Bool),
        ],
        vec![
            Constraint::primary_key("users_pk", &["id"]),
            Constraint::new("users_email_key", ConstraintKind::Unique, &["email"]),
        ],
    )
    .unwrap()
}

/// Order lines keyed by a composite primary key
pub fn order_lines_relation() -> Relation {
    Relation::new(
        RelationIdentifier::new("crm", "public", "order_lines"),
        vec![
            Column::new("order_id", 1, LogicalType::Int).with_nullable(false),
            Column::new("line_no", 2, LogicalType::Int).with_nullable(false),
            Column::new(
                "price",
                3,
                LogicalType::Decimal {
                    precision: Some(10),
                    scale: Some(2),
                },
            ),
            Column::new("shipped_on", 4, LogicalType::Date),
        ],
        vec![
            Constraint::primary_key("order_lines_pk", &["order_id", "line_no"]),
            Constraint::new("order_lines_order_fk", ConstraintKind::ForeignKey, &["order_id"]),
        ],
    )
    .unwrap()
}

/// A reporting view without any key
pub fn keyless_view() -> Relation {
    Relation::new(
        RelationIdentifier::new("crm", "reporting", "daily_totals"),
        vec![
            Column::new("day", 1, LogicalType::Date),
            Column::new("total", 2, LogicalType::Float),
        ],
        Vec::new(),
    )
    .unwrap()
    .as_view()
}

/// One orders row
pub fn order(id: i64, amount: i64, updated_at: i64) -> Row {
    Row::new()
        .with("id", id)
        .with("amount", amount)
        .with("updated_at", updated_at)
}
