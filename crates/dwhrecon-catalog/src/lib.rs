//! External interfaces of the reconciliation engine
//!
//! Two seams feed a loading run:
//! - [`CatalogAdapter`] supplies relation definitions (columns and
//!   constraints) used to derive identity keys and signature columns.
//! - [`RowSource`] supplies ordered, filtered rows of a relation.
//!
//! ## Features
//!
//! - `postgres` - read relation definitions from PostgreSQL's
//!   `information_schema`
//!
//! ## Example
//!
//! ```rust,ignore
//! use dwhrecon_catalog::{CatalogAdapter, CachedCatalog, PostgresCatalog};
//!
//! let catalog = CachedCatalog::new(
//!     PostgresCatalog::from_connection_string("host=localhost dbname=crm user=etl").await?,
//!     Duration::from_secs(300),
//! );
//! let relation = catalog.fetch_relation(&"crm.public.orders".parse()?).await?;
//! ```

pub mod adapter;
pub mod cache;
pub mod jsonl;
pub mod memory;
pub mod mock;
pub mod postgres;
pub mod source;

pub use adapter::{CatalogAdapter, FetchError};
pub use cache::CachedCatalog;
pub use jsonl::JsonLinesSource;
pub use memory::InMemoryRowSource;
pub use mock::{MockCatalog, MockCatalogBuilder};
pub use postgres::PostgresCatalog;
pub use source::{RangePredicate, RowCursor, RowSource, ScanRequest};
