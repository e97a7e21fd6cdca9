//! PostgreSQL metadata provider using information_schema
//!
//! Reads column definitions from `information_schema.columns` and key
//! constraints from `information_schema.table_constraints` joined with
//! `key_column_usage`. A catalog is bound to one database; the system part
//! of a relation identifier is not sent to the server.
//!
//! ## Usage
//!
//! ```rust,ignore
//! // Using direct credentials
//! let catalog = PostgresCatalog::connect("localhost", 5432, "crm", "etl", "secret").await?;
//!
//! // Using a connection string with TLS
//! let catalog = PostgresCatalog::from_connection_string_with_tls(
//!     "host=db.example.com port=5432 dbname=crm user=etl password=secret"
//! ).await?;
//! ```

use crate::adapter::{CatalogAdapter, FetchError};
use dwhrecon_core::{CatalogConfig, LogicalType, Relation, RelationIdentifier};

#[cfg(feature = "postgres")]
use dwhrecon_core::{Column, Constraint};

#[cfg(feature = "postgres")]
use tokio_postgres::{Client, Config as PgConfig, NoTls};

#[cfg(feature = "postgres")]
use postgres_native_tls::MakeTlsConnector;

#[cfg(feature = "postgres")]
use native_tls::TlsConnector;

#[cfg(not(feature = "postgres"))]
const NOT_COMPILED: &str =
    "PostgreSQL support not compiled. Rebuild with: cargo build --features postgres";

/// PostgreSQL metadata provider
pub struct PostgresCatalog {
    /// PostgreSQL client (only available with postgres feature)
    #[cfg(feature = "postgres")]
    client: Client,

    host: String,
    port: u16,
    database: String,
}

impl PostgresCatalog {
    /// Connect with direct credentials (no TLS)
    #[cfg(feature = "postgres")]
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let config = format!(
            "host={} port={} dbname={} user={} password={}",
            host.into(),
            port,
            database.into(),
            user.into(),
            password.into()
        );
        Self::from_connection_string(&config).await
    }

    /// Create catalog without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn connect(
        _host: impl Into<String>,
        _port: u16,
        _database: impl Into<String>,
        _user: impl Into<String>,
        _password: impl Into<String>,
    ) -> Result<Self, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Connect from a connection string
    /// (`host=localhost port=5432 dbname=crm user=etl password=secret`)
    #[cfg(feature = "postgres")]
    pub async fn from_connection_string(conn_str: &str) -> Result<Self, FetchError> {
        let (host, port, database) = Self::describe(conn_str)?;

        let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to connect to PostgreSQL at {}:{}: {}",
                host, port, e
            )))?;

        let (log_host, log_port) = (host.clone(), port);
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(
                    host = %log_host,
                    port = log_port,
                    error = %e,
                    "PostgreSQL connection error"
                );
            }
        });

        Ok(Self { client, host, port, database })
    }

    /// Create catalog without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn from_connection_string(_conn_str: &str) -> Result<Self, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Connect from a connection string over TLS
    ///
    /// The `sslmode` setting is ignored; TLS is always used.
    #[cfg(feature = "postgres")]
    pub async fn from_connection_string_with_tls(conn_str: &str) -> Result<Self, FetchError> {
        let (host, port, database) = Self::describe(conn_str)?;

        let connector = TlsConnector::builder()
            .build()
            .map_err(|e| FetchError::ConfigError(format!(
                "Failed to create TLS connector: {}", e
            )))?;
        let tls = MakeTlsConnector::new(connector);

        let (client, connection) = tokio_postgres::connect(conn_str, tls)
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to connect to PostgreSQL at {}:{} with TLS: {}",
                host, port, e
            )))?;

        let (log_host, log_port) = (host.clone(), port);
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(
                    host = %log_host,
                    port = log_port,
                    error = %e,
                    "PostgreSQL TLS connection error"
                );
            }
        });

        Ok(Self { client, host, port, database })
    }

    /// Create catalog without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn from_connection_string_with_tls(_conn_str: &str) -> Result<Self, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Connect using `[catalog]` settings from dwhrecon.toml
    ///
    /// Uses `connection_string` when present, otherwise `host`, `port`,
    /// `database`, `user` and `password`. `sslmode = "require"` selects TLS.
    pub async fn from_config(config: &CatalogConfig) -> Result<Self, FetchError> {
        let conn_str = Self::connection_string(config)?;
        if config.setting("sslmode").as_deref() == Some("require") {
            Self::from_connection_string_with_tls(&conn_str).await
        } else {
            Self::from_connection_string(&conn_str).await
        }
    }

    /// Build a connection string from catalog settings
    pub fn connection_string(config: &CatalogConfig) -> Result<String, FetchError> {
        if let Some(conn_str) = config.setting("connection_string") {
            return Ok(conn_str);
        }

        let required = |key: &str| {
            config.setting(key).ok_or_else(|| {
                FetchError::ConfigError(format!("Missing catalog setting '{}'", key))
            })
        };

        Ok(format!(
            "host={} port={} dbname={} user={} password={}",
            required("host")?,
            config.setting("port").unwrap_or_else(|| "5432".to_string()),
            required("database")?,
            required("user")?,
            config.setting("password").unwrap_or_default(),
        ))
    }

    /// Extract host, port and database from a connection string for logging
    #[cfg(feature = "postgres")]
    fn describe(conn_str: &str) -> Result<(String, u16, String), FetchError> {
        let config: PgConfig = conn_str
            .parse()
            .map_err(|e| FetchError::ConfigError(format!("Invalid connection string: {}", e)))?;

        let host = config
            .get_hosts()
            .first()
            .map(|h| format!("{:?}", h))
            .unwrap_or_else(|| "localhost".to_string());
        let port = config.get_ports().first().copied().unwrap_or(5432);
        let database = config.get_dbname().unwrap_or("postgres").to_string();

        Ok((host, port, database))
    }

    /// Convert a PostgreSQL type name to a LogicalType
    ///
    /// - **Boolean**: `boolean`, `bool`
    /// - **Integer**: `smallint`, `integer`, `bigint`, `serial`, `bigserial`, `oid`
    /// - **Floating Point**: `real`, `double precision`
    /// - **Numeric**: `numeric(p,s)`, `decimal(p,s)`, `money`
    /// - **String**: `varchar`, `char`, `text`, `uuid`, network and range types
    /// - **Binary**: `bytea`
    /// - **Date/Time**: `date`, `timestamp`, `timestamptz`
    /// - **JSON**: `json`, `jsonb`, and arrays (`type[]`)
    pub fn map_postgres_type(pg_type: &str) -> LogicalType {
        let base_type = pg_type
            .split('(')
            .next()
            .unwrap_or(pg_type)
            .trim()
            .to_lowercase();

        match base_type.as_str() {
            "boolean" | "bool" => LogicalType::Bool,

            "smallint" | "int2" | "integer" | "int" | "int4" | "bigint" | "int8" => {
                LogicalType::Int
            }
            "serial" | "serial4" | "bigserial" | "serial8" | "smallserial" | "serial2" => {
                LogicalType::Int
            }
            "oid" => LogicalType::Int,

            "real" | "float4" | "double precision" | "float8" | "float" => LogicalType::Float,

            "numeric" | "decimal" => Self::parse_numeric_type(pg_type),
            "money" => LogicalType::Decimal {
                precision: Some(19),
                scale: Some(2),
            },

            "character varying" | "varchar" | "character" | "char" | "bpchar" | "text"
            | "name" | "citext" | "uuid" | "xml" | "interval" => LogicalType::String,
            "inet" | "cidr" | "macaddr" | "macaddr8" => LogicalType::String,
            "int4range" | "int8range" | "numrange" | "tsrange" | "tstzrange" | "daterange" => {
                LogicalType::String
            }
            "time without time zone" | "time" | "time with time zone" | "timetz" => {
                LogicalType::String
            }

            "bytea" => LogicalType::Bytes,

            "date" => LogicalType::Date,
            "timestamp without time zone" | "timestamp" | "timestamp with time zone"
            | "timestamptz" => LogicalType::Timestamp,

            "json" | "jsonb" | "array" => LogicalType::Json,

            _ if pg_type.ends_with("[]") || pg_type.starts_with('_') => LogicalType::Json,
            _ => LogicalType::Unknown,
        }
    }

    /// Parse numeric type with precision and scale
    ///
    /// - `numeric` - arbitrary precision
    /// - `numeric(10)` - precision 10, scale 0
    /// - `numeric(10,2)` - precision 10, scale 2
    fn parse_numeric_type(type_str: &str) -> LogicalType {
        if let Some(params) = type_str.split('(').nth(1).and_then(|p| p.strip_suffix(')')) {
            let parts: Vec<&str> = params.split(',').collect();
            match parts.as_slice() {
                [precision, scale] => {
                    return LogicalType::Decimal {
                        precision: precision.trim().parse().ok(),
                        scale: scale.trim().parse().ok(),
                    }
                }
                [precision] => {
                    return LogicalType::Decimal {
                        precision: precision.trim().parse().ok(),
                        scale: Some(0),
                    }
                }
                _ => {}
            }
        }

        LogicalType::Decimal {
            precision: None,
            scale: None,
        }
    }

    /// Map `information_schema` constraint types
    pub fn map_constraint_type(constraint_type: &str) -> Option<dwhrecon_core::ConstraintKind> {
        use dwhrecon_core::ConstraintKind as Kind;

        match constraint_type.to_uppercase().as_str() {
            "PRIMARY KEY" => Some(Kind::PrimaryKey),
            "UNIQUE" => Some(Kind::Unique),
            "FOREIGN KEY" => Some(Kind::ForeignKey),
            _ => None,
        }
    }

    /// Get the connection host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the connection port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the database name
    pub fn database(&self) -> &str {
        &self.database
    }
}

#[cfg(feature = "postgres")]
fn map_query_error(relation: &RelationIdentifier, e: tokio_postgres::Error) -> FetchError {
    let err_str = e.to_string();
    if err_str.contains("does not exist") {
        FetchError::RelationNotFound(relation.fqn())
    } else if err_str.contains("permission denied") {
        FetchError::PermissionDenied(format!("Cannot access {}: {}", relation.fqn(), err_str))
    } else {
        FetchError::QueryError(err_str)
    }
}

#[async_trait::async_trait]
impl CatalogAdapter for PostgresCatalog {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    #[cfg(feature = "postgres")]
    async fn fetch_relation(&self, relation: &RelationIdentifier) -> Result<Relation, FetchError> {
        let table = self
            .client
            .query_opt(
                "SELECT table_type FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2",
                &[&relation.namespace, &relation.relation],
            )
            .await
            .map_err(|e| map_query_error(relation, e))?
            .ok_or_else(|| FetchError::RelationNotFound(relation.fqn()))?;
        let table_type: String = table.get(0);

        let column_query = r#"
            SELECT
                column_name,
                data_type,
                is_nullable,
                ordinal_position,
                numeric_precision,
                numeric_scale,
                udt_name,
                character_maximum_length,
                column_default
            FROM information_schema.columns
            WHERE table_schema = $1
              AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = self
            .client
            .query(column_query, &[&relation.namespace, &relation.relation])
            .await
            .map_err(|e| map_query_error(relation, e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            let is_nullable: String = row.get(2);
            let position: i32 = row.get(3);
            let numeric_precision: Option<i32> = row.get(4);
            let numeric_scale: Option<i32> = row.get(5);
            let udt_name: String = row.get(6);
            let max_length: Option<i32> = row.get(7);
            let default: Option<String> = row.get(8);

            let full_type = match (data_type.as_str(), numeric_precision, numeric_scale) {
                ("numeric", Some(p), Some(s)) => format!("numeric({},{})", p, s),
                ("numeric", Some(p), None) => format!("numeric({})", p),
                _ if udt_name.starts_with('_') => format!("{}[]", &udt_name[1..]),
                _ => data_type.clone(),
            };

            let size = max_length.or(numeric_precision).map(|s| s as u32);
            let logical_type = Self::map_postgres_type(&full_type);
            let mut column = Column::new(name, position.max(0) as u32, logical_type)
                .with_data_type(data_type)
                .with_nullable(is_nullable.eq_ignore_ascii_case("YES"))
                .with_size(size, numeric_scale.map(|s| s as u32));
            if let Some(default) = default {
                column = column.with_default(default);
            }
            columns.push(column);
        }

        let constraint_query = r#"
            SELECT tc.constraint_name, tc.constraint_type, kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
             AND tc.table_name = kcu.table_name
            WHERE tc.table_schema = $1
              AND tc.table_name = $2
            ORDER BY tc.constraint_name, kcu.ordinal_position
        "#;

        let rows = self
            .client
            .query(constraint_query, &[&relation.namespace, &relation.relation])
            .await
            .map_err(|e| map_query_error(relation, e))?;

        let mut constraints: Vec<Constraint> = Vec::new();
        for row in rows {
            let name: String = row.get(0);
            let constraint_type: String = row.get(1);
            let column: String = row.get(2);

            let Some(kind) = Self::map_constraint_type(&constraint_type) else {
                continue;
            };
            match constraints.last_mut() {
                Some(last) if last.name == name => last.columns.push(column),
                _ => constraints.push(Constraint {
                    name,
                    kind,
                    columns: vec![column],
                }),
            }
        }

        tracing::debug!(
            relation = %relation,
            columns = columns.len(),
            constraints = constraints.len(),
            "fetched relation from PostgreSQL"
        );

        let fetched = Relation::new(relation.clone(), columns, constraints)
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        Ok(if table_type == "VIEW" { fetched.as_view() } else { fetched })
    }

    #[cfg(not(feature = "postgres"))]
    async fn fetch_relation(&self, _relation: &RelationIdentifier) -> Result<Relation, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    #[cfg(feature = "postgres")]
    async fn test_connection(&self) -> Result<(), FetchError> {
        self.client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| FetchError::QueryError(format!("Connection test failed: {}", e)))?;
        Ok(())
    }

    #[cfg(not(feature = "postgres"))]
    async fn test_connection(&self) -> Result<(), FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }
}
