//! Relation metadata provider trait and fetch errors

use dwhrecon_core::{Relation, RelationIdentifier};

/// Errors that can occur when fetching metadata or rows
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Relation not found: {0}")]
    RelationNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl FetchError {
    /// Stable string identifier for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationError(_) => "AUTHENTICATION_ERROR",
            Self::RelationNotFound(_) => "RELATION_NOT_FOUND",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::QueryError(_) => "QUERY_ERROR",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
            Self::NetworkError(_) => "NETWORK_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

/// Trait for relation metadata providers
///
/// Supplies the column and constraint definitions used to derive identity
/// keys and signature columns.
#[async_trait::async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// Get the adapter name (e.g., "PostgreSQL", "Mock")
    fn name(&self) -> &'static str;

    /// Fetch the definition of one relation
    async fn fetch_relation(&self, relation: &RelationIdentifier) -> Result<Relation, FetchError>;

    /// Test the connection to the source system
    ///
    /// This is useful for validating credentials before attempting
    /// to fetch relations.
    async fn test_connection(&self) -> Result<(), FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(FetchError::RelationNotFound("x".into()).code(), "RELATION_NOT_FOUND");
        assert_eq!(FetchError::IoError("x".into()).code(), "IO_ERROR");
        assert_eq!(
            FetchError::PermissionDenied("no".into()).to_string(),
            "Permission denied: no"
        );
    }
}
