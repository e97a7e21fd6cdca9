//! Configuration schema (dwhrecon.toml)

use crate::error::ModelError;
use crate::loading::{Loading, LoadingDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Relation metadata provider connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog type (postgres, mock, ...)
    #[serde(rename = "type")]
    pub catalog_type: String,

    /// How long fetched relations stay cached, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,

    /// Connection settings (catalog-specific)
    #[serde(flatten)]
    pub settings: HashMap<String, String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog_type: "postgres".to_string(),
            cache_ttl_secs: None,
            settings: HashMap::new(),
        }
    }
}

impl CatalogConfig {
    /// Look up a setting, expanding `${VAR}` from the environment
    pub fn setting(&self, key: &str) -> Option<String> {
        let raw = self.settings.get(key)?;
        match raw.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            Some(var) => std::env::var(var).ok(),
            None => Some(raw.clone()),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Columns never part of a row signature (glob patterns, e.g. `_etl_*`)
    #[serde(default)]
    pub metadata_columns: Vec<String>,

    /// Chunk size for `[loadings.chunk]` entries that omit one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_chunk_size: Option<usize>,

    /// Relation metadata provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogConfig>,

    /// Loading definitions
    #[serde(default)]
    pub loadings: Vec<LoadingDefinition>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata_columns: Vec::new(),
            default_chunk_size: None,
            catalog: None,
            loadings: Vec::new(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Check if a column is a metadata column
    pub fn is_metadata_column(&self, column: &str) -> bool {
        self.metadata_columns
            .iter()
            .any(|pattern| glob_match(pattern, column))
    }

    /// Validate every `[[loadings]]` entry
    ///
    /// Fails on the first invalid definition or on a repeated name.
    pub fn loadings(&self) -> Result<Vec<Loading>, ConfigError> {
        let mut seen = HashSet::new();
        let mut loadings = Vec::with_capacity(self.loadings.len());

        for def in &self.loadings {
            if !seen.insert(def.name.as_str()) {
                return Err(ConfigError::DuplicateLoading(def.name.clone()));
            }
            let loading = def
                .clone()
                .into_loading(self.default_chunk_size)
                .map_err(|error| ConfigError::InvalidLoading {
                    loading: def.name.clone(),
                    error,
                })?;
            loadings.push(loading);
        }

        Ok(loadings)
    }

    /// Validated loading by name
    pub fn loading(&self, name: &str) -> Result<Loading, ConfigError> {
        let def = self
            .loadings
            .iter()
            .find(|def| def.name == name)
            .ok_or_else(|| ConfigError::UnknownLoading(name.to_string()))?;

        def.clone()
            .into_loading(self.default_chunk_size)
            .map_err(|error| ConfigError::InvalidLoading {
                loading: name.to_string(),
                error,
            })
    }
}

/// Simple glob matching (supports a single * wildcard)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];

        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid loading '{loading}': {error}")]
    InvalidLoading {
        loading: String,
        #[source]
        error: ModelError,
    },

    #[error("Loading '{0}' is defined more than once")]
    DuplicateLoading(String),

    #[error("No loading named '{0}'")]
    UnknownLoading(String),
}

impl ConfigError {
    /// Stable string identifier for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::IoError(_) => "CONFIG_IO_ERROR",
            Self::ParseError(_) => "CONFIG_PARSE_ERROR",
            Self::SerializeError(_) => "CONFIG_SERIALIZE_ERROR",
            Self::InvalidLoading { error, .. } => error.code(),
            Self::DuplicateLoading(_) => "DUPLICATE_LOADING",
            Self::UnknownLoading(_) => "UNKNOWN_LOADING",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::LoadingKind;

    const SAMPLE: &str = r#"
metadata_columns = ["_etl_*", "loaded_at"]
default_chunk_size = 1000

[catalog]
type = "postgres"
cache_ttl_secs = 300
host = "localhost"
password = "${DWHRECON_TEST_PASSWORD_UNSET}"

[[loadings]]
name = "orders_snapshot"
source = "crm.public.orders"
destination = "dwh.raw.orders"
exclude = ["updated_at"]

[[loadings]]
name = "orders_incremental"
source = "crm.public.orders"
destination = { fqn = "dwh.raw.orders_inc", has_rows_hash = true }
strategy = "incremental"
increment_column = "updated_at"
is_overlapping = true

[loadings.chunk]
column = "id"
"#;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.metadata_columns.is_empty());
        assert!(config.loadings().unwrap().is_empty());
    }

    #[test]
    fn parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let catalog = config.catalog.as_ref().unwrap();
        assert_eq!(catalog.catalog_type, "postgres");
        assert_eq!(catalog.cache_ttl_secs, Some(300));
        assert_eq!(catalog.setting("host").as_deref(), Some("localhost"));
        assert_eq!(catalog.setting("password"), None);

        let loadings = config.loadings().unwrap();
        assert_eq!(loadings.len(), 2);
        assert_eq!(loadings[0].strategy().kind(), LoadingKind::Snapshot);
        assert_eq!(loadings[0].excluded_columns(), ["updated_at".to_string()]);

        let inc = &loadings[1];
        assert_eq!(inc.strategy().increment_column(), Some("updated_at"));
        assert!(inc.destination().has_rows_hash);
        assert_eq!(inc.chunking().unwrap().chunk_size(), 1000);
    }

    #[test]
    fn metadata_column_patterns() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert!(config.is_metadata_column("_etl_batch_id"));
        assert!(config.is_metadata_column("loaded_at"));
        assert!(!config.is_metadata_column("amount"));
    }

    #[test]
    fn invalid_loading_reports_model_code() {
        let toml = r#"
[[loadings]]
name = "broken"
source = "crm.public.orders"
destination = "dwh.raw.orders"
strategy = "incremental"
"#;
        let config = Config::from_toml(toml).unwrap();
        let err = config.loadings().unwrap_err();
        assert_eq!(err.code(), "INCREMENTAL_LOADING_MUST_HAVE_AN_INCREMENT_ATTRIBUTE");
        assert!(matches!(config.loading("missing"), Err(ConfigError::UnknownLoading(_))));
    }

    #[test]
    fn duplicate_loading_names() {
        let toml = r#"
[[loadings]]
name = "orders"
source = "crm.public.orders"
destination = "dwh.raw.orders"

[[loadings]]
name = "orders"
source = "crm.public.orders"
destination = "dwh.raw.orders2"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert!(matches!(config.loadings(), Err(ConfigError::DuplicateLoading(_))));
    }

    #[test]
    fn config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dwhrecon.toml");

        let config = Config::from_toml(SAMPLE).unwrap();
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.project_root, dir.path());
        assert_eq!(loaded.metadata_columns, config.metadata_columns);
        assert_eq!(loaded.loadings, config.loadings);
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("_etl_*", "_etl_loaded"));
        assert!(glob_match("*_at", "updated_at"));
        assert!(!glob_match("_etl_*", "amount"));
        assert!(!glob_match("ab*ba", "aba"));
    }
}
