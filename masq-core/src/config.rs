//! Configuration types
//!
//! Table definitions are written in YAML, one mapping per group:
//!
//! ```yaml
//! posts:
//!   pk: ID
//!   provider:
//!     class: \Elgentos\Masquerade\Provider\Table\WordpressMeta
//!     id_field: post_id
//!   columns:
//!     post_title:
//!       formatter: sentence
//!     _wp_page_template:
//!       formatter:
//!         name: fixed
//!         value: test-template.php
//! ```
//!
//! Column settings other than `backend_type` belong to the masking pipeline
//! and are carried through untouched.

use crate::{ConfigError, MasqError, MasqResult, StorageKind};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// TABLE CONFIGURATION
// ============================================================================

/// Which provider implementation serves a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderClass {
    /// Plain single-table access
    #[default]
    Simple,
    /// Base table plus a `<entity>meta` key/value side table
    WordpressMeta,
}

impl TryFrom<String> for ProviderClass {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        // Accept fully qualified class names, keep only the last segment.
        let short = value.rsplit('\\').next().unwrap_or(&value);
        match short.to_ascii_lowercase().replace('_', "").as_str() {
            "simple" => Ok(ProviderClass::Simple),
            "wordpressmeta" | "wordpress" => Ok(ProviderClass::WordpressMeta),
            _ => Err(ConfigError::InvalidValue {
                field: "provider.class".to_string(),
                value,
                reason: "expected Simple or WordpressMeta".to_string(),
            }),
        }
    }
}

impl From<ProviderClass> for String {
    fn from(class: ProviderClass) -> Self {
        match class {
            ProviderClass::Simple => "simple".to_string(),
            ProviderClass::WordpressMeta => "wordpress_meta".to_string(),
        }
    }
}

/// Provider section of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderOptions {
    #[serde(default)]
    pub class: ProviderClass,
    /// Entity-id column of the meta table, overriding the inferred second column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
}

/// Per-column configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnConfig {
    /// Declared storage kind. `None` leaves the decision to schema discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_type: Option<StorageKind>,
    /// Pipeline-owned settings (formatter, options, ...).
    #[serde(flatten)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl ColumnConfig {
    pub fn with_backend_type(kind: StorageKind) -> Self {
        Self {
            backend_type: Some(kind),
            settings: BTreeMap::new(),
        }
    }
}

/// Definition of one table to process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableConfig {
    /// Logical table name, without storage prefix.
    #[serde(default)]
    pub name: String,
    /// Primary key column. Defaults to the first physical column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<String>,
    /// Raw SQL filter applied to every query of the base table.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub provider: ProviderOptions,
    #[serde(default, deserialize_with = "deserialize_columns")]
    pub columns: BTreeMap<String, ColumnConfig>,
}

/// A bare `column:` entry in YAML deserializes to `null`; treat it as an
/// empty column configuration.
fn deserialize_columns<'de, D>(deserializer: D) -> Result<BTreeMap<String, ColumnConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<ColumnConfig>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, column)| (name, column.unwrap_or_default()))
        .collect())
}

impl TableConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_pk(mut self, pk: impl Into<String>) -> Self {
        self.pk = Some(pk.into());
        self
    }

    pub fn with_provider(mut self, class: ProviderClass) -> Self {
        self.provider.class = class;
        self
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.provider.id_field = Some(id_field.into());
        self
    }

    pub fn with_where(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    pub fn with_column(mut self, name: impl Into<String>, column: ColumnConfig) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    /// Validate the table definition.
    ///
    /// Validates:
    /// - name is non-empty
    /// - pk and id_field, when given, are non-empty
    /// - no column has an empty name
    pub fn validate(&self) -> MasqResult<()> {
        if self.name.trim().is_empty() {
            return Err(MasqError::Config(ConfigError::MissingRequired {
                field: "name".to_string(),
            }));
        }

        if let Some(pk) = &self.pk {
            if pk.trim().is_empty() {
                return Err(MasqError::Config(ConfigError::InvalidValue {
                    field: format!("{}.pk", self.name),
                    value: pk.clone(),
                    reason: "pk must not be empty".to_string(),
                }));
            }
        }

        if let Some(id_field) = &self.provider.id_field {
            if id_field.trim().is_empty() {
                return Err(MasqError::Config(ConfigError::InvalidValue {
                    field: format!("{}.provider.id_field", self.name),
                    value: id_field.clone(),
                    reason: "id_field must not be empty".to_string(),
                }));
            }
        }

        if self.columns.keys().any(|c| c.trim().is_empty()) {
            return Err(MasqError::Config(ConfigError::InvalidValue {
                field: format!("{}.columns", self.name),
                value: String::new(),
                reason: "column names must not be empty".to_string(),
            }));
        }

        Ok(())
    }
}

/// Parse a YAML mapping of table name to table definition.
///
/// A definition without an explicit `name` takes the mapping key.
pub fn parse_table_group(content: &str) -> MasqResult<BTreeMap<String, TableConfig>> {
    let raw: BTreeMap<String, Option<TableConfig>> =
        serde_yaml::from_str(content).map_err(|e| ConfigError::YamlParse {
            reason: e.to_string(),
        })?;

    let mut tables = BTreeMap::new();
    for (key, table) in raw {
        let mut table = table.unwrap_or_default();
        if table.name.is_empty() {
            table.name = key.clone();
        }
        table.validate()?;
        tables.insert(key, table);
    }
    Ok(tables)
}

// ============================================================================
// STORE CONFIGURATION
// ============================================================================

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
    /// Storage prefix prepended to every logical table name (e.g. `wp_`)
    pub table_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "masq".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 4,
            timeout: Duration::from_secs(30),
            table_prefix: "".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create a store configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MASQ_DB_HOST` (default: localhost)
    /// - `MASQ_DB_PORT` (default: 5432)
    /// - `MASQ_DB_NAME` (default: masq)
    /// - `MASQ_DB_USER` (default: postgres)
    /// - `MASQ_DB_PASSWORD` (default: empty)
    /// - `MASQ_DB_POOL_SIZE` (default: 4)
    /// - `MASQ_DB_TIMEOUT` seconds (default: 30)
    /// - `MASQ_TABLE_PREFIX` (default: empty)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("MASQ_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("MASQ_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("MASQ_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("MASQ_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("MASQ_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("MASQ_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("MASQ_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            table_prefix: std::env::var("MASQ_TABLE_PREFIX").unwrap_or_default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> MasqResult<()> {
        if self.host.is_empty() {
            return Err(MasqError::Config(ConfigError::MissingRequired {
                field: "host".to_string(),
            }));
        }

        if self.max_size == 0 {
            return Err(MasqError::Config(ConfigError::InvalidValue {
                field: "max_size".to_string(),
                value: self.max_size.to_string(),
                reason: "pool size must be greater than 0".to_string(),
            }));
        }

        if self.timeout.is_zero() {
            return Err(MasqError::Config(ConfigError::InvalidValue {
                field: "timeout".to_string(),
                value: format!("{:?}", self.timeout),
                reason: "timeout must be positive".to_string(),
            }));
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const GROUP: &str = r#"
posts:
  pk: ID
  where: "post_type = 'post'"
  provider:
    class: \Elgentos\Masquerade\Provider\Table\WordpressMeta
    id_field: post_id
  columns:
    post_title:
      formatter: sentence
    _wp_page_template:
      formatter:
        name: fixed
        value: test-template.php
    _edit_lock:
    color:
      backend_type: varchar
    post_status:
      backend_type: static
users:
  columns:
    user_email:
      formatter: email
"#;

    #[test]
    fn test_parse_table_group() {
        let tables = parse_table_group(GROUP).unwrap();
        assert_eq!(tables.len(), 2);

        let posts = &tables["posts"];
        assert_eq!(posts.name, "posts");
        assert_eq!(posts.pk.as_deref(), Some("ID"));
        assert_eq!(posts.where_clause.as_deref(), Some("post_type = 'post'"));
        assert_eq!(posts.provider.class, ProviderClass::WordpressMeta);
        assert_eq!(posts.provider.id_field.as_deref(), Some("post_id"));
        assert_eq!(posts.columns.len(), 5);
        assert_eq!(posts.columns["color"].backend_type, Some(StorageKind::Meta));
        assert_eq!(posts.columns["post_status"].backend_type, Some(StorageKind::Static));
        assert_eq!(posts.columns["_edit_lock"], ColumnConfig::default());
        assert_eq!(
            posts.columns["_wp_page_template"].settings["formatter"],
            json!({"name": "fixed", "value": "test-template.php"})
        );

        let users = &tables["users"];
        assert_eq!(users.provider.class, ProviderClass::Simple);
        assert!(users.pk.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_yaml() {
        let result = parse_table_group("posts: [unclosed");
        assert!(matches!(result, Err(MasqError::Config(ConfigError::YamlParse { .. }))));
    }

    #[test]
    fn test_parse_rejects_unknown_provider() {
        let result = parse_table_group("posts:\n  provider:\n    class: Magento2Eav\n");
        assert!(matches!(result, Err(MasqError::Config(ConfigError::YamlParse { .. }))));
    }

    #[test]
    fn test_provider_class_aliases() {
        for name in ["simple", "Simple", "\\Elgentos\\Masquerade\\Provider\\Table\\Simple"] {
            assert_eq!(ProviderClass::try_from(name.to_string()).unwrap(), ProviderClass::Simple);
        }
        for name in ["wordpress_meta", "WordpressMeta", "Wordpress"] {
            assert_eq!(
                ProviderClass::try_from(name.to_string()).unwrap(),
                ProviderClass::WordpressMeta
            );
        }
    }

    #[test]
    fn test_validate_empty_id_field() {
        let table = TableConfig::new("posts").with_id_field(" ");
        assert!(matches!(
            table.validate(),
            Err(MasqError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_validate_missing_name() {
        let table = TableConfig::default();
        assert!(matches!(
            table.validate(),
            Err(MasqError::Config(ConfigError::MissingRequired { .. }))
        ));
    }

    #[test]
    fn test_store_config_defaults_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 5432);
        assert!(config.table_prefix.is_empty());
    }

    #[test]
    fn test_store_config_zero_pool_invalid() {
        let config = StoreConfig {
            max_size: 0,
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
