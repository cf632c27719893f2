//! MASQ Core - Table Provider Types
//!
//! Pure data structures shared by the store backends and the table providers.
//! This crate holds the row model, column storage metadata, SQL plans and
//! configuration - no I/O.

pub mod config;
pub mod error;
pub mod query;

pub use config::*;
pub use error::*;
pub use query::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// ROW MODEL
// ============================================================================

/// A single cell value. `Value::Null` is SQL NULL.
pub type Value = serde_json::Value;

/// A result row, addressed by column name.
pub type Row = BTreeMap<String, Value>;

/// Column of a meta table holding the attribute name.
pub const META_KEY_COLUMN: &str = "meta_key";

/// Column of a meta table holding the attribute value.
pub const META_VALUE_COLUMN: &str = "meta_value";

/// Build a row from `(column, value)` pairs.
pub fn row<K, I>(pairs: I) -> Row
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

// ============================================================================
// STORAGE KIND
// ============================================================================

/// Where the values of a column physically live.
///
/// Configuration declares this through `backend_type`: the string `static`
/// means the column is a real base-table column, any other value marks it as
/// backed by the meta table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageKind {
    /// Physically present on the base table
    Static,
    /// Stored as `(entity_id, meta_key, meta_value)` rows in the meta table
    Meta,
}

impl StorageKind {
    pub fn is_static(self) -> bool {
        matches!(self, StorageKind::Static)
    }
}

impl From<String> for StorageKind {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("static") {
            StorageKind::Static
        } else {
            StorageKind::Meta
        }
    }
}

impl From<StorageKind> for String {
    fn from(kind: StorageKind) -> Self {
        match kind {
            StorageKind::Static => "static".to_string(),
            StorageKind::Meta => "meta".to_string(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_storage_kind_from_backend_type() {
        assert_eq!(StorageKind::from("static".to_string()), StorageKind::Static);
        assert_eq!(StorageKind::from("STATIC".to_string()), StorageKind::Static);
        assert_eq!(StorageKind::from("varchar".to_string()), StorageKind::Meta);
        assert_eq!(StorageKind::from("meta".to_string()), StorageKind::Meta);
    }

    #[test]
    fn test_storage_kind_serde() {
        let kind: StorageKind = serde_json::from_value(json!("int")).unwrap();
        assert_eq!(kind, StorageKind::Meta);
        assert_eq!(serde_json::to_value(StorageKind::Static).unwrap(), json!("static"));
    }

    #[test]
    fn test_row_builder() {
        let r = row([("ID", json!(1)), ("post_title", json!("Hello"))]);
        assert_eq!(r.len(), 2);
        assert_eq!(r["post_title"], json!("Hello"));
    }
}
