//! Meta key catalog.

use masq_core::{ColumnRef, MasqResult, SelectQuery, Value, META_KEY_COLUMN};
use masq_storage::Store;
use std::collections::HashSet;

/// Distinct `meta_key` values present in a meta table when it was loaded.
///
/// A snapshot: keys added to the table afterwards are not visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyCatalog {
    keys: HashSet<String>,
}

impl KeyCatalog {
    /// `SELECT DISTINCT meta_key FROM <meta_table>`
    pub async fn load(store: &dyn Store, meta_table: &str) -> MasqResult<Self> {
        let query = SelectQuery::from(meta_table)
            .distinct()
            .select_column(ColumnRef::new(meta_table, META_KEY_COLUMN), None);
        let rows = store.select(&query).await?;

        let keys: HashSet<String> = rows
            .iter()
            .filter_map(|row| match row.get(META_KEY_COLUMN) {
                Some(Value::String(key)) => Some(key.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
            .collect();

        tracing::debug!(meta = %meta_table, keys = keys.len(), "Loaded meta keys");
        Ok(Self { keys })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for KeyCatalog {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use masq_core::row;
    use masq_storage::MockStore;
    use serde_json::json;

    fn meta_store(entries: &[(i64, Value)]) -> MockStore {
        let store = MockStore::new();
        store
            .create_table("postmeta", &["meta_id", "post_id", "meta_key", "meta_value"])
            .unwrap();
        for (i, (post_id, key)) in entries.iter().enumerate() {
            store
                .insert(
                    "postmeta",
                    row([
                        ("meta_id", json!(i)),
                        ("post_id", json!(post_id)),
                        ("meta_key", key.clone()),
                        ("meta_value", json!("v")),
                    ]),
                )
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_load_distinct_keys() {
        let store = meta_store(&[
            (1, json!("color")),
            (2, json!("color")),
            (1, json!("_edit_lock")),
            (3, Value::Null),
        ]);
        let catalog = KeyCatalog::load(&store, "postmeta").await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("color"));
        assert!(catalog.contains("_edit_lock"));
        assert!(!catalog.contains("size"));
    }

    #[tokio::test]
    async fn test_load_empty_table() {
        let store = meta_store(&[]);
        let catalog = KeyCatalog::load(&store, "postmeta").await.unwrap();
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_load_twice_is_stable() {
        let store = meta_store(&[(1, json!("color")), (2, json!("size"))]);
        let first = KeyCatalog::load(&store, "postmeta").await.unwrap();
        let second = KeyCatalog::load(&store, "postmeta").await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_iter() {
        let catalog: KeyCatalog = ["a", "b", "a"].into_iter().collect();
        assert_eq!(catalog.len(), 2);
        let mut keys: Vec<_> = catalog.iter().collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
