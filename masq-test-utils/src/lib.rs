//! MASQ Test Utilities
//!
//! Shared test infrastructure for the MASQ workspace:
//! - A WordPress-shaped in-memory database
//! - Table configuration fixtures
//! - Proptest generators for meta keys, cell values and update sets
//! - Custom assertions for MASQ error variants

// Re-export mock store from its source crate
pub use masq_storage::MockStore;

// Re-export core types for convenience
pub use masq_core::{
    row, ColumnConfig, ConfigError, MasqError, MasqResult, ProviderClass, Row, SchemaError,
    StorageKind, StoreError, TableConfig, UpdateStatement, Value,
};

use serde_json::json;
use std::sync::Arc;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for provider inputs.

    use super::*;
    use proptest::prelude::*;
    use proptest::sample::subsequence;

    /// Generate a meta key in the WordPress style, including `_private` keys.
    pub fn arb_meta_key() -> impl Strategy<Value = String> {
        "_?[a-z][a-z0-9_]{0,15}"
    }

    /// Generate a cell value: NULL, an integer or a short string.
    pub fn arb_cell_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<i32>().prop_map(|n| json!(n)),
            "[ -~]{0,24}".prop_map(Value::String),
        ]
    }

    /// Generate an update set over a subset of `columns`.
    pub fn arb_updates(columns: Vec<String>) -> impl Strategy<Value = Row> {
        let len = columns.len();
        subsequence(columns, 0..=len).prop_flat_map(|picked| {
            proptest::collection::vec(arb_cell_value(), picked.len())
                .prop_map(move |values| picked.iter().cloned().zip(values).collect())
        })
    }

    /// Generate a requested column list drawn from `columns`, repeats allowed.
    pub fn arb_requested(columns: Vec<String>) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec(proptest::sample::select(columns), 0..12)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! A small WordPress database and matching table configurations.
    //!
    //! | table    | meta table | entities | meta rows                        |
    //! |----------|------------|----------|----------------------------------|
    //! | posts    | postmeta   | 1, 2, 3  | 1: color, size; 2: color, _edit_lock |
    //! | users    | usermeta   | 1, 2     | 1: first_name, last_name; 2: first_name |
    //! | links    | (none)     | 1        |                                  |

    use super::*;

    pub const POST_COLUMNS: &[&str] = &["ID", "post_title", "post_status", "post_author"];
    pub const POSTMETA_COLUMNS: &[&str] = &["meta_id", "post_id", "meta_key", "meta_value"];
    pub const USER_COLUMNS: &[&str] = &["ID", "user_login", "user_email", "display_name"];
    pub const USERMETA_COLUMNS: &[&str] = &["umeta_id", "user_id", "meta_key", "meta_value"];
    pub const LINK_COLUMNS: &[&str] = &["link_id", "link_url", "link_name"];

    /// Seeded store with `posts`, `users`, `links` and their meta tables.
    pub fn wordpress_store() -> Arc<MockStore> {
        let store = MockStore::new();
        seed(&store).unwrap_or_else(|e| panic!("Failed to seed fixture store: {}", e));
        Arc::new(store)
    }

    fn seed(store: &MockStore) -> MasqResult<()> {
        store.create_table("posts", POST_COLUMNS)?;
        store.create_table("postmeta", POSTMETA_COLUMNS)?;
        store.create_table("users", USER_COLUMNS)?;
        store.create_table("usermeta", USERMETA_COLUMNS)?;
        store.create_table("links", LINK_COLUMNS)?;

        for (id, title, status) in [
            (1, "Hello world", "publish"),
            (2, "Draft notes", "draft"),
            (3, "About", "publish"),
        ] {
            store.insert(
                "posts",
                row([
                    ("ID", json!(id)),
                    ("post_title", json!(title)),
                    ("post_status", json!(status)),
                    ("post_author", json!(1)),
                ]),
            )?;
        }

        for (meta_id, post_id, key, value) in [
            (1, 1, "color", "red"),
            (2, 1, "size", "L"),
            (3, 2, "color", "blue"),
            (4, 2, "_edit_lock", "1700000000:1"),
        ] {
            store.insert("postmeta", meta_row("meta_id", meta_id, "post_id", post_id, key, value))?;
        }

        for (id, login, email, name) in [
            (1, "admin", "admin@example.org", "Site Admin"),
            (2, "bob", "bob@example.org", "Bob"),
        ] {
            store.insert(
                "users",
                row([
                    ("ID", json!(id)),
                    ("user_login", json!(login)),
                    ("user_email", json!(email)),
                    ("display_name", json!(name)),
                ]),
            )?;
        }

        for (umeta_id, user_id, key, value) in [
            (1, 1, "first_name", "Ann"),
            (2, 1, "last_name", "Lee"),
            (3, 2, "first_name", "Bob"),
        ] {
            store.insert(
                "usermeta",
                meta_row("umeta_id", umeta_id, "user_id", user_id, key, value),
            )?;
        }

        store.insert(
            "links",
            row([
                ("link_id", json!(1)),
                ("link_url", json!("https://wordpress.org")),
                ("link_name", json!("WordPress")),
            ]),
        )?;

        Ok(())
    }

    fn meta_row(
        pk_column: &str,
        pk: i64,
        entity_column: &str,
        entity: i64,
        key: &str,
        value: &str,
    ) -> Row {
        row([
            (pk_column, json!(pk)),
            (entity_column, json!(entity)),
            ("meta_key", json!(key)),
            ("meta_value", json!(value)),
        ])
    }

    /// `posts` through the meta provider, with one base and two meta columns.
    pub fn posts_config() -> TableConfig {
        TableConfig::new("posts")
            .with_provider(ProviderClass::WordpressMeta)
            .with_column("post_title", ColumnConfig::default())
            .with_column("color", ColumnConfig::default())
            .with_column("size", ColumnConfig::default())
    }

    /// `users` through the meta provider with an explicit entity column.
    pub fn users_config() -> TableConfig {
        TableConfig::new("users")
            .with_provider(ProviderClass::WordpressMeta)
            .with_id_field("user_id")
            .with_column("user_email", ColumnConfig::default())
            .with_column("first_name", ColumnConfig::default())
            .with_column("last_name", ColumnConfig::default())
    }

    /// `links` through the meta provider; it has no meta table.
    pub fn links_config() -> TableConfig {
        TableConfig::new("links")
            .with_provider(ProviderClass::WordpressMeta)
            .with_column("link_url", ColumnConfig::default())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for MASQ results and recorded statements.

    use super::*;

    /// Assert that a MasqResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &MasqResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a MasqResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &MasqResult<T>) {
        match result {
            Err(MasqError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a MasqResult is an UnknownIdField config error for `id_field`.
    #[track_caller]
    pub fn assert_unknown_id_field<T: std::fmt::Debug>(result: &MasqResult<T>, id_field: &str) {
        match result {
            Err(MasqError::Config(ConfigError::UnknownIdField { id_field: f, .. })) => {
                assert_eq!(f, id_field, "Wrong id_field in UnknownIdField error");
            }
            other => panic!("Expected UnknownIdField({}), got: {:?}", id_field, other),
        }
    }

    /// Assert that a MasqResult is a Schema error.
    #[track_caller]
    pub fn assert_schema_error<T: std::fmt::Debug>(result: &MasqResult<T>) {
        match result {
            Err(MasqError::Schema(_)) => {}
            other => panic!("Expected Schema error, got: {:?}", other),
        }
    }

    /// Assert that a MasqResult is a NotSetUp schema error.
    #[track_caller]
    pub fn assert_not_set_up<T: std::fmt::Debug>(result: &MasqResult<T>) {
        match result {
            Err(MasqError::Schema(SchemaError::NotSetUp { .. })) => {}
            other => panic!("Expected NotSetUp error, got: {:?}", other),
        }
    }

    /// Assert that a MasqResult is a Store error.
    #[track_caller]
    pub fn assert_store_error<T: std::fmt::Debug>(result: &MasqResult<T>) {
        match result {
            Err(MasqError::Store(_)) => {}
            other => panic!("Expected Store error, got: {:?}", other),
        }
    }

    /// Assert the tables targeted by executed updates, in order.
    #[track_caller]
    pub fn assert_update_targets(updates: &[UpdateStatement], tables: &[&str]) {
        let got: Vec<&str> = updates.iter().map(|u| u.table.as_str()).collect();
        assert_eq!(got, tables, "Unexpected update targets");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wordpress_store_fixture() {
        let store = fixtures::wordpress_store();
        assert_eq!(store.rows("posts").unwrap().len(), 3);
        assert_eq!(store.rows("postmeta").unwrap().len(), 4);
        assert_eq!(store.rows("usermeta").unwrap().len(), 3);
        assert_eq!(store.rows("links").unwrap().len(), 1);
        assert!(store.executed_updates().unwrap().is_empty());
    }

    #[test]
    fn test_config_fixtures_are_valid() {
        for config in [
            fixtures::posts_config(),
            fixtures::users_config(),
            fixtures::links_config(),
        ] {
            assertions::assert_ok(&config.validate());
            assert_eq!(config.provider.class, ProviderClass::WordpressMeta);
        }
    }

    #[test]
    fn test_assertion_unknown_id_field() {
        let result: MasqResult<()> = Err(ConfigError::UnknownIdField {
            meta_table: "postmeta".to_string(),
            id_field: "post_uid".to_string(),
        }
        .into());
        assertions::assert_config_error(&result);
        assertions::assert_unknown_id_field(&result, "post_uid");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_updates_use_only_given_columns(
            updates in generators::arb_updates(vec!["a".into(), "b".into(), "c".into()])
        ) {
            prop_assert!(updates.len() <= 3);
            prop_assert!(updates.keys().all(|k| ["a", "b", "c"].contains(&k.as_str())));
        }

        #[test]
        fn prop_meta_keys_are_identifiers(key in generators::arb_meta_key()) {
            prop_assert!(!key.is_empty());
            prop_assert!(key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
    }
}
