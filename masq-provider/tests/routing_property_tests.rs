//! Property-Based Tests for Projection and Write Routing
//!
//! **Property 1: Alias uniqueness**
//! For any requested column list, every join of the built query has a
//! distinct alias and there is exactly one join per distinct virtual column.
//!
//! **Property 2: Routing partition**
//! For any update set, every field is written by exactly one statement: the
//! base UPDATE for physical fields or its own meta UPDATE for virtual ones.
//!
//! **Property 3: Write isolation**
//! Updating one entity never changes another entity's projected row.

use masq_core::{SelectQuery, META_KEY_COLUMN};
use masq_provider::{build_query, build_writes, MetaTableProvider, TableProvider};
use masq_test_utils::{fixtures, generators, Value};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use tokio::runtime::{Builder, Runtime};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

const POST_FIELDS: &[&str] = &[
    "ID",
    "post_title",
    "post_status",
    "color",
    "size",
    "_edit_lock",
    "unknown",
];

fn fields() -> Vec<String> {
    POST_FIELDS.iter().map(|f| f.to_string()).collect()
}

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Builder::new_current_thread()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

async fn ready_provider() -> Result<MetaTableProvider, TestCaseError> {
    let mut provider = MetaTableProvider::new(fixtures::posts_config(), fixtures::wordpress_store());
    provider
        .setup()
        .await
        .map_err(|e| TestCaseError::fail(format!("Setup failed: {}", e)))?;
    Ok(provider)
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_aliases_unique_per_virtual_column(requested in generators::arb_requested(fields())) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let provider = ready_provider().await?;
            let schema = provider
                .schema()
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let query = build_query(
                schema,
                SelectQuery::from("posts"),
                requested.iter().map(String::as_str),
            );

            let aliases = query.join_aliases();
            let distinct: HashSet<&str> = aliases.iter().copied().collect();
            prop_assert_eq!(distinct.len(), aliases.len());

            let virtual_columns: HashSet<&str> = requested
                .iter()
                .map(String::as_str)
                .filter(|c| !schema.is_physical(c))
                .collect();
            prop_assert_eq!(aliases.len(), virtual_columns.len());
            prop_assert!(!distinct.contains("posts") && !distinct.contains("postmeta"));
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_every_field_written_exactly_once(updates in generators::arb_updates(fields())) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let provider = ready_provider().await?;
            let schema = provider
                .schema()
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let plan = build_writes(schema, &json!(1), &updates);

            let base_fields: Vec<&str> = plan
                .base
                .iter()
                .flat_map(|s| s.assigned_columns())
                .collect();
            let meta_fields: Vec<&str> = plan
                .meta
                .iter()
                .map(|w| {
                    prop_assert_eq!(
                        w.statement.filter_value(META_KEY_COLUMN).and_then(Value::as_str),
                        Some(w.key.as_str())
                    );
                    Ok(w.key.as_str())
                })
                .collect::<Result<_, TestCaseError>>()?;

            prop_assert_eq!(base_fields.len() + meta_fields.len(), updates.len());
            for field in updates.keys() {
                let in_base = base_fields.contains(&field.as_str());
                let in_meta = meta_fields.contains(&field.as_str());
                prop_assert!(in_base != in_meta, "{} routed to both or neither", field);
                prop_assert_eq!(in_base, schema.is_physical(field));
            }
            for write in &plan.meta {
                prop_assert_eq!(write.statement.filter_value("post_id"), Some(&json!(1)));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_update_leaves_other_entities(value in generators::arb_cell_value()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let provider = ready_provider().await?;
            let query = provider
                .query(&["color", "size"])
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let before = provider
                .fetch(&query)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let updates = masq_test_utils::row([
                ("color", value.clone()),
                ("post_status", value.clone()),
            ]);
            provider
                .update(&json!(1), &updates)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let after = provider
                .fetch(&query)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert_eq!(before.len(), after.len());
            for (old, new) in before.iter().zip(&after) {
                if old["ID"] == json!(1) {
                    prop_assert_eq!(&new["color"], &value);
                    prop_assert_eq!(&new["size"], &old["size"]);
                } else {
                    prop_assert_eq!(old, new);
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
