//! Write-back routing between the base table and meta rows.

use super::SchemaInfo;
use crate::simple::base_update;
use masq_core::{MasqResult, Row, UpdateStatement, Value, META_KEY_COLUMN, META_VALUE_COLUMN};
use masq_storage::Store;

/// Update of one virtual field.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaWrite {
    pub key: String,
    pub statement: UpdateStatement,
}

/// Statements produced for one `update` call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WritePlan {
    /// Primary key of the entity being written
    pub entity: Value,
    /// Single update of all physical fields, if any
    pub base: Option<UpdateStatement>,
    /// One update per virtual field, in column name order
    pub meta: Vec<MetaWrite>,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.base.is_none() && self.meta.is_empty()
    }

    pub fn statement_count(&self) -> usize {
        usize::from(self.base.is_some()) + self.meta.len()
    }
}

/// Split `updates` into a base-table update and per-key meta updates.
///
/// Meta updates only touch existing `(entity, meta_key)` rows; nothing is
/// inserted.
pub fn build_writes(schema: &SchemaInfo, primary_key: &Value, updates: &Row) -> WritePlan {
    let (physical, virtual_): (Vec<_>, Vec<_>) =
        updates.iter().partition(|(column, _)| schema.is_physical(column));

    let base = base_update(&schema.table, &schema.primary_key, primary_key, physical);

    // The physical predicate only reports virtual columns when a meta layer exists.
    let meta = match schema.meta() {
        Some(meta) => virtual_
            .into_iter()
            .map(|(column, value)| MetaWrite {
                key: column.clone(),
                statement: UpdateStatement::new(meta.schema.table.clone())
                    .set(META_VALUE_COLUMN, value.clone())
                    .where_eq(meta.schema.entity_column.clone(), primary_key.clone())
                    .where_eq(META_KEY_COLUMN, column.clone()),
            })
            .collect(),
        None => Vec::new(),
    };

    WritePlan {
        entity: primary_key.clone(),
        base,
        meta,
    }
}

/// Execute a plan statement by statement. The first store error aborts the
/// rest; statements already executed stay applied.
pub async fn execute(store: &dyn Store, plan: &WritePlan) -> MasqResult<()> {
    if let Some(base) = &plan.base {
        store.update(base).await?;
    }

    for write in &plan.meta {
        let affected = store.update(&write.statement).await?;
        if affected == 0 {
            tracing::debug!(
                meta = %write.statement.table,
                key = %write.key,
                entity = %plan.entity,
                "No meta row to update; write dropped"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eav::{MetaLayer, MetaSchema};
    use crate::BaseTable;
    use masq_core::{row, ColumnConfig, StorageKind};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn schema(with_meta: bool) -> SchemaInfo {
        let base = BaseTable {
            name: "users".to_string(),
            primary_key: "ID".to_string(),
            columns: vec!["ID".into(), "user_email".into(), "display_name".into()],
        };
        let mut columns = BTreeMap::new();
        columns.insert(
            "display_name".to_string(),
            ColumnConfig::with_backend_type(StorageKind::Meta),
        );
        let meta = with_meta.then(|| MetaLayer {
            schema: MetaSchema {
                table: "usermeta".to_string(),
                primary_key: "umeta_id".to_string(),
                entity_column: "user_id".to_string(),
            },
            keys: ["first_name", "last_name", "display_name"].into_iter().collect(),
        });
        SchemaInfo::new(&base, &columns, meta)
    }

    #[test]
    fn test_mixed_update_routes_each_field() {
        let plan = build_writes(
            &schema(true),
            &json!(5),
            &row([
                ("user_email", json!("a@b.test")),
                ("first_name", json!("Ann")),
                ("last_name", json!("Lee")),
            ]),
        );

        let base = plan.base.as_ref().unwrap();
        assert_eq!(base.table, "users");
        assert_eq!(base.assigned_columns().collect::<Vec<_>>(), vec!["user_email"]);
        assert_eq!(base.filter_value("ID"), Some(&json!(5)));

        assert_eq!(plan.meta.len(), 2);
        assert_eq!(plan.statement_count(), 3);
        assert_eq!(plan.entity, json!(5));
        assert_eq!(plan.meta[0].key, "first_name");
        let first = &plan.meta[0].statement;
        assert_eq!(first.table, "usermeta");
        assert_eq!(first.assignments, vec![("meta_value".to_string(), json!("Ann"))]);
        assert_eq!(first.filter_value("user_id"), Some(&json!(5)));
        assert_eq!(first.filter_value("meta_key"), Some(&json!("first_name")));
    }

    #[test]
    fn test_static_fields_share_one_statement() {
        let plan = build_writes(
            &schema(true),
            &json!(1),
            &row([("user_email", json!("x@y.test")), ("ID", json!(1))]),
        );
        assert!(plan.meta.is_empty());
        assert_eq!(plan.base.unwrap().assignments.len(), 2);
    }

    #[test]
    fn test_declared_meta_routes_to_meta_despite_physical_column() {
        let plan = build_writes(&schema(true), &json!(1), &row([("display_name", json!("Z"))]));
        assert!(plan.base.is_none());
        assert_eq!(plan.meta.len(), 1);
        assert_eq!(plan.meta[0].key, "display_name");
    }

    #[test]
    fn test_without_meta_layer_everything_goes_to_base() {
        let plan = build_writes(
            &schema(false),
            &json!(1),
            &row([("display_name", json!("Z")), ("user_email", json!("e"))]),
        );
        assert!(plan.meta.is_empty());
        assert_eq!(plan.base.unwrap().assignments.len(), 2);
    }

    #[test]
    fn test_base_statement_matches_simple_table_rule() {
        let updates = row([("user_email", json!("e")), ("first_name", json!("F"))]);
        let plan = build_writes(&schema(true), &json!(9), &updates);
        let physical = row([("user_email", json!("e"))]);
        assert_eq!(plan.base, base_update("users", "ID", &json!(9), &physical));
    }

    #[test]
    fn test_empty_updates_empty_plan() {
        let plan = build_writes(&schema(true), &json!(1), &Row::new());
        assert!(plan.is_empty());
        assert_eq!(plan.statement_count(), 0);
    }
}
