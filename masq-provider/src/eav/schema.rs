//! Meta table discovery.

use masq_core::{ConfigError, MasqResult, META_KEY_COLUMN, META_VALUE_COLUMN};
use masq_storage::Store;

/// Shape of the key/value side table belonging to a base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaSchema {
    pub table: String,
    /// First column of the meta table. Only checked for existence.
    pub primary_key: String,
    /// Column referencing the base table's primary key.
    pub entity_column: String,
}

/// `posts` -> `postmeta`, `users` -> `usermeta`, `wp_posts` -> `wp_postmeta`.
pub fn meta_table_name(base_table: &str) -> String {
    format!("{}meta", base_table.strip_suffix('s').unwrap_or(base_table))
}

/// Find the meta table of `base_table` and its entity-id column.
///
/// Returns `Ok(None)` when there is no usable meta table; the provider then
/// behaves like a plain single-table provider. A configured `id_field` that
/// is not a column of an existing meta table is a configuration error.
pub async fn resolve(
    store: &dyn Store,
    base_table: &str,
    id_field: Option<&str>,
) -> MasqResult<Option<MetaSchema>> {
    let table = meta_table_name(base_table);

    if !store.has_table(&table).await? {
        tracing::info!(base = %base_table, meta = %table, "No meta table; base columns only");
        return Ok(None);
    }

    let columns = store.list_columns(&table).await?;

    if let Some(id_field) = id_field {
        if !columns.iter().any(|c| c == id_field) {
            return Err(ConfigError::UnknownIdField {
                meta_table: table,
                id_field: id_field.to_string(),
            }
            .into());
        }
    }

    let mut rest = columns.iter();
    let Some(primary_key) = rest.next() else {
        tracing::warn!(meta = %table, "Meta table has no columns; ignoring it");
        return Ok(None);
    };

    let entity_column = match id_field {
        Some(id_field) => id_field.to_string(),
        None => match rest.next() {
            Some(column) => column.clone(),
            None => {
                tracing::warn!(
                    meta = %table,
                    "Cannot infer entity id column from a single-column meta table; ignoring it"
                );
                return Ok(None);
            }
        },
    };

    for required in [META_KEY_COLUMN, META_VALUE_COLUMN] {
        if !columns.iter().any(|c| c == required) {
            tracing::warn!(meta = %table, column = required, "Meta table lacks column; ignoring it");
            return Ok(None);
        }
    }

    Ok(Some(MetaSchema {
        table,
        primary_key: primary_key.clone(),
        entity_column,
    }))
}
