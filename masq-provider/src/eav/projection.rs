//! Flat projection of base columns plus meta keys.

use super::SchemaInfo;
use masq_core::{ColumnRef, LeftJoin, SelectQuery, META_KEY_COLUMN, META_VALUE_COLUMN};
use std::collections::HashSet;

/// Per-query join alias allocator (`j0`, `j1`, ...).
struct Aliases<'a> {
    next: usize,
    reserved: [&'a str; 2],
}

impl Aliases<'_> {
    fn allocate(&mut self) -> String {
        loop {
            let alias = format!("j{}", self.next);
            self.next += 1;
            if !self.reserved.contains(&alias.as_str()) {
                return alias;
            }
        }
    }
}

/// Extend `base` so every requested virtual column is selected by name.
///
/// Selects `base.*`, then one `LEFT JOIN meta AS jN ON base.pk = jN.entity
/// AND jN.meta_key = '<column>'` per distinct virtual column, selecting
/// `jN.meta_value AS <column>`. Entities without the key get NULL. Physical
/// columns add no join; without a meta layer no join is ever added.
pub fn build_query<'a, I>(schema: &SchemaInfo, base: SelectQuery, requested: I) -> SelectQuery
where
    I: IntoIterator<Item = &'a str>,
{
    let mut query = base.select_all(schema.table.clone());

    let Some(meta) = schema.meta() else {
        return query;
    };

    let mut aliases = Aliases {
        next: 0,
        reserved: [schema.table.as_str(), meta.schema.table.as_str()],
    };
    let mut joined = HashSet::new();

    for column in requested {
        if schema.is_physical(column) || !joined.insert(column) {
            continue;
        }
        let alias = aliases.allocate();
        query = query
            .left_join(
                LeftJoin::new(meta.schema.table.clone(), alias.clone())
                    .on_columns(
                        ColumnRef::new(schema.table.clone(), schema.primary_key.clone()),
                        ColumnRef::new(alias.clone(), meta.schema.entity_column.clone()),
                    )
                    .on_value(ColumnRef::new(alias.clone(), META_KEY_COLUMN), column),
            )
            .select_column(
                ColumnRef::new(alias, META_VALUE_COLUMN),
                Some(column.to_string()),
            );
    }

    query
}
