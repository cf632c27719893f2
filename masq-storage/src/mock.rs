//! In-memory store for testing.
//!
//! Evaluates select plans with SQL semantics: left joins keep unmatched rows
//! with NULLs and fan out on multiple matches, NULL never compares equal.
//! Raw SQL predicates cannot be evaluated and are rejected.

use crate::Store;
use async_trait::async_trait;
use masq_core::{
    ColumnRef, JoinCondition, MasqResult, Predicate, Row, SelectItem, SelectQuery, StoreError,
    UpdateStatement, Value,
};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default)]
struct MockTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl MockTable {
    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Binding of table names / join aliases to the current row of each.
type Tuple<'a> = HashMap<&'a str, Option<&'a Row>>;

/// In-memory mock store.
#[derive(Debug, Default)]
pub struct MockStore {
    tables: Arc<RwLock<HashMap<String, MockTable>>>,
    executed: Arc<RwLock<Vec<UpdateStatement>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

fn read<T>(lock: &RwLock<T>) -> MasqResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StoreError::LockPoisoned.into())
}

fn write<T>(lock: &RwLock<T>) -> MasqResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StoreError::LockPoisoned.into())
}

impl MockStore {
    /// Create a new, empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table with the given columns in declared order.
    pub fn create_table(&self, table: &str, columns: &[&str]) -> MasqResult<()> {
        let mut tables = write(&self.tables)?;
        tables.insert(
            table.to_string(),
            MockTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Insert a row. Columns left out are stored as NULL.
    pub fn insert(&self, table: &str, row: Row) -> MasqResult<()> {
        let mut tables = write(&self.tables)?;
        let target = tables.get_mut(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;

        if let Some(unknown) = row.keys().find(|c| !target.has_column(c)) {
            return Err(StoreError::ColumnNotFound {
                table: table.to_string(),
                column: unknown.clone(),
            }
            .into());
        }

        let full: Row = target
            .columns
            .iter()
            .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
            .collect();
        target.rows.push(full);
        Ok(())
    }

    /// Snapshot of all rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> MasqResult<Vec<Row>> {
        let tables = read(&self.tables)?;
        tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| {
                StoreError::TableNotFound {
                    table: table.to_string(),
                }
                .into()
            })
    }

    /// Every update executed so far, including those that matched no rows.
    pub fn executed_updates(&self) -> MasqResult<Vec<UpdateStatement>> {
        Ok(read(&self.executed)?.clone())
    }

    /// Forget the recorded updates.
    pub fn clear_log(&self) -> MasqResult<()> {
        write(&self.executed)?.clear();
        Ok(())
    }

    /// Make every subsequent update against `table` fail.
    pub fn fail_updates_on(&self, table: &str) -> MasqResult<()> {
        write(&self.failing)?.insert(table.to_string());
        Ok(())
    }
}

// ============================================================================
// VALUE SEMANTICS
// ============================================================================

/// SQL equality with loose numeric/string comparison. NULL equals nothing.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.parse::<f64>().ok() == n.as_f64()
        }
        _ => a == b,
    }
}

/// Ordering used by `ORDER BY`: NULLs first, numbers numerically,
/// everything else by its text form.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

// ============================================================================
// PLAN EVALUATION
// ============================================================================

struct Evaluator<'a> {
    /// Table name or join alias -> table
    sources: HashMap<&'a str, &'a MockTable>,
}

impl<'a> Evaluator<'a> {
    fn resolve(&self, column: &ColumnRef, tuple: &Tuple<'a>) -> MasqResult<Value> {
        let table = self
            .sources
            .get(column.table.as_str())
            .ok_or_else(|| StoreError::TableNotFound {
                table: column.table.clone(),
            })?;
        if !table.has_column(&column.column) {
            return Err(StoreError::ColumnNotFound {
                table: column.table.clone(),
                column: column.column.clone(),
            }
            .into());
        }
        Ok(tuple
            .get(column.table.as_str())
            .copied()
            .flatten()
            .and_then(|row| row.get(&column.column))
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn condition_holds(&self, condition: &JoinCondition, tuple: &Tuple<'a>) -> MasqResult<bool> {
        Ok(match condition {
            JoinCondition::Columns(left, right) => {
                values_equal(&self.resolve(left, tuple)?, &self.resolve(right, tuple)?)
            }
            JoinCondition::Value(column, value) => values_equal(&self.resolve(column, tuple)?, value),
        })
    }

    fn predicate_holds(&self, predicate: &Predicate, tuple: &Tuple<'a>) -> MasqResult<bool> {
        match predicate {
            Predicate::Eq { column, value } => Ok(values_equal(&self.resolve(column, tuple)?, value)),
            Predicate::Raw(sql) => Err(StoreError::Unsupported {
                feature: format!("raw predicate `{}`", sql),
            }
            .into()),
        }
    }

    fn project(&self, query: &SelectQuery, tuple: &Tuple<'a>) -> MasqResult<Row> {
        let default_items = [SelectItem::AllColumns {
            table: query.table.clone(),
        }];
        let items: &[SelectItem] = if query.selects.is_empty() {
            &default_items
        } else {
            &query.selects
        };

        let mut out = Row::new();
        for item in items {
            match item {
                SelectItem::AllColumns { table } => {
                    let source = self.sources.get(table.as_str()).ok_or_else(|| {
                        StoreError::TableNotFound {
                            table: table.clone(),
                        }
                    })?;
                    for column in &source.columns {
                        let value = self.resolve(&ColumnRef::new(table.clone(), column.clone()), tuple)?;
                        out.insert(column.clone(), value);
                    }
                }
                SelectItem::Column { column, .. } => {
                    let value = self.resolve(column, tuple)?;
                    let name = item.output_name().unwrap_or(column.column.as_str());
                    out.insert(name.to_string(), value);
                }
            }
        }
        Ok(out)
    }
}

fn evaluate_select(tables: &HashMap<String, MockTable>, query: &SelectQuery) -> MasqResult<Vec<Row>> {
    let table_missing = |table: &str| StoreError::TableNotFound {
        table: table.to_string(),
    };

    let base = tables
        .get(&query.table)
        .ok_or_else(|| table_missing(&query.table))?;

    let mut sources: HashMap<&str, &MockTable> = HashMap::new();
    sources.insert(query.table.as_str(), base);
    for join in &query.joins {
        let joined = tables.get(&join.table).ok_or_else(|| table_missing(&join.table))?;
        sources.insert(join.alias.as_str(), joined);
    }
    let eval = Evaluator { sources };

    let mut tuples: Vec<Tuple<'_>> = base
        .rows
        .iter()
        .map(|row| {
            let mut tuple = Tuple::new();
            tuple.insert(query.table.as_str(), Some(row));
            tuple
        })
        .collect();

    for join in &query.joins {
        let joined = eval.sources[join.alias.as_str()];
        let mut expanded = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let mut matched = false;
            for candidate in &joined.rows {
                let mut next = tuple.clone();
                next.insert(join.alias.as_str(), Some(candidate));
                let mut holds = true;
                for condition in &join.on {
                    if !eval.condition_holds(condition, &next)? {
                        holds = false;
                        break;
                    }
                }
                if holds {
                    matched = true;
                    expanded.push(next);
                }
            }
            if !matched {
                let mut next = tuple;
                next.insert(join.alias.as_str(), None);
                expanded.push(next);
            }
        }
        tuples = expanded;
    }

    let mut kept = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        let mut keep = true;
        for predicate in &query.filters {
            if !eval.predicate_holds(predicate, &tuple)? {
                keep = false;
                break;
            }
        }
        if keep {
            kept.push(tuple);
        }
    }

    if !query.order_by.is_empty() {
        let mut keyed = Vec::with_capacity(kept.len());
        for tuple in kept {
            let key = query
                .order_by
                .iter()
                .map(|c| eval.resolve(c, &tuple))
                .collect::<MasqResult<Vec<Value>>>()?;
            keyed.push((key, tuple));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| compare_values(x, y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        kept = keyed.into_iter().map(|(_, tuple)| tuple).collect();
    }

    let mut rows = Vec::with_capacity(kept.len());
    for tuple in &kept {
        let row = eval.project(query, tuple)?;
        if query.distinct && rows.contains(&row) {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

fn evaluate_update(tables: &mut HashMap<String, MockTable>, update: &UpdateStatement) -> MasqResult<u64> {
    let target = tables
        .get_mut(&update.table)
        .ok_or_else(|| StoreError::TableNotFound {
            table: update.table.clone(),
        })?;

    let column_missing = |column: &str| StoreError::ColumnNotFound {
        table: update.table.clone(),
        column: column.to_string(),
    };

    for (column, _) in &update.assignments {
        if !target.has_column(column) {
            return Err(column_missing(column).into());
        }
    }

    let mut conditions = Vec::with_capacity(update.filters.len());
    for filter in &update.filters {
        match filter {
            Predicate::Eq { column, value } => {
                if !target.has_column(&column.column) {
                    return Err(column_missing(&column.column).into());
                }
                conditions.push((column.column.as_str(), value));
            }
            Predicate::Raw(sql) => {
                return Err(StoreError::Unsupported {
                    feature: format!("raw predicate `{}`", sql),
                }
                .into())
            }
        }
    }

    let mut affected = 0;
    for row in target.rows.iter_mut() {
        let matches = conditions
            .iter()
            .all(|(column, value)| row.get(*column).is_some_and(|v| values_equal(v, value)));
        if matches {
            for (column, value) in &update.assignments {
                row.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
    }
    Ok(affected)
}

#[async_trait]
impl Store for MockStore {
    async fn has_table(&self, table: &str) -> MasqResult<bool> {
        Ok(read(&self.tables)?.contains_key(table))
    }

    async fn list_columns(&self, table: &str) -> MasqResult<Vec<String>> {
        // Mirrors information_schema: an unknown table simply has no columns.
        Ok(read(&self.tables)?
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn select(&self, query: &SelectQuery) -> MasqResult<Vec<Row>> {
        let tables = read(&self.tables)?;
        evaluate_select(&tables, query)
    }

    async fn update(&self, update: &UpdateStatement) -> MasqResult<u64> {
        write(&self.executed)?.push(update.clone());

        if read(&self.failing)?.contains(&update.table) {
            return Err(StoreError::QueryFailed {
                statement: format!("UPDATE {}", update.table),
                reason: "injected failure".to_string(),
            }
            .into());
        }

        let mut tables = write(&self.tables)?;
        evaluate_update(&mut tables, update)
    }

    async fn health_check(&self) -> MasqResult<bool> {
        Ok(true)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use masq_core::{row, LeftJoin, MasqError};
    use serde_json::json;

    fn seeded() -> MockStore {
        let store = MockStore::new();
        store.create_table("posts", &["ID", "post_title"]).unwrap();
        store
            .create_table("postmeta", &["meta_id", "post_id", "meta_key", "meta_value"])
            .unwrap();
        for (id, title) in [(2, "Second"), (1, "First"), (3, "Third")] {
            store
                .insert("posts", row([("ID", json!(id)), ("post_title", json!(title))]))
                .unwrap();
        }
        for (meta_id, post_id, key, value) in [
            (10, 1, "color", "red"),
            (11, 1, "size", "L"),
            (12, 2, "color", "green"),
        ] {
            store
                .insert(
                    "postmeta",
                    row([
                        ("meta_id", json!(meta_id)),
                        ("post_id", json!(post_id)),
                        ("meta_key", json!(key)),
                        ("meta_value", json!(value)),
                    ]),
                )
                .unwrap();
        }
        store
    }

    fn color_join(alias: &str) -> LeftJoin {
        LeftJoin::new("postmeta", alias)
            .on_columns(ColumnRef::new("posts", "ID"), ColumnRef::new(alias, "post_id"))
            .on_value(ColumnRef::new(alias, "meta_key"), "color")
    }

    #[tokio::test]
    async fn test_select_all_ordered() {
        let store = seeded();
        let query = SelectQuery::from("posts").order_by(ColumnRef::new("posts", "ID"));
        let rows = store.select(&query).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["ID"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_left_join_keeps_unmatched_rows() {
        let store = seeded();
        let query = SelectQuery::from("posts")
            .select_all("posts")
            .left_join(color_join("j0"))
            .select_column(ColumnRef::new("j0", "meta_value"), Some("color".to_string()))
            .order_by(ColumnRef::new("posts", "ID"));
        let rows = store.select(&query).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["color"], json!("red"));
        assert_eq!(rows[1]["color"], json!("green"));
        assert_eq!(rows[2]["color"], Value::Null);
        assert_eq!(rows[2]["post_title"], json!("Third"));
    }

    #[tokio::test]
    async fn test_left_join_fans_out_on_duplicates() {
        let store = seeded();
        store
            .insert(
                "postmeta",
                row([
                    ("meta_id", json!(13)),
                    ("post_id", json!(1)),
                    ("meta_key", json!("color")),
                    ("meta_value", json!("crimson")),
                ]),
            )
            .unwrap();
        let query = SelectQuery::from("posts")
            .select_all("posts")
            .left_join(color_join("j0"))
            .where_eq(ColumnRef::new("posts", "ID"), 1);
        assert_eq!(store.select(&query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_distinct() {
        let store = seeded();
        let query = SelectQuery::from("postmeta")
            .distinct()
            .select_column(ColumnRef::new("postmeta", "meta_key"), None);
        let rows = store.select(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_raw_predicate_unsupported() {
        let store = seeded();
        let query = SelectQuery::from("posts").where_raw("ID > 1");
        let result = store.select(&query).await;
        assert!(matches!(
            result,
            Err(MasqError::Store(StoreError::Unsupported { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_column_reported() {
        let store = seeded();
        let query = SelectQuery::from("posts").select_column(ColumnRef::new("posts", "nope"), None);
        assert!(matches!(
            store.select(&query).await,
            Err(MasqError::Store(StoreError::ColumnNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_update_counts_and_logs() {
        let store = seeded();
        let update = UpdateStatement::new("postmeta")
            .set("meta_value", "blue")
            .where_eq("post_id", 1)
            .where_eq("meta_key", "color");
        assert_eq!(store.update(&update).await.unwrap(), 1);

        let missing = UpdateStatement::new("postmeta")
            .set("meta_value", "blue")
            .where_eq("post_id", 3)
            .where_eq("meta_key", "color");
        assert_eq!(store.update(&missing).await.unwrap(), 0);

        assert_eq!(store.executed_updates().unwrap().len(), 2);
        let rows = store.rows("postmeta").unwrap();
        assert_eq!(rows[0]["meta_value"], json!("blue"));
        assert_eq!(rows[2]["meta_value"], json!("green"));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = seeded();
        store.fail_updates_on("posts").unwrap();
        let update = UpdateStatement::new("posts").set("post_title", "x").where_eq("ID", 1);
        assert!(matches!(
            store.update(&update).await,
            Err(MasqError::Store(StoreError::QueryFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_introspection() {
        let store = seeded();
        assert!(store.has_table("postmeta").await.unwrap());
        assert!(!store.has_table("usermeta").await.unwrap());
        assert_eq!(
            store.list_columns("postmeta").await.unwrap(),
            vec!["meta_id", "post_id", "meta_key", "meta_value"]
        );
        assert!(store.list_columns("usermeta").await.unwrap().is_empty());
    }

    #[test]
    fn test_values_equal_semantics() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!("7"), &json!(7)));
        assert!(!values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&json!("a"), &json!("b")));
    }
}
