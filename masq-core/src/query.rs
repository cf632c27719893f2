//! SQL plans
//!
//! Queries and updates are built as plain data so that providers can be
//! tested without a database. Any `Store` executes them; `SqlRenderer` turns
//! them into parameterized SQL for real backends.

use crate::Value;
use std::collections::HashSet;

// ============================================================================
// PLAN TYPES
// ============================================================================

/// A column qualified by a table name or a join alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `table.*`
    AllColumns { table: String },
    /// `table.column [AS alias]`
    Column {
        column: ColumnRef,
        alias: Option<String>,
    },
}

impl SelectItem {
    /// Name under which this item appears in result rows (`None` for `table.*`).
    pub fn output_name(&self) -> Option<&str> {
        match self {
            SelectItem::AllColumns { .. } => None,
            SelectItem::Column { column, alias } => {
                Some(alias.as_deref().unwrap_or(column.column.as_str()))
            }
        }
    }
}

/// A condition inside a join's `ON` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// `left = right`
    Columns(ColumnRef, ColumnRef),
    /// `column = <literal>`, kept in the `ON` clause so unmatched rows survive
    Value(ColumnRef, Value),
}

/// `LEFT JOIN table AS alias ON ...`
#[derive(Debug, Clone, PartialEq)]
pub struct LeftJoin {
    pub table: String,
    pub alias: String,
    pub on: Vec<JoinCondition>,
}

impl LeftJoin {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            on: Vec::new(),
        }
    }

    pub fn on_columns(mut self, left: ColumnRef, right: ColumnRef) -> Self {
        self.on.push(JoinCondition::Columns(left, right));
        self
    }

    pub fn on_value(mut self, column: ColumnRef, value: impl Into<Value>) -> Self {
        self.on.push(JoinCondition::Value(column, value.into()));
        self
    }
}

/// A `WHERE` predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`
    Eq { column: ColumnRef, value: Value },
    /// Raw SQL fragment supplied by configuration
    Raw(String),
}

/// `SELECT [DISTINCT] ... FROM table [LEFT JOIN ...] [WHERE ...] [ORDER BY ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub distinct: bool,
    /// Empty means `*`.
    pub selects: Vec<SelectItem>,
    pub joins: Vec<LeftJoin>,
    pub filters: Vec<Predicate>,
    pub order_by: Vec<ColumnRef>,
}

impl SelectQuery {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            distinct: false,
            selects: Vec::new(),
            joins: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn select(mut self, item: SelectItem) -> Self {
        self.selects.push(item);
        self
    }

    pub fn select_all(self, table: impl Into<String>) -> Self {
        self.select(SelectItem::AllColumns {
            table: table.into(),
        })
    }

    pub fn select_column(self, column: ColumnRef, alias: Option<String>) -> Self {
        self.select(SelectItem::Column { column, alias })
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn left_join(mut self, join: LeftJoin) -> Self {
        self.joins.push(join);
        self
    }

    pub fn where_eq(mut self, column: ColumnRef, value: impl Into<Value>) -> Self {
        self.filters.push(Predicate::Eq {
            column,
            value: value.into(),
        });
        self
    }

    pub fn where_raw(mut self, sql: impl Into<String>) -> Self {
        self.filters.push(Predicate::Raw(sql.into()));
        self
    }

    pub fn order_by(mut self, column: ColumnRef) -> Self {
        self.order_by.push(column);
        self
    }

    /// Aliases of all joined tables, in join order.
    pub fn join_aliases(&self) -> Vec<&str> {
        self.joins.iter().map(|j| j.alias.as_str()).collect()
    }
}

/// `UPDATE table SET ... WHERE ...`
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub assignments: Vec<(String, Value)>,
    pub filters: Vec<Predicate>,
}

impl UpdateStatement {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = ColumnRef::new(self.table.clone(), column);
        self.filters.push(Predicate::Eq {
            column,
            value: value.into(),
        });
        self
    }

    /// Columns written by this statement.
    pub fn assigned_columns(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|(c, _)| c.as_str())
    }

    /// Value of an equality filter on `column`, if any.
    pub fn filter_value(&self, column: &str) -> Option<&Value> {
        self.filters.iter().find_map(|f| match f {
            Predicate::Eq { column: c, value } if c.column == column => Some(value),
            _ => None,
        })
    }
}

// ============================================================================
// SQL RENDERING
// ============================================================================

/// Rendered SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Quote an identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// Renders plans to PostgreSQL-flavored SQL with `$n` placeholders.
///
/// The storage prefix applies to physical table names only; join aliases are
/// emitted as-is.
#[derive(Debug, Clone, Default)]
pub struct SqlRenderer {
    table_prefix: String,
}

struct ParamSink {
    params: Vec<Value>,
}

impl ParamSink {
    fn push(&mut self, value: &Value) -> String {
        self.params.push(value.clone());
        format!("${}", self.params.len())
    }
}

impl SqlRenderer {
    pub fn new(table_prefix: impl Into<String>) -> Self {
        Self {
            table_prefix: table_prefix.into(),
        }
    }

    /// Physical name of a logical table.
    pub fn table_name(&self, logical: &str) -> String {
        format!("{}{}", self.table_prefix, logical)
    }

    fn qualifier(&self, name: &str, aliases: &HashSet<&str>) -> String {
        if aliases.contains(name) {
            quote_ident(name)
        } else {
            quote_ident(&self.table_name(name))
        }
    }

    fn column(&self, column: &ColumnRef, aliases: &HashSet<&str>) -> String {
        format!(
            "{}.{}",
            self.qualifier(&column.table, aliases),
            quote_ident(&column.column)
        )
    }

    fn predicates(
        &self,
        filters: &[Predicate],
        aliases: &HashSet<&str>,
        qualify: bool,
        sink: &mut ParamSink,
    ) -> Option<String> {
        if filters.is_empty() {
            return None;
        }
        let parts: Vec<String> = filters
            .iter()
            .map(|f| match f {
                Predicate::Eq { column, value } => {
                    let lhs = if qualify {
                        self.column(column, aliases)
                    } else {
                        quote_ident(&column.column)
                    };
                    format!("{} = {}", lhs, sink.push(value))
                }
                Predicate::Raw(sql) => format!("({})", sql),
            })
            .collect();
        Some(parts.join(" AND "))
    }

    /// Render a select plan.
    pub fn render_select(&self, query: &SelectQuery) -> Statement {
        let aliases: HashSet<&str> = query.joins.iter().map(|j| j.alias.as_str()).collect();
        let mut sink = ParamSink { params: Vec::new() };
        let mut sql = String::from("SELECT ");

        if query.distinct {
            sql.push_str("DISTINCT ");
        }

        if query.selects.is_empty() {
            sql.push('*');
        } else {
            let items: Vec<String> = query
                .selects
                .iter()
                .map(|item| match item {
                    SelectItem::AllColumns { table } => {
                        format!("{}.*", self.qualifier(table, &aliases))
                    }
                    SelectItem::Column { column, alias } => match alias {
                        Some(alias) => {
                            format!("{} AS {}", self.column(column, &aliases), quote_ident(alias))
                        }
                        None => self.column(column, &aliases),
                    },
                })
                .collect();
            sql.push_str(&items.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&quote_ident(&self.table_name(&query.table)));

        for join in &query.joins {
            let conditions: Vec<String> = join
                .on
                .iter()
                .map(|c| match c {
                    JoinCondition::Columns(left, right) => format!(
                        "{} = {}",
                        self.column(left, &aliases),
                        self.column(right, &aliases)
                    ),
                    JoinCondition::Value(column, value) => {
                        format!("{} = {}", self.column(column, &aliases), sink.push(value))
                    }
                })
                .collect();
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {}",
                quote_ident(&self.table_name(&join.table)),
                quote_ident(&join.alias),
                conditions.join(" AND ")
            ));
        }

        if let Some(filter) = self.predicates(&query.filters, &aliases, true, &mut sink) {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }

        if !query.order_by.is_empty() {
            let order: Vec<String> = query
                .order_by
                .iter()
                .map(|c| self.column(c, &aliases))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        Statement {
            sql,
            params: sink.params,
        }
    }

    /// Render an update plan. Callers never pass an update without assignments.
    pub fn render_update(&self, update: &UpdateStatement) -> Statement {
        let aliases = HashSet::new();
        let mut sink = ParamSink { params: Vec::new() };

        let assignments: Vec<String> = update
            .assignments
            .iter()
            .map(|(column, value)| format!("{} = {}", quote_ident(column), sink.push(value)))
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            quote_ident(&self.table_name(&update.table)),
            assignments.join(", ")
        );

        if let Some(filter) = self.predicates(&update.filters, &aliases, false, &mut sink) {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }

        Statement {
            sql,
            params: sink.params,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
