//! Single-table provider.

use crate::TableProvider;
use async_trait::async_trait;
use masq_core::{
    ColumnConfig, ColumnRef, ConfigError, MasqResult, Row, SchemaError, SelectQuery, TableConfig,
    UpdateStatement, Value,
};
use masq_storage::Store;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Physical shape of the base table, discovered at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTable {
    pub name: String,
    pub primary_key: String,
    /// Physical columns in declared order
    pub columns: Vec<String>,
}

impl BaseTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Reads and writes one physical table.
pub struct SimpleTable {
    store: Arc<dyn Store>,
    config: TableConfig,
    base: Option<BaseTable>,
}

impl std::fmt::Debug for SimpleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleTable")
            .field("config", &self.config)
            .field("base", &self.base)
            .finish()
    }
}

impl SimpleTable {
    pub fn new(config: TableConfig, store: Arc<dyn Store>) -> Self {
        Self {
            store,
            config,
            base: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// The discovered base table, or `SchemaError::NotSetUp`.
    pub fn base(&self) -> MasqResult<&BaseTable> {
        self.base.as_ref().ok_or_else(|| {
            SchemaError::NotSetUp {
                table: self.config.name.clone(),
            }
            .into()
        })
    }

    /// Discover the table: existence, physical columns and primary key.
    ///
    /// Runs the store queries only once per instance.
    pub async fn introspect(&mut self) -> MasqResult<&BaseTable> {
        if self.base.is_none() {
            let base = self.discover().await?;
            tracing::info!(
                table = %base.name,
                primary_key = %base.primary_key,
                columns = base.columns.len(),
                "Discovered base table"
            );
            self.base = Some(base);
        }
        self.base()
    }

    async fn discover(&self) -> MasqResult<BaseTable> {
        self.config.validate()?;
        let name = self.config.name.clone();

        if !self.store.has_table(&name).await? {
            return Err(SchemaError::TableMissing { table: name }.into());
        }

        let columns = self.store.list_columns(&name).await?;

        let primary_key = match &self.config.pk {
            Some(pk) if columns.contains(pk) => pk.clone(),
            Some(pk) => {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.pk", name),
                    value: pk.clone(),
                    reason: "column does not exist".to_string(),
                }
                .into())
            }
            None => columns
                .first()
                .cloned()
                .ok_or_else(|| SchemaError::PrimaryKeyUndetermined {
                    table: name.clone(),
                })?,
        };

        Ok(BaseTable {
            name,
            primary_key,
            columns,
        })
    }

    /// Remove configured columns, warning for each one.
    pub fn drop_columns(&mut self, names: &[String]) {
        for name in names {
            if self.config.columns.remove(name).is_some() {
                tracing::warn!(
                    table = %self.config.name,
                    column = %name,
                    "Column does not exist; skipping"
                );
            }
        }
    }

    /// `SELECT * FROM table [WHERE <where>] ORDER BY pk`
    pub fn base_query(&self) -> MasqResult<SelectQuery> {
        let base = self.base()?;
        let mut query = SelectQuery::from(base.name.clone());
        if let Some(clause) = &self.config.where_clause {
            query = query.where_raw(clause.clone());
        }
        Ok(query.order_by(ColumnRef::new(base.name.clone(), base.primary_key.clone())))
    }

    /// One `UPDATE` covering all given fields, or `None` when there are none.
    pub fn update_statement<'a, I>(
        &self,
        primary_key: &Value,
        updates: I,
    ) -> MasqResult<Option<UpdateStatement>>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let base = self.base()?;
        Ok(base_update(&base.name, &base.primary_key, primary_key, updates))
    }
}

/// `UPDATE table SET <updates> WHERE pk_column = primary_key`, or `None` when
/// `updates` is empty.
pub fn base_update<'a, I>(
    table: &str,
    pk_column: &str,
    primary_key: &Value,
    updates: I,
) -> Option<UpdateStatement>
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    let statement = updates
        .into_iter()
        .fold(UpdateStatement::new(table), |s, (column, value)| {
            s.set(column.clone(), value.clone())
        });
    if statement.assignments.is_empty() {
        return None;
    }
    Some(statement.where_eq(pk_column, primary_key.clone()))
}

#[async_trait]
impl TableProvider for SimpleTable {
    async fn setup(&mut self) -> MasqResult<()> {
        if self.base.is_some() {
            tracing::debug!(table = %self.config.name, "Setup already done");
            return Ok(());
        }
        let base = self.introspect().await?.clone();
        let missing: Vec<String> = self
            .config
            .columns
            .keys()
            .filter(|c| !base.has_column(c))
            .cloned()
            .collect();
        self.drop_columns(&missing);
        Ok(())
    }

    fn table(&self) -> &TableConfig {
        &self.config
    }

    fn columns(&self) -> &BTreeMap<String, ColumnConfig> {
        &self.config.columns
    }

    fn primary_key(&self) -> MasqResult<&str> {
        Ok(self.base()?.primary_key.as_str())
    }

    fn column_exists(&self, name: &str) -> bool {
        self.base.as_ref().is_some_and(|b| b.has_column(name))
    }

    fn query(&self, _requested: &[&str]) -> MasqResult<SelectQuery> {
        self.base_query()
    }

    async fn fetch(&self, query: &SelectQuery) -> MasqResult<Vec<Row>> {
        self.store.select(query).await
    }

    async fn update(&self, primary_key: &Value, updates: &Row) -> MasqResult<()> {
        if let Some(statement) = self.update_statement(primary_key, updates)? {
            self.store.update(&statement).await?;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
