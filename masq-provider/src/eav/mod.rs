//! Entity-attribute-value provider.
//!
//! A base table `posts` may be paired with a side table `postmeta` holding
//! `(meta_id, post_id, meta_key, meta_value)` rows. Every distinct `meta_key`
//! becomes a virtual column of `posts`: reads join it in with a `LEFT JOIN`
//! per requested key and writes are routed back to the matching meta row.
//!
//! Whether a column is physical or virtual is decided in one place,
//! [`SchemaInfo::is_physical`], which both the projection and the write
//! routing consult.

pub mod keys;
pub mod projection;
pub mod schema;
pub mod writes;

pub use keys::KeyCatalog;
pub use projection::build_query;
pub use schema::{meta_table_name, resolve, MetaSchema};
pub use writes::{build_writes, MetaWrite, WritePlan};

use crate::{BaseTable, SimpleTable, TableProvider};
use async_trait::async_trait;
use masq_core::{
    ColumnConfig, MasqResult, Row, SchemaError, SelectQuery, StorageKind, TableConfig, Value,
};
use masq_storage::Store;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// SCHEMA SNAPSHOT
// ============================================================================

/// Resolved meta table plus the keys it held at setup.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaLayer {
    pub schema: MetaSchema,
    pub keys: KeyCatalog,
}

/// Everything the projection and write routing need, frozen at setup.
#[derive(Debug, Clone)]
pub struct SchemaInfo {
    pub table: String,
    pub primary_key: String,
    physical: HashSet<String>,
    declared: HashMap<String, StorageKind>,
    meta: Option<MetaLayer>,
}

impl SchemaInfo {
    pub fn new(
        base: &BaseTable,
        columns: &BTreeMap<String, ColumnConfig>,
        meta: Option<MetaLayer>,
    ) -> Self {
        Self {
            table: base.name.clone(),
            primary_key: base.primary_key.clone(),
            physical: base.columns.iter().cloned().collect(),
            declared: columns
                .iter()
                .filter_map(|(name, c)| c.backend_type.map(|kind| (name.clone(), kind)))
                .collect(),
            meta,
        }
    }

    pub fn meta(&self) -> Option<&MetaLayer> {
        self.meta.as_ref()
    }

    /// Whether reads and writes of `column` go to the base table.
    ///
    /// A declared storage kind wins. Undeclared columns are physical when the
    /// base table has them, virtual when the meta table holds the key, and
    /// physical otherwise. Without a meta layer everything is physical.
    pub fn is_physical(&self, column: &str) -> bool {
        let Some(meta) = &self.meta else {
            return true;
        };
        match self.declared.get(column) {
            Some(kind) => kind.is_static(),
            None => self.physical.contains(column) || !meta.keys.contains(column),
        }
    }

    /// Base column or known meta key.
    pub fn column_exists(&self, column: &str) -> bool {
        self.physical.contains(column)
            || self
                .meta
                .as_ref()
                .is_some_and(|meta| meta.keys.contains(column))
    }
}

// ============================================================================
// PROVIDER
// ============================================================================

/// Base table with its meta keys exposed as extra columns.
///
/// When the meta table is missing the provider serves the base table alone.
#[derive(Debug)]
pub struct MetaTableProvider {
    base: SimpleTable,
    schema: Option<SchemaInfo>,
}

impl MetaTableProvider {
    pub fn new(config: TableConfig, store: Arc<dyn Store>) -> Self {
        Self {
            base: SimpleTable::new(config, store),
            schema: None,
        }
    }

    /// The frozen schema, or `SchemaError::NotSetUp`.
    pub fn schema(&self) -> MasqResult<&SchemaInfo> {
        self.schema.as_ref().ok_or_else(|| {
            SchemaError::NotSetUp {
                table: self.base.config().name.clone(),
            }
            .into()
        })
    }

    /// Statements an `update` call would execute, without running them.
    pub fn plan_writes(&self, primary_key: &Value, updates: &Row) -> MasqResult<WritePlan> {
        Ok(build_writes(self.schema()?, primary_key, updates))
    }

    async fn load_meta(&self, base: &BaseTable) -> MasqResult<Option<MetaLayer>> {
        let store = self.base.store().as_ref();
        let id_field = self.base.config().provider.id_field.as_deref();

        let Some(schema) = resolve(store, &base.name, id_field).await? else {
            return Ok(None);
        };
        let keys = KeyCatalog::load(store, &schema.table).await?;

        tracing::info!(
            table = %base.name,
            meta = %schema.table,
            entity_column = %schema.entity_column,
            keys = keys.len(),
            "Attached meta table"
        );
        Ok(Some(MetaLayer { schema, keys }))
    }
}

#[async_trait]
impl TableProvider for MetaTableProvider {
    async fn setup(&mut self) -> MasqResult<()> {
        if self.schema.is_some() {
            tracing::debug!(table = %self.base.config().name, "Setup already done");
            return Ok(());
        }

        let base = self.base.introspect().await?.clone();
        let meta = self.load_meta(&base).await?;
        let schema = SchemaInfo::new(&base, &self.base.config().columns, meta);

        let missing: Vec<String> = self
            .base
            .config()
            .columns
            .keys()
            .filter(|c| !schema.column_exists(c))
            .cloned()
            .collect();
        self.base.drop_columns(&missing);

        self.schema = Some(schema);
        Ok(())
    }

    fn table(&self) -> &TableConfig {
        self.base.config()
    }

    fn columns(&self) -> &BTreeMap<String, ColumnConfig> {
        &self.base.config().columns
    }

    fn primary_key(&self) -> MasqResult<&str> {
        Ok(self.schema()?.primary_key.as_str())
    }

    fn column_exists(&self, name: &str) -> bool {
        self.schema
            .as_ref()
            .is_some_and(|schema| schema.column_exists(name))
    }

    fn query(&self, requested: &[&str]) -> MasqResult<SelectQuery> {
        let schema = self.schema()?;
        let query = build_query(schema, self.base.base_query()?, requested.iter().copied());
        tracing::debug!(
            table = %schema.table,
            joins = query.joins.len(),
            "Built projection"
        );
        Ok(query)
    }

    async fn fetch(&self, query: &SelectQuery) -> MasqResult<Vec<Row>> {
        self.base.store().select(query).await
    }

    async fn update(&self, primary_key: &Value, updates: &Row) -> MasqResult<()> {
        let plan = self.plan_writes(primary_key, updates)?;
        writes::execute(self.base.store().as_ref(), &plan).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
