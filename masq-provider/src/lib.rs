//! MASQ Provider - Table Providers
//!
//! A table provider gives the masking pipeline a uniform view of one table:
//! which columns exist, a query yielding one row per entity, and write-back
//! by primary key.
//!
//! - [`SimpleTable`] serves a single physical table.
//! - [`MetaTableProvider`] adds the keys of a `<entity>meta` side table as
//!   virtual columns (WordPress `postmeta`, `usermeta`, `commentmeta`, ...).

pub mod eav;
pub mod simple;

pub use eav::{
    build_query, build_writes, meta_table_name, KeyCatalog, MetaLayer, MetaSchema,
    MetaTableProvider, MetaWrite, SchemaInfo, WritePlan,
};
pub use simple::{base_update, BaseTable, SimpleTable};

use async_trait::async_trait;
use masq_core::{ColumnConfig, MasqResult, ProviderClass, Row, SelectQuery, TableConfig, Value};
use masq_storage::Store;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Provider contract consumed by the masking pipeline.
///
/// `setup` must run once before anything else; calling it again is a no-op.
#[async_trait]
pub trait TableProvider: Send + Sync {
    /// Discover the schema and drop configured columns that do not exist.
    async fn setup(&mut self) -> MasqResult<()>;

    /// Table definition this provider serves.
    fn table(&self) -> &TableConfig;

    /// Configured columns that survived setup.
    fn columns(&self) -> &BTreeMap<String, ColumnConfig>;

    /// Primary key column, known after setup.
    fn primary_key(&self) -> MasqResult<&str>;

    /// Whether `name` can be read and written through this provider.
    fn column_exists(&self, name: &str) -> bool;

    /// Build a query yielding one row per entity with `requested` columns present.
    fn query(&self, requested: &[&str]) -> MasqResult<SelectQuery>;

    /// Execute a query built by [`TableProvider::query`].
    async fn fetch(&self, query: &SelectQuery) -> MasqResult<Vec<Row>>;

    /// Write `updates` back to the entity identified by `primary_key`.
    async fn update(&self, primary_key: &Value, updates: &Row) -> MasqResult<()>;
}

/// Construct the provider named by the table's `provider.class`.
pub fn provider_for(config: TableConfig, store: Arc<dyn Store>) -> Box<dyn TableProvider> {
    match config.provider.class {
        ProviderClass::Simple => Box::new(SimpleTable::new(config, store)),
        ProviderClass::WordpressMeta => Box::new(MetaTableProvider::new(config, store)),
    }
}
