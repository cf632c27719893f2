//! MASQ Storage - Store Trait and Backends
//!
//! Defines the store handle consumed by the table providers: schema
//! introspection plus execution of select and update plans.
//! `MockStore` evaluates plans in memory; `PgStore` talks to PostgreSQL.

pub mod mock;
pub mod pg;

pub use mock::MockStore;
pub use pg::PgStore;

use async_trait::async_trait;
use masq_core::{MasqResult, Row, SelectQuery, UpdateStatement};

/// Store handle for table providers.
///
/// Table names passed in are logical; backends apply their storage prefix.
/// Errors are returned as-is to the caller; implementations do not retry.
#[async_trait]
pub trait Store: Send + Sync {
    // ========================================================================
    // SCHEMA INTROSPECTION
    // ========================================================================

    /// Whether the table exists.
    async fn has_table(&self, table: &str) -> MasqResult<bool>;

    /// Column names of a table, in declared order.
    async fn list_columns(&self, table: &str) -> MasqResult<Vec<String>>;

    // ========================================================================
    // EXECUTION
    // ========================================================================

    /// Execute a select plan.
    async fn select(&self, query: &SelectQuery) -> MasqResult<Vec<Row>>;

    /// Execute an update plan, returning the number of rows affected.
    async fn update(&self, update: &UpdateStatement) -> MasqResult<u64>;

    /// Check if the store is reachable.
    async fn health_check(&self) -> MasqResult<bool>;
}
