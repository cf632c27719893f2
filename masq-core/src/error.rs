//! Error types for MASQ operations

use thiserror::Error;

/// Store layer errors. Raised by backends and propagated to callers untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Query failed: {reason} (statement: {statement})")]
    QueryFailed { statement: String, reason: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    #[error("Unsupported column type {type_name} for column {column}")]
    UnsupportedType { column: String, type_name: String },

    #[error("Invalid parameter ${index}: {reason}")]
    InvalidParameter { index: usize, reason: String },

    #[error("Unsupported by this store: {feature}")]
    Unsupported { feature: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configured id_field {id_field} does not exist in meta table {meta_table}")]
    UnknownIdField { meta_table: String, id_field: String },

    #[error("YAML parse error: {reason}")]
    YamlParse { reason: String },
}

/// Schema discovery errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Table {table} does not exist")]
    TableMissing { table: String },

    #[error("Could not determine primary key of table {table}")]
    PrimaryKeyUndetermined { table: String },

    #[error("Provider for table {table} used before setup")]
    NotSetUp { table: String },
}

/// Master error type for all MASQ errors.
#[derive(Debug, Clone, Error)]
pub enum MasqError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Result type alias for MASQ operations.
pub type MasqResult<T> = Result<T, MasqError>;

// =============================================================================
// TESTS
// =============================================================================
