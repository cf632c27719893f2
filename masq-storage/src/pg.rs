//! PostgreSQL Store Module
//!
//! Connection pooling through deadpool-postgres. Plans are rendered by
//! `SqlRenderer`, prepared, and their parameters converted to the types the
//! server expects for each placeholder, so JSON cell values can target
//! integer, boolean or text columns alike.

use crate::Store;
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use masq_core::{
    MasqError, MasqResult, Row, SelectQuery, SqlRenderer, Statement, StoreConfig, StoreError,
    UpdateStatement, Value,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::NoTls;
use uuid::Uuid;

type Param = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
    renderer: SqlRenderer,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool_size", &self.pool.status().size)
            .field("renderer", &self.renderer)
            .finish()
    }
}

/// Create a connection pool from a store configuration.
pub fn create_pool(config: &StoreConfig) -> MasqResult<Pool> {
    config.validate()?;

    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.connect_timeout = Some(config.timeout);

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_size));

    cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
        StoreError::ConnectionFailed {
            reason: format!("Failed to create pool: {}", e),
        }
        .into()
    })
}

fn query_error(statement: &str, err: tokio_postgres::Error) -> MasqError {
    tracing::error!(error = ?err, statement, "Database error");
    StoreError::QueryFailed {
        statement: statement.to_string(),
        reason: err.to_string(),
    }
    .into()
}

impl PgStore {
    /// Create a store over an existing pool.
    pub fn new(pool: Pool, table_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            renderer: SqlRenderer::new(table_prefix),
        }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &StoreConfig) -> MasqResult<Self> {
        let pool = create_pool(config)?;
        Ok(Self::new(pool, config.table_prefix.clone()))
    }

    /// The renderer used for every statement.
    pub fn renderer(&self) -> &SqlRenderer {
        &self.renderer
    }

    async fn get_conn(&self) -> MasqResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|err| {
            tracing::error!(error = ?err, "Connection pool error");
            StoreError::ConnectionFailed {
                reason: err.to_string(),
            }
            .into()
        })
    }

    async fn run_select(&self, statement: &Statement) -> MasqResult<Vec<Row>> {
        let conn = self.get_conn().await?;
        let prepared = conn
            .prepare_cached(&statement.sql)
            .await
            .map_err(|e| query_error(&statement.sql, e))?;
        let params = bind_params(&statement.params, prepared.params())?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = conn
            .query(&prepared, &refs)
            .await
            .map_err(|e| query_error(&statement.sql, e))?;

        rows.iter().map(|r| decode_row(&statement.sql, r)).collect()
    }

    async fn run_execute(&self, statement: &Statement) -> MasqResult<u64> {
        let conn = self.get_conn().await?;
        let prepared = conn
            .prepare_cached(&statement.sql)
            .await
            .map_err(|e| query_error(&statement.sql, e))?;
        let params = bind_params(&statement.params, prepared.params())?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        conn.execute(&prepared, &refs)
            .await
            .map_err(|e| query_error(&statement.sql, e))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn has_table(&self, table: &str) -> MasqResult<bool> {
        const SQL: &str = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                           WHERE table_schema = current_schema() AND table_name = $1::text)";
        let conn = self.get_conn().await?;
        let physical = self.renderer.table_name(table);
        let row = conn
            .query_one(SQL, &[&physical])
            .await
            .map_err(|e| query_error(SQL, e))?;
        row.try_get::<_, bool>(0).map_err(|e| query_error(SQL, e))
    }

    async fn list_columns(&self, table: &str) -> MasqResult<Vec<String>> {
        const SQL: &str = "SELECT column_name::text FROM information_schema.columns \
                           WHERE table_schema = current_schema() AND table_name = $1::text \
                           ORDER BY ordinal_position";
        let conn = self.get_conn().await?;
        let physical = self.renderer.table_name(table);
        let rows = conn
            .query(SQL, &[&physical])
            .await
            .map_err(|e| query_error(SQL, e))?;
        rows.iter()
            .map(|r| r.try_get::<_, String>(0).map_err(|e| query_error(SQL, e)))
            .collect()
    }

    async fn select(&self, query: &SelectQuery) -> MasqResult<Vec<Row>> {
        let statement = self.renderer.render_select(query);
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "select");
        self.run_select(&statement).await
    }

    async fn update(&self, update: &UpdateStatement) -> MasqResult<u64> {
        let statement = self.renderer.render_update(update);
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "update");
        self.run_execute(&statement).await
    }

    async fn health_check(&self) -> MasqResult<bool> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[])
            .await
            .map(|_| true)
            .map_err(|e| query_error("SELECT 1", e))
    }
}

// ============================================================================
// PARAMETER BINDING
// ============================================================================

fn bind_params(values: &[Value], types: &[Type]) -> MasqResult<Vec<Param>> {
    values
        .iter()
        .zip(types.iter())
        .enumerate()
        .map(|(i, (value, ty))| to_param(i + 1, value, ty))
        .collect()
}

fn invalid(index: usize, value: &Value, ty: &Type) -> MasqError {
    StoreError::InvalidParameter {
        index,
        reason: format!("cannot bind {} as {}", value, ty),
    }
    .into()
}

fn as_i64(value: &Value) -> Option<Option<i64>> {
    match value {
        Value::Null => Some(None),
        Value::Number(n) => n.as_i64().map(Some),
        Value::String(s) => s.trim().parse().ok().map(Some),
        Value::Bool(b) => Some(Some(i64::from(*b))),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<Option<f64>> {
    match value {
        Value::Null => Some(None),
        Value::Number(n) => n.as_f64().map(Some),
        Value::String(s) => s.trim().parse().ok().map(Some),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<Option<bool>> {
    match value {
        Value::Null => Some(None),
        Value::Bool(b) => Some(Some(*b)),
        Value::Number(n) => n.as_i64().map(|n| Some(n != 0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(Some(true)),
            "false" | "f" | "0" => Some(Some(false)),
            _ => None,
        },
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Option<Decimal>> {
    match value {
        Value::Null => Some(None),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok()
            .map(Some),
        Value::String(s) => Decimal::from_str(s.trim()).ok().map(Some),
        _ => None,
    }
}

/// NULL, or a string accepted by `parse`.
fn as_parsed<T>(value: &Value, parse: impl Fn(&str) -> Option<T>) -> Option<Option<T>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) => parse(s.trim()).map(Some),
        _ => None,
    }
}

// Text forms below are the ones `decode_value` produces, so read values bind back.

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|t| t.with_timezone(&Utc))
        .ok()
        // Offset-less input is taken as UTC
        .or_else(|| parse_timestamp(s).map(|t| t.and_utc()))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Convert a cell value to the Rust type accepted for `ty`.
fn to_param(index: usize, value: &Value, ty: &Type) -> MasqResult<Param> {
    let param: Param = if *ty == Type::BOOL {
        Box::new(as_bool(value).ok_or_else(|| invalid(index, value, ty))?)
    } else if *ty == Type::INT2 {
        let n = as_i64(value).ok_or_else(|| invalid(index, value, ty))?;
        let n = n
            .map(i16::try_from)
            .transpose()
            .map_err(|_| invalid(index, value, ty))?;
        Box::new(n)
    } else if *ty == Type::INT4 {
        let n = as_i64(value).ok_or_else(|| invalid(index, value, ty))?;
        let n = n
            .map(i32::try_from)
            .transpose()
            .map_err(|_| invalid(index, value, ty))?;
        Box::new(n)
    } else if *ty == Type::INT8 {
        Box::new(as_i64(value).ok_or_else(|| invalid(index, value, ty))?)
    } else if *ty == Type::FLOAT4 {
        let f = as_f64(value).ok_or_else(|| invalid(index, value, ty))?;
        Box::new(f.map(|f| f as f32))
    } else if *ty == Type::FLOAT8 {
        Box::new(as_f64(value).ok_or_else(|| invalid(index, value, ty))?)
    } else if *ty == Type::NUMERIC {
        Box::new(as_decimal(value).ok_or_else(|| invalid(index, value, ty))?)
    } else if *ty == Type::TIMESTAMP {
        Box::new(as_parsed(value, parse_timestamp).ok_or_else(|| invalid(index, value, ty))?)
    } else if *ty == Type::TIMESTAMPTZ {
        Box::new(as_parsed(value, parse_timestamptz).ok_or_else(|| invalid(index, value, ty))?)
    } else if *ty == Type::DATE {
        Box::new(as_parsed(value, parse_date).ok_or_else(|| invalid(index, value, ty))?)
    } else if *ty == Type::UUID {
        let uuid = as_parsed(value, |s| Uuid::parse_str(s).ok());
        Box::new(uuid.ok_or_else(|| invalid(index, value, ty))?)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        let json = match value {
            Value::Null => None,
            other => Some(other.clone()),
        };
        Box::new(json)
    } else if *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
        || *ty == Type::UNKNOWN
    {
        Box::new(as_text(value))
    } else {
        return Err(StoreError::InvalidParameter {
            index,
            reason: format!("unsupported parameter type {}", ty),
        }
        .into());
    };
    Ok(param)
}

// ============================================================================
// ROW DECODING
// ============================================================================

fn decode_row(statement: &str, row: &tokio_postgres::Row) -> MasqResult<Row> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_value(statement, row, idx, column.name(), column.type_())?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_value(
    statement: &str,
    row: &tokio_postgres::Row,
    idx: usize,
    name: &str,
    ty: &Type,
) -> MasqResult<Value> {
    let err = |e| query_error(statement, e);

    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx).map_err(err)?.map(Value::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx).map_err(err)?.map(Value::from)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx).map_err(err)?.map(Value::from)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx).map_err(err)?.map(Value::from)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx).map_err(err)?.map(|f| Value::from(f64::from(f)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx).map_err(err)?.map(Value::from)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<Value>>(idx).map_err(err)?
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
        row.try_get::<_, Option<String>>(idx).map_err(err)?.map(Value::String)
    } else if *ty == Type::NUMERIC {
        // As text, so no precision is lost to f64
        row.try_get::<_, Option<Decimal>>(idx)
            .map_err(err)?
            .map(|d| Value::String(d.to_string()))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(idx)
            .map_err(err)?
            .map(|t| Value::String(t.to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(idx)
            .map_err(err)?
            .map(|t| Value::String(t.to_rfc3339()))
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(idx)
            .map_err(err)?
            .map(|d| Value::String(d.to_string()))
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<Uuid>>(idx)
            .map_err(err)?
            .map(|u| Value::String(u.to_string()))
    } else {
        return Err(StoreError::UnsupportedType {
            column: name.to_string(),
            type_name: ty.name().to_string(),
        }
        .into());
    };

    Ok(value.unwrap_or(Value::Null))
}

// ============================================================================
// TESTS
// ============================================================================
