//! SQLite backend.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Transaction, TypeInfo, ValueRef};
use tablekit::{
    ConfigError, DataError, Database, DatabaseOptions, Dialect, Execution, Executor, Params,
    Record,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bind::expand;
use crate::error::SqlxErrorExt;
use crate::timeout::with_timeout;

/// [`Executor`] over an `sqlx` SQLite pool.
///
/// While a transaction is open every statement runs on its connection.
pub struct SqliteExecutor {
    pool: SqlitePool,
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            tx: Mutex::new(None),
        }
    }

    /// Open a pool for `options.url`.
    ///
    /// In-memory databases get a single connection that is never recycled,
    /// since each connection would otherwise see its own empty database.
    pub async fn connect(options: &DatabaseOptions) -> Result<Self, DataError> {
        let url = options
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("database.url is required".into()))?;
        let mut pool = SqlitePoolOptions::new().max_connections(options.max_connections);
        if is_memory(url) {
            pool = pool
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool
            .connect(url)
            .await
            .map_err(|e| e.into_data_error().in_operation("connect"))?;
        info!(url, "SQLite pool opened");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Connect and wrap the executor in a [`Database`].
pub async fn open(options: DatabaseOptions) -> Result<Database, DataError> {
    let executor = SqliteExecutor::connect(&options).await?;
    Ok(Database::new(executor, options))
}

fn is_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[async_trait]
impl Executor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(
        &self,
        sql: &str,
        params: &Params,
        timeout: Option<Duration>,
    ) -> Result<Execution, DataError> {
        let expanded = expand(sql, params);
        let query = bind_all(sqlx::query(&expanded.sql), &expanded.values);
        let mut tx = self.tx.lock().await;
        let result = with_timeout(timeout, async {
            match tx.as_mut() {
                Some(tx) => query.execute(&mut **tx).await,
                None => query.execute(&self.pool).await,
            }
        })
        .await?
        .map_err(SqlxErrorExt::into_data_error)?;
        let rowid = result.last_insert_rowid();
        Ok(Execution {
            rows_affected: result.rows_affected(),
            last_insert_id: (rowid != 0).then_some(rowid),
        })
    }

    async fn query(
        &self,
        sql: &str,
        params: &Params,
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>, DataError> {
        let expanded = expand(sql, params);
        let query = bind_all(sqlx::query(&expanded.sql), &expanded.values);
        let mut tx = self.tx.lock().await;
        let rows = with_timeout(timeout, async {
            match tx.as_mut() {
                Some(tx) => query.fetch_all(&mut **tx).await,
                None => query.fetch_all(&self.pool).await,
            }
        })
        .await?
        .map_err(SqlxErrorExt::into_data_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn begin(&self) -> Result<(), DataError> {
        let mut tx = self.tx.lock().await;
        if tx.is_some() {
            return Err(DataError::invalid("a transaction is already open"));
        }
        *tx = Some(self.pool.begin().await.map_err(SqlxErrorExt::into_data_error)?);
        debug!("SQLite transaction opened");
        Ok(())
    }

    async fn commit(&self) -> Result<(), DataError> {
        let tx = self.tx.lock().await.take().ok_or(DataError::NoTransaction)?;
        tx.commit().await.map_err(SqlxErrorExt::into_data_error)
    }

    async fn rollback(&self) -> Result<(), DataError> {
        let tx = self.tx.lock().await.take().ok_or(DataError::NoTransaction)?;
        tx.rollback().await.map_err(SqlxErrorExt::into_data_error)
    }

    async fn in_transaction(&self) -> bool {
        self.tx.lock().await.is_some()
    }

    async fn close(&self) {
        // Dropping an open transaction rolls it back when the connection is returned.
        drop(self.tx.lock().await.take());
        self.pool.close().await;
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => query.bind(i),
                // SQLite integers are signed 64-bit; larger values keep their digits as text.
                (None, Some(u)) => query.bind(u.to_string()),
                _ => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<Record, DataError> {
    let mut record = Record::new();
    for column in row.columns() {
        let i = column.ordinal();
        let storage = {
            let raw = row.try_get_raw(i).map_err(SqlxErrorExt::into_data_error)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };
        let value = match storage.as_deref() {
            None => Value::Null,
            Some("INTEGER") => {
                let n: i64 = row.try_get_unchecked(i).map_err(SqlxErrorExt::into_data_error)?;
                if column.type_info().name() == "BOOLEAN" {
                    Value::Bool(n != 0)
                } else {
                    Value::from(n)
                }
            }
            Some("REAL") => {
                let f: f64 = row.try_get_unchecked(i).map_err(SqlxErrorExt::into_data_error)?;
                Value::from(f)
            }
            Some("BLOB") => {
                let bytes: Vec<u8> =
                    row.try_get_unchecked(i).map_err(SqlxErrorExt::into_data_error)?;
                Value::from(bytes)
            }
            Some(_) => {
                let text: String =
                    row.try_get_unchecked(i).map_err(SqlxErrorExt::into_data_error)?;
                Value::String(text)
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}
