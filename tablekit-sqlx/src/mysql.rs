//! MySQL / MariaDB backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
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

/// [`Executor`] over an `sqlx` MySQL pool.
///
/// While a transaction is open every statement runs on its connection.
pub struct MySqlExecutor {
    pool: MySqlPool,
    tx: Mutex<Option<Transaction<'static, MySql>>>,
}

impl MySqlExecutor {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            tx: Mutex::new(None),
        }
    }

    pub async fn connect(options: &DatabaseOptions) -> Result<Self, DataError> {
        let url = options
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("database.url is required".into()))?;
        let pool = MySqlPoolOptions::new()
            .max_connections(options.max_connections)
            .connect(url)
            .await
            .map_err(|e| e.into_data_error().in_operation("connect"))?;
        info!(max_connections = options.max_connections, "MySQL pool opened");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

/// Connect and wrap the executor in a [`Database`].
pub async fn open(options: DatabaseOptions) -> Result<Database, DataError> {
    let executor = MySqlExecutor::connect(&options).await?;
    Ok(Database::new(executor, options))
}

#[async_trait]
impl Executor for MySqlExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
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
        let id = result.last_insert_id();
        Ok(Execution {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(id).ok().filter(|id| *id != 0),
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
        debug!("MySQL transaction opened");
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
        drop(self.tx.lock().await.take());
        self.pool.close().await;
    }
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => query.bind(i),
                (None, Some(u)) => query.bind(u),
                _ => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn decode_row(row: &MySqlRow) -> Result<Record, DataError> {
    let mut record = Record::new();
    for column in row.columns() {
        let i = column.ordinal();
        let kind = {
            let raw = row.try_get_raw(i).map_err(SqlxErrorExt::into_data_error)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };
        let value = match kind {
            None => Value::Null,
            Some(kind) => decode_value(row, i, &kind)?,
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn decode_value(row: &MySqlRow, i: usize, kind: &str) -> Result<Value, DataError> {
    fn get<'r, T: sqlx::Decode<'r, MySql>>(row: &'r MySqlRow, i: usize) -> Result<T, DataError> {
        row.try_get_unchecked(i).map_err(SqlxErrorExt::into_data_error)
    }

    let value = match kind {
        "BOOLEAN" => Value::Bool(get::<bool>(row, i)?),
        k if k.ends_with("UNSIGNED") => Value::from(get::<u64>(row, i)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Value::from(get::<i64>(row, i)?)
        }
        "FLOAT" | "DOUBLE" => Value::from(get::<f64>(row, i)?),
        "DATE" => serde_json::to_value(get::<NaiveDate>(row, i)?)?,
        "TIME" => serde_json::to_value(get::<NaiveTime>(row, i)?)?,
        "DATETIME" => serde_json::to_value(get::<NaiveDateTime>(row, i)?)?,
        "TIMESTAMP" => serde_json::to_value(get::<DateTime<Utc>>(row, i)?)?,
        "JSON" => {
            let text = get::<String>(row, i)?;
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => Value::from(get::<Vec<u8>>(row, i)?),
        // DECIMAL keeps its exact digits; CHAR/VARCHAR/TEXT/ENUM/SET are text.
        _ => Value::String(get::<String>(row, i)?),
    };
    Ok(value)
}
