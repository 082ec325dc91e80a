use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::DatabaseOptions;
use crate::dialect::Dialect;
use crate::error::DataError;
use crate::executor::{Execution, Executor, Record};
use crate::naming::{self, Caches};
use crate::page::{self, Page, Pageable};
use crate::params::{Args, IntoArgs, Params};
use crate::statement::Statement;
use crate::table::Table;

/// A set of tables composed over one database.
///
/// Implement this for a struct holding one [`Table`] per entity and obtain it
/// with [`Database::schema`]:
///
/// ```ignore
/// struct Campus {
///     profiles: Table<Profile>,
///     faculties: Table<Faculty>,
/// }
///
/// impl Schema for Campus {
///     fn from_database(db: &Database) -> Self {
///         Self {
///             profiles: db.table("profiles"),
///             faculties: db.table("faculties"),
///         }
///     }
/// }
/// ```
pub trait Schema: Sized {
    fn from_database(db: &Database) -> Self;
}

/// Handle over one execution primitive: raw SQL, pagination, transactions
/// and the factory for [`Table`] handles.
///
/// Clones share the executor, the caches and the disposed flag.
#[derive(Clone)]
pub struct Database {
    executor: Arc<dyn Executor>,
    options: Arc<DatabaseOptions>,
    caches: Arc<Caches>,
    disposed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.executor.dialect())
            .field("options", &self.options)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Database {
    pub fn new(executor: impl Executor + 'static, options: DatabaseOptions) -> Self {
        Self::from_arc(Arc::new(executor), options)
    }

    pub fn from_arc(executor: Arc<dyn Executor>, options: DatabaseOptions) -> Self {
        Self {
            executor,
            options: Arc::new(options),
            caches: Caches::global(),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use `caches` instead of the process-wide ones.
    pub fn with_caches(mut self, caches: Arc<Caches>) -> Self {
        self.caches = caches;
        self
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    pub fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    pub fn caches(&self) -> &Arc<Caches> {
        &self.caches
    }

    /// Table of `T` keyed by an `i64` id.
    pub fn table<T>(&self, likely_name: impl Into<String>) -> Table<T> {
        Table::new(self.clone(), likely_name.into())
    }

    pub fn table_with_id<T, Id>(&self, likely_name: impl Into<String>) -> Table<T, Id> {
        Table::new(self.clone(), likely_name.into())
    }

    pub fn schema<S: Schema>(&self) -> S {
        S::from_database(self)
    }

    /// Run a statement, returning the affected row count.
    pub async fn execute(&self, sql: &str, params: impl IntoArgs) -> Result<u64, DataError> {
        let params = self.bind(params)?;
        let done = self.run("execute", None, &Statement::new(sql, params)).await?;
        Ok(done.rows_affected)
    }

    pub async fn query<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl IntoArgs,
    ) -> Result<Vec<T>, DataError> {
        let params = self.bind(params)?;
        let rows = self.fetch("query", None, &Statement::new(sql, params)).await?;
        decode_all(rows)
    }

    pub async fn query_first<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl IntoArgs,
    ) -> Result<Option<T>, DataError> {
        let params = self.bind(params)?;
        let rows = self
            .fetch("query_first", None, &Statement::new(sql, params))
            .await?;
        rows.into_iter().next().map(decode).transpose()
    }

    /// First column of the first row, `None` when the query yields no rows.
    pub async fn query_scalar<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl IntoArgs,
    ) -> Result<Option<T>, DataError> {
        let params = self.bind(params)?;
        let rows = self
            .fetch("query_scalar", None, &Statement::new(sql, params))
            .await?;
        match rows.into_iter().next().and_then(first_column) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool, DataError> {
        self.ensure_open()?;
        naming::table_exists(self.executor.as_ref(), table).await
    }

    /// Page through an arbitrary SELECT.
    ///
    /// Runs a derived `COUNT` query, then `sql` with `LIMIT @limit OFFSET @offset`
    /// appended. `sql` must not carry its own `LIMIT`.
    pub async fn paginate<T: DeserializeOwned>(
        &self,
        sql: &str,
        page: u32,
        items_per_page: u32,
        params: impl IntoArgs,
    ) -> Result<Page<T>, DataError> {
        self.paginate_with(sql, page, items_per_page, params, decode)
            .await
    }

    /// [`paginate`](Self::paginate) with a caller-supplied row mapping.
    pub async fn paginate_with<T, F>(
        &self,
        sql: &str,
        page: u32,
        items_per_page: u32,
        params: impl IntoArgs,
        map: F,
    ) -> Result<Page<T>, DataError>
    where
        F: FnMut(Record) -> Result<T, DataError>,
    {
        let pageable = Pageable::new(page, items_per_page)?;
        let params = self.bind(params)?;
        self.paginate_bound("paginate", None, sql, pageable, &params, map)
            .await
    }

    pub(crate) async fn paginate_bound<T, F>(
        &self,
        op: &str,
        table: Option<&str>,
        sql: &str,
        pageable: Pageable,
        params: &Params,
        map: F,
    ) -> Result<Page<T>, DataError>
    where
        F: FnMut(Record) -> Result<T, DataError>,
    {
        let count = pageable.count_statement(sql, params)?;
        let rows = self.fetch(&format!("{op}.count"), table, &count).await?;
        let total = page::total_from(rows.first().and_then(|row| row.values().next()))?;
        let info = pageable.info(total);

        let window = pageable.window_statement(sql, params);
        let rows = self.fetch(&format!("{op}.items"), table, &window).await?;
        let items = rows.into_iter().map(map).collect::<Result<Vec<_>, _>>()?;
        Ok(info.with_items(items))
    }

    pub async fn begin_transaction(&self) -> Result<(), DataError> {
        self.ensure_open()?;
        if self.executor.in_transaction().await {
            return Err(DataError::invalid("a transaction is already open"));
        }
        self.executor.begin().await.map_err(|e| e.in_operation("begin"))?;
        info!("Transaction started");
        Ok(())
    }

    pub async fn commit(&self) -> Result<(), DataError> {
        self.ensure_open()?;
        if !self.executor.in_transaction().await {
            return Err(DataError::NoTransaction);
        }
        self.executor.commit().await.map_err(|e| e.in_operation("commit"))?;
        info!("Transaction committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<(), DataError> {
        self.ensure_open()?;
        if !self.executor.in_transaction().await {
            return Err(DataError::NoTransaction);
        }
        self.executor
            .rollback()
            .await
            .map_err(|e| e.in_operation("rollback"))?;
        info!("Transaction rolled back");
        Ok(())
    }

    pub async fn in_transaction(&self) -> bool {
        !self.is_disposed() && self.executor.in_transaction().await
    }

    /// Roll back any open transaction and close the executor.
    ///
    /// A failing rollback is logged and does not prevent the close. Disposing
    /// twice is a no-op.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.executor.in_transaction().await {
            if let Err(err) = self.executor.rollback().await {
                warn!(error = %err, "Rollback during dispose failed");
            }
        }
        self.executor.close().await;
        info!("Database disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), DataError> {
        if self.is_disposed() {
            return Err(DataError::Closed);
        }
        Ok(())
    }

    /// Names of `args`, through the parameter-name cache.
    pub(crate) fn names(&self, args: &Args) -> Arc<[String]> {
        self.caches.params.resolve(args)
    }

    fn bind(&self, params: impl IntoArgs) -> Result<Params, DataError> {
        let args = params.into_args()?;
        Ok(args.to_params(&self.names(&args)))
    }

    pub(crate) async fn run(
        &self,
        op: &str,
        table: Option<&str>,
        stmt: &Statement,
    ) -> Result<Execution, DataError> {
        self.ensure_open()?;
        debug!(operation = op, table, sql = %stmt.sql, "Executing statement");
        self.executor
            .execute(&stmt.sql, &stmt.params, self.options.command_timeout())
            .await
            .map_err(|e| e.in_operation(op))
    }

    pub(crate) async fn fetch(
        &self,
        op: &str,
        table: Option<&str>,
        stmt: &Statement,
    ) -> Result<Vec<Record>, DataError> {
        self.ensure_open()?;
        debug!(operation = op, table, sql = %stmt.sql, "Running query");
        self.executor
            .query(&stmt.sql, &stmt.params, self.options.command_timeout())
            .await
            .map_err(|e| e.in_operation(op))
    }
}

pub(crate) fn decode<T: DeserializeOwned>(row: Record) -> Result<T, DataError> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

pub(crate) fn decode_all<T: DeserializeOwned>(rows: Vec<Record>) -> Result<Vec<T>, DataError> {
    rows.into_iter().map(decode).collect()
}

pub(crate) fn first_column(row: Record) -> Option<Value> {
    row.into_iter().next().map(|(_, value)| value)
}

/// Bag holding a single named value.
pub(crate) fn single(name: &str, value: impl Serialize) -> Result<Params, DataError> {
    Params::new().try_with(name, value)
}
