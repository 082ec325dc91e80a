//! Synchronous mirror of [`Database`] and [`Table`].
//!
//! Every call drives the async operation to completion on an owned tokio
//! runtime, so these types must not be used from inside an async context.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Runtime;

use crate::config::DatabaseOptions;
use crate::database::Database;
use crate::dialect::Dialect;
use crate::error::DataError;
use crate::executor::Record;
use crate::page::Page;
use crate::params::IntoArgs;
use crate::table::Table;

/// Blocking handle over a [`Database`].
#[derive(Debug, Clone)]
pub struct BlockingDatabase {
    runtime: Arc<Runtime>,
    db: Database,
}

impl BlockingDatabase {
    /// Wrap a database whose executor was created on `runtime`.
    pub fn new(runtime: Arc<Runtime>, db: Database) -> Self {
        Self { runtime, db }
    }

    /// Build a runtime and open a database on it.
    ///
    /// ```ignore
    /// let db = BlockingDatabase::open(|| tablekit_sqlx::sqlite::open(options))?;
    /// ```
    pub fn open<F, Fut>(connect: F) -> Result<Self, DataError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Database, DataError>>,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(DataError::database)?;
        let db = runtime.block_on(connect())?;
        Ok(Self::new(Arc::new(runtime), db))
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// The async handle this mirrors.
    pub fn inner(&self) -> &Database {
        &self.db
    }

    pub fn options(&self) -> &DatabaseOptions {
        self.db.options()
    }

    pub fn dialect(&self) -> Dialect {
        self.db.dialect()
    }

    pub fn table<T>(&self, likely_name: impl Into<String>) -> BlockingTable<T> {
        self.table_with_id(likely_name)
    }

    pub fn table_with_id<T, Id>(&self, likely_name: impl Into<String>) -> BlockingTable<T, Id> {
        BlockingTable {
            runtime: self.runtime.clone(),
            table: self.db.table_with_id(likely_name),
        }
    }

    pub fn execute(&self, sql: &str, params: impl IntoArgs) -> Result<u64, DataError> {
        self.runtime.block_on(self.db.execute(sql, params))
    }

    pub fn query<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl IntoArgs,
    ) -> Result<Vec<T>, DataError> {
        self.runtime.block_on(self.db.query(sql, params))
    }

    pub fn query_first<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl IntoArgs,
    ) -> Result<Option<T>, DataError> {
        self.runtime.block_on(self.db.query_first(sql, params))
    }

    pub fn query_scalar<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl IntoArgs,
    ) -> Result<Option<T>, DataError> {
        self.runtime.block_on(self.db.query_scalar(sql, params))
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, DataError> {
        self.runtime.block_on(self.db.table_exists(table))
    }

    pub fn paginate<T: DeserializeOwned>(
        &self,
        sql: &str,
        page: u32,
        items_per_page: u32,
        params: impl IntoArgs,
    ) -> Result<Page<T>, DataError> {
        self.runtime
            .block_on(self.db.paginate(sql, page, items_per_page, params))
    }

    pub fn paginate_with<T, F>(
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
        self.runtime
            .block_on(self.db.paginate_with(sql, page, items_per_page, params, map))
    }

    pub fn begin_transaction(&self) -> Result<(), DataError> {
        self.runtime.block_on(self.db.begin_transaction())
    }

    pub fn commit(&self) -> Result<(), DataError> {
        self.runtime.block_on(self.db.commit())
    }

    pub fn rollback(&self) -> Result<(), DataError> {
        self.runtime.block_on(self.db.rollback())
    }

    pub fn in_transaction(&self) -> bool {
        self.runtime.block_on(self.db.in_transaction())
    }

    pub fn dispose(&self) {
        self.runtime.block_on(self.db.dispose())
    }

    pub fn is_disposed(&self) -> bool {
        self.db.is_disposed()
    }
}

/// Blocking handle over a [`Table`].
#[derive(Debug)]
pub struct BlockingTable<T, Id = i64> {
    runtime: Arc<Runtime>,
    table: Table<T, Id>,
}

impl<T, Id> BlockingTable<T, Id>
where
    T: DeserializeOwned + 'static,
    Id: Serialize,
{
    pub fn inner(&self) -> &Table<T, Id> {
        &self.table
    }

    pub fn name(&self) -> Result<Arc<str>, DataError> {
        self.runtime.block_on(self.table.name())
    }

    pub fn insert(&self, data: impl IntoArgs) -> Result<Option<i64>, DataError> {
        self.runtime.block_on(self.table.insert(data))
    }

    pub fn update(&self, id: Id, data: impl IntoArgs) -> Result<u64, DataError> {
        self.runtime.block_on(self.table.update(id, data))
    }

    pub fn update_where(&self, filter: impl IntoArgs, data: impl IntoArgs) -> Result<u64, DataError> {
        self.runtime.block_on(self.table.update_where(filter, data))
    }

    pub fn insert_or_update(&self, id: Id, data: impl IntoArgs) -> Result<i64, DataError> {
        self.runtime.block_on(self.table.insert_or_update(id, data))
    }

    pub fn insert_or_update_by(
        &self,
        key: impl IntoArgs,
        data: impl IntoArgs,
    ) -> Result<i64, DataError> {
        self.runtime
            .block_on(self.table.insert_or_update_by(key, data))
    }

    pub fn upsert(&self, data: impl IntoArgs) -> Result<u64, DataError> {
        self.runtime.block_on(self.table.upsert(data))
    }

    pub fn delete(&self, id: Id) -> Result<bool, DataError> {
        self.runtime.block_on(self.table.delete(id))
    }

    pub fn delete_where(&self, filter: impl IntoArgs) -> Result<bool, DataError> {
        self.runtime.block_on(self.table.delete_where(filter))
    }

    pub fn delete_all(&self) -> Result<bool, DataError> {
        self.runtime.block_on(self.table.delete_all())
    }

    pub fn get(&self, id: Id) -> Result<Option<T>, DataError> {
        self.runtime.block_on(self.table.get(id))
    }

    pub fn get_where(&self, filter: impl IntoArgs) -> Result<Option<T>, DataError> {
        self.runtime.block_on(self.table.get_where(filter))
    }

    pub fn first(&self) -> Result<Option<T>, DataError> {
        self.runtime.block_on(self.table.first())
    }

    pub fn first_where(&self, filter: impl IntoArgs) -> Result<Option<T>, DataError> {
        self.runtime.block_on(self.table.first_where(filter))
    }

    pub fn all(&self) -> Result<Vec<T>, DataError> {
        self.runtime.block_on(self.table.all())
    }

    pub fn all_where(&self, filter: impl IntoArgs) -> Result<Vec<T>, DataError> {
        self.runtime.block_on(self.table.all_where(filter))
    }

    pub fn page(&self, page: u32, items_per_page: Option<u32>) -> Result<Page<T>, DataError> {
        self.runtime.block_on(self.table.page(page, items_per_page))
    }

    pub fn page_where(
        &self,
        filter: impl IntoArgs,
        page: u32,
        items_per_page: Option<u32>,
    ) -> Result<Page<T>, DataError> {
        self.runtime
            .block_on(self.table.page_where(filter, page, items_per_page))
    }

    pub fn create(&self, columns: &[&str]) -> Result<(), DataError> {
        self.runtime.block_on(self.table.create(columns))
    }

    pub fn try_create(&self, columns: &[&str]) -> Result<(), DataError> {
        self.runtime.block_on(self.table.try_create(columns))
    }

    pub fn drop_table(&self) -> Result<(), DataError> {
        self.runtime.block_on(self.table.drop_table())
    }
}
