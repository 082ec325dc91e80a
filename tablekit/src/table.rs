use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::database::{decode, decode_all, first_column, single, Database};
use crate::dialect::{Dialect, KeySource};
use crate::error::DataError;
use crate::naming;
use crate::page::{Page, Pageable};
use crate::params::{Args, IntoArgs, Params};
use crate::statement::{self, Bound, Statement};

/// Convention-based CRUD over the table backing entity `T`.
///
/// `Id` is the type of the primary key column (named by
/// [`DatabaseOptions::id_column`](crate::DatabaseOptions::id_column)).
/// The table name is resolved on first use, see [`naming`](crate::naming).
pub struct Table<T, Id = i64> {
    db: Database,
    likely_name: String,
    name: OnceCell<Arc<str>>,
    _marker: PhantomData<fn() -> (T, Id)>,
}

impl<T, Id> std::fmt::Debug for Table<T, Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("entity", &naming::entity_name::<T>())
            .field("likely_name", &self.likely_name)
            .field("name", &self.name.get())
            .finish()
    }
}

impl<T, Id> Table<T, Id> {
    pub(crate) fn new(db: Database, likely_name: String) -> Self {
        Self {
            db,
            likely_name,
            name: OnceCell::new(),
            _marker: PhantomData,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn likely_name(&self) -> &str {
        &self.likely_name
    }
}

impl<T, Id> Table<T, Id>
where
    T: DeserializeOwned + 'static,
    Id: Serialize,
{
    /// The backing table's name, resolved once.
    pub async fn name(&self) -> Result<Arc<str>, DataError> {
        self.db.ensure_open()?;
        self.name
            .get_or_try_init(|| {
                naming::resolve_table_name::<T>(
                    self.db.executor(),
                    &self.db.caches().tables,
                    &self.likely_name,
                    self.db.options().lower_case_table_names,
                )
            })
            .await
            .cloned()
    }

    /// Insert every field of `data` except the primary key.
    ///
    /// Returns the generated key, if the backend reported one.
    pub async fn insert(&self, data: impl IntoArgs) -> Result<Option<i64>, DataError> {
        let table = self.name().await?;
        let data = data.into_args()?;
        let names = self.db.names(&data);
        let stmt = statement::insert(
            self.db.dialect(),
            &table,
            self.id_column(),
            Bound::new(&names, &data),
        )?;
        let done = self.db.run("insert", Some(&table), &stmt).await?;
        Ok(done.last_insert_id)
    }

    /// Update the row with primary key `id`; returns the affected row count.
    pub async fn update(&self, id: Id, data: impl IntoArgs) -> Result<u64, DataError> {
        self.update_where(self.key(id)?, data).await
    }

    /// Update every row matching the equality predicate `filter`.
    ///
    /// Fields present in both `filter` and `data` bind the `filter` value.
    pub async fn update_where(
        &self,
        filter: impl IntoArgs,
        data: impl IntoArgs,
    ) -> Result<u64, DataError> {
        let table = self.name().await?;
        let filter = filter.into_args()?;
        let data = data.into_args()?;
        let (filter_names, data_names) = (self.db.names(&filter), self.db.names(&data));
        let stmt = statement::update(
            self.db.dialect(),
            &table,
            Bound::new(&filter_names, &filter),
            Bound::new(&data_names, &data),
        )?;
        let done = self.db.run("update", Some(&table), &stmt).await?;
        Ok(done.rows_affected)
    }

    /// Upsert keyed on the primary key; returns the resulting key.
    pub async fn insert_or_update(&self, id: Id, data: impl IntoArgs) -> Result<i64, DataError> {
        self.insert_or_update_by(self.key(id)?, data).await
    }

    /// Upsert keyed on the single field of `key`; returns the resulting key.
    ///
    /// The key column must be unique and integral. A `key` with zero or
    /// several fields is rejected.
    pub async fn insert_or_update_by(
        &self,
        key: impl IntoArgs,
        data: impl IntoArgs,
    ) -> Result<i64, DataError> {
        let table = self.name().await?;
        let key = key.into_args()?;
        let data = data.into_args()?;
        let (key_names, data_names) = (self.db.names(&key), self.db.names(&data));
        let dialect = self.db.dialect();
        let stmt = statement::insert_or_update_by(
            dialect,
            &table,
            Bound::new(&key_names, &key),
            Bound::new(&data_names, &data),
        )?;
        match dialect.key_source() {
            KeySource::LastInsertId => {
                let done = self.db.run("insert_or_update", Some(&table), &stmt).await?;
                // Non-AUTO_INCREMENT keys report no insert id; the bound key is the answer.
                done.last_insert_id
                    .or_else(|| stmt.params.get(&key_names[0]).and_then(|v| v.as_i64()))
                    .ok_or_else(|| DataError::Decode("upsert reported no key".into()))
            }
            KeySource::Returning => {
                let rows = self.db.fetch("insert_or_update", Some(&table), &stmt).await?;
                let key = rows
                    .into_iter()
                    .next()
                    .and_then(first_column)
                    .ok_or_else(|| DataError::Decode("upsert returned no key".into()))?;
                key.as_i64()
                    .ok_or_else(|| DataError::Decode(format!("upsert key {key} is not an integer")))
            }
        }
    }

    /// Upsert `data` against whatever unique key it collides with; returns
    /// the affected row count as reported by the backend.
    pub async fn upsert(&self, data: impl IntoArgs) -> Result<u64, DataError> {
        let table = self.name().await?;
        let data = data.into_args()?;
        let names = self.db.names(&data);
        let stmt =
            statement::insert_or_update(self.db.dialect(), &table, Bound::new(&names, &data))?;
        let done = self.db.run("upsert", Some(&table), &stmt).await?;
        Ok(done.rows_affected)
    }

    /// Delete by primary key; `true` when a row was removed.
    pub async fn delete(&self, id: Id) -> Result<bool, DataError> {
        let table = self.name().await?;
        let id = self.id_value(id)?;
        let stmt = statement::delete_by_id(self.db.dialect(), &table, self.id_column(), id);
        let done = self.db.run("delete", Some(&table), &stmt).await?;
        Ok(done.rows_affected > 0)
    }

    pub async fn delete_where(&self, filter: impl IntoArgs) -> Result<bool, DataError> {
        let table = self.name().await?;
        let filter = filter.into_args()?;
        let names = self.db.names(&filter);
        let stmt =
            statement::delete_where(self.db.dialect(), &table, Bound::new(&names, &filter))?;
        let done = self.db.run("delete", Some(&table), &stmt).await?;
        Ok(done.rows_affected > 0)
    }

    /// Remove every row (`TRUNCATE` on MySQL, which reports no row count).
    pub async fn delete_all(&self) -> Result<bool, DataError> {
        let table = self.name().await?;
        let stmt = statement::delete_all(self.db.dialect(), &table);
        let done = self.db.run("delete_all", Some(&table), &stmt).await?;
        Ok(done.rows_affected > 0)
    }

    pub async fn get(&self, id: Id) -> Result<Option<T>, DataError> {
        let table = self.name().await?;
        let id = self.id_value(id)?;
        let stmt = statement::get_by_id(self.db.dialect(), &table, self.id_column(), id);
        let rows = self.db.fetch("get", Some(&table), &stmt).await?;
        rows.into_iter().next().map(decode).transpose()
    }

    /// Same as [`first_where`](Self::first_where).
    pub async fn get_where(&self, filter: impl IntoArgs) -> Result<Option<T>, DataError> {
        self.first_where(filter).await
    }

    pub async fn first(&self) -> Result<Option<T>, DataError> {
        self.first_of(None).await
    }

    pub async fn first_where(&self, filter: impl IntoArgs) -> Result<Option<T>, DataError> {
        self.first_of(Some(filter.into_args()?)).await
    }

    pub async fn all(&self) -> Result<Vec<T>, DataError> {
        self.all_of(None).await
    }

    pub async fn all_where(&self, filter: impl IntoArgs) -> Result<Vec<T>, DataError> {
        self.all_of(Some(filter.into_args()?)).await
    }

    /// One page of the whole table. `None` for `items_per_page` uses
    /// [`DatabaseOptions::items_per_page`](crate::DatabaseOptions::items_per_page).
    pub async fn page(
        &self,
        page: u32,
        items_per_page: Option<u32>,
    ) -> Result<Page<T>, DataError> {
        self.page_of(None, page, items_per_page).await
    }

    pub async fn page_where(
        &self,
        filter: impl IntoArgs,
        page: u32,
        items_per_page: Option<u32>,
    ) -> Result<Page<T>, DataError> {
        self.page_of(Some(filter.into_args()?), page, items_per_page)
            .await
    }

    /// `CREATE TABLE` with verbatim column definitions.
    ///
    /// Fails with [`DataError::Conflict`] when the table already exists.
    pub async fn create(&self, columns: &[&str]) -> Result<(), DataError> {
        let table = self.name().await?;
        if naming::table_exists(self.db.executor(), &table).await? {
            return Err(DataError::Conflict(format!("table {table} already exists")));
        }
        let stmt = statement::create_table(self.db.dialect(), &table, columns, false);
        self.db.run("create", Some(&table), &stmt).await?;
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS`.
    pub async fn try_create(&self, columns: &[&str]) -> Result<(), DataError> {
        let table = self.name().await?;
        let stmt = statement::create_table(self.db.dialect(), &table, columns, true);
        self.db.run("create", Some(&table), &stmt).await?;
        Ok(())
    }

    /// `DROP TABLE IF EXISTS`.
    pub async fn drop_table(&self) -> Result<(), DataError> {
        let table = self.name().await?;
        let stmt = statement::drop_table(self.db.dialect(), &table);
        self.db.run("drop", Some(&table), &stmt).await?;
        Ok(())
    }

    async fn first_of(&self, filter: Option<Args>) -> Result<Option<T>, DataError> {
        let table = self.name().await?;
        let stmt = self.select(&table, filter.as_ref(), statement::first)?;
        let rows = self.db.fetch("first", Some(&table), &stmt).await?;
        rows.into_iter().next().map(decode).transpose()
    }

    async fn all_of(&self, filter: Option<Args>) -> Result<Vec<T>, DataError> {
        let table = self.name().await?;
        let stmt = self.select(&table, filter.as_ref(), statement::select)?;
        let rows = self.db.fetch("all", Some(&table), &stmt).await?;
        decode_all(rows)
    }

    async fn page_of(
        &self,
        filter: Option<Args>,
        page: u32,
        items_per_page: Option<u32>,
    ) -> Result<Page<T>, DataError> {
        let per_page = items_per_page.unwrap_or(self.db.options().items_per_page);
        let pageable = Pageable::new(page, per_page)?;
        let table = self.name().await?;
        let stmt = self.select(&table, filter.as_ref(), statement::select)?;
        self.db
            .paginate_bound("page", Some(&table), &stmt.sql, pageable, &stmt.params, decode)
            .await
    }

    fn select(
        &self,
        table: &str,
        filter: Option<&Args>,
        build: fn(Dialect, &str, Option<Bound<'_>>) -> Result<Statement, DataError>,
    ) -> Result<Statement, DataError> {
        let dialect = self.db.dialect();
        match filter {
            Some(args) => {
                let names = self.db.names(args);
                build(dialect, table, Some(Bound::new(&names, args)))
            }
            None => build(dialect, table, None),
        }
    }

    fn id_column(&self) -> &str {
        &self.db.options().id_column
    }

    fn key(&self, id: Id) -> Result<Params, DataError> {
        single(self.id_column(), id)
    }

    fn id_value(&self, id: Id) -> Result<serde_json::Value, DataError> {
        serde_json::to_value(id).map_err(|e| DataError::invalid(format!("cannot bind id: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseOptions;
    use crate::executor::scripted::{Call, ScriptedExecutor};
    use crate::naming::Caches;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Profile {
        id: i64,
        city: String,
        faculty_id: i64,
    }

    fn profiles(exec: ScriptedExecutor) -> (Table<Profile>, Arc<ScriptedExecutor>) {
        let exec = Arc::new(exec);
        let db = Database::from_arc(exec.clone(), DatabaseOptions::default())
            .with_caches(Caches::new());
        (db.table("profiles"), exec)
    }

    fn probed(dialect: Dialect) -> ScriptedExecutor {
        ScriptedExecutor::new(dialect).rows(vec![json!({"1": 1})])
    }

    fn profile() -> Profile {
        Profile {
            id: 5,
            city: "Kajang".into(),
            faculty_id: 1,
        }
    }

    #[tokio::test]
    async fn name_is_resolved_once() {
        let (table, exec) = profiles(probed(Dialect::MySql));
        assert_eq!(&*table.name().await.unwrap(), "profiles");
        assert_eq!(&*table.name().await.unwrap(), "profiles");
        assert_eq!(exec.calls().len(), 1);
    }

    #[tokio::test]
    async fn insert_skips_id_and_returns_generated_key() {
        let (table, exec) = profiles(probed(Dialect::MySql).done(1, Some(42)));
        let id = table.insert(&profile()).await.unwrap();
        assert_eq!(id, Some(42));
        match &exec.calls()[1] {
            Call::Execute(sql, params) => {
                assert_eq!(
                    sql,
                    "INSERT INTO `profiles` (`city`, `facultyId`) VALUES (@city, @facultyId)"
                );
                assert_eq!(params.names(), vec!["city", "facultyId"]);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn upsert_by_key_on_sqlite_reads_returned_key() {
        let exec = probed(Dialect::Sqlite).rows(vec![json!({"id": 5})]);
        let (table, exec) = profiles(exec);
        let id = table.insert_or_update(5, &profile()).await.unwrap();
        assert_eq!(id, 5);
        let sql = &exec.sql()[1];
        assert!(sql.starts_with("INSERT INTO `profiles` (`city`, `facultyId`, `id`)"));
        assert!(sql.ends_with("RETURNING `id`"));
    }

    #[tokio::test]
    async fn upsert_by_key_on_mysql_reads_last_insert_id() {
        let (table, _) = profiles(probed(Dialect::MySql).done(2, Some(5)));
        let id = table.insert_or_update(5, &profile()).await.unwrap();
        assert_eq!(id, 5);
    }

    #[tokio::test]
    async fn upsert_rejects_composite_key() {
        let (table, _) = profiles(probed(Dialect::MySql));
        let key = Params::new().with("id", 1).with("facultyId", 1);
        let err = table.insert_or_update_by(key, &profile()).await.unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn unbindable_ids_are_rejected_before_running() {
        type Grid = std::collections::HashMap<(i32, i32), i32>;
        let exec = Arc::new(probed(Dialect::MySql));
        let db = Database::from_arc(exec.clone(), DatabaseOptions::default())
            .with_caches(Caches::new());
        let table = db.table_with_id::<Profile, Grid>("profiles");
        let grid = || Grid::from([((1, 2), 3)]);

        let err = table.update(grid(), json!({ "city": "Ipoh" })).await.unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
        let err = table.insert_or_update(grid(), &profile()).await.unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
        assert!(matches!(table.get(grid()).await, Err(DataError::InvalidArgument(_))));
        assert!(!exec
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Execute(..))));
    }

    #[tokio::test]
    async fn absent_row_is_none() {
        let (table, _) = profiles(probed(Dialect::MySql));
        assert_eq!(table.get(9).await.unwrap(), None);
        assert_eq!(table.first().await.unwrap(), None);
    }

    #[tokio::test]
    async fn page_uses_default_size() {
        let exec = probed(Dialect::Sqlite)
            .rows(vec![json!({"COUNT(*)": 0})])
            .rows(vec![]);
        let (table, exec) = profiles(exec);
        let page = table.page(1, None).await.unwrap();
        assert_eq!(page.items_per_page, 10);
        assert!(page.items.is_empty());
        assert_eq!(exec.sql()[1], "SELECT COUNT(*) FROM `profiles`");
    }

    #[tokio::test]
    async fn create_conflicts_with_existing_table() {
        let exec = probed(Dialect::Sqlite).rows(vec![json!({"1": 1})]);
        let (table, exec) = profiles(exec);
        let err = table.create(&["id INTEGER PRIMARY KEY"]).await.unwrap_err();
        assert!(matches!(err, DataError::Conflict(_)));
        assert_eq!(exec.calls().len(), 2);
    }

    #[tokio::test]
    async fn closed_database_rejects_table_operations() {
        let (table, _) = profiles(probed(Dialect::MySql));
        table.database().dispose().await;
        assert!(matches!(table.all().await, Err(DataError::Closed)));
    }
}
