//! Convention-based table-name discovery.
//!
//! A table handle is declared with a *likely* name (usually the field or
//! accessor it is exposed under). The first time the handle needs its name,
//! the likely name is probed in the schema catalog; when no such table
//! exists, the entity type's own name is used without a second probe. The
//! answer is cached per entity type for as long as the [`Caches`] live.

use std::any::TypeId;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::debug;

use crate::error::DataError;
use crate::executor::Executor;
use crate::params::{ParamNameCache, Params};

/// Memo of resolved table names per entity type. Entries are never re-probed.
#[derive(Debug, Default)]
pub struct TableNameCache {
    names: DashMap<TypeId, Arc<str>>,
}

impl TableNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity: TypeId) -> Option<Arc<str>> {
        self.names.get(&entity).map(|name| name.clone())
    }

    /// Record a resolution; the first stored answer wins.
    pub fn insert(&self, entity: TypeId, name: Arc<str>) -> Arc<str> {
        self.names.entry(entity).or_insert(name).clone()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&self) {
        self.names.clear();
    }
}

/// The name caches shared by database handles.
///
/// Handles created with [`Database::new`](crate::Database::new) share
/// [`Caches::global`]. Handles pointing at *different* schemas should each
/// get their own instance via [`Database::with_caches`](crate::Database::with_caches),
/// since a table name resolved against one schema is reused for all of them.
#[derive(Debug, Default)]
pub struct Caches {
    pub params: ParamNameCache,
    pub tables: TableNameCache,
}

impl Caches {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide instance.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<Caches>> = OnceLock::new();
        GLOBAL.get_or_init(Caches::new).clone()
    }
}

/// Last path segment of `T`'s type name, without generic arguments.
///
/// `app::model::ReportNoteRow<i64>` becomes `ReportNoteRow`.
pub fn entity_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Resolve (or recall) the table backing entity type `T`.
pub async fn resolve_table_name<T: ?Sized + 'static>(
    executor: &dyn Executor,
    cache: &TableNameCache,
    likely_name: &str,
    lower_case: bool,
) -> Result<Arc<str>, DataError> {
    let entity = TypeId::of::<T>();
    if let Some(name) = cache.get(entity) {
        return Ok(name);
    }

    let fold = |name: &str| {
        if lower_case {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    };
    let likely = fold(likely_name);
    let exists = table_exists(executor, &likely).await?;
    let resolved = if exists {
        likely
    } else {
        fold(entity_name::<T>())
    };
    debug!(
        entity = entity_name::<T>(),
        likely = likely_name,
        table = %resolved,
        probed = exists,
        "Resolved table name"
    );
    Ok(cache.insert(entity, resolved.into()))
}

/// Whether `table` exists in the current database.
pub async fn table_exists(executor: &dyn Executor, table: &str) -> Result<bool, DataError> {
    let params = Params::new().with("name", table);
    let rows = executor
        .query(executor.dialect().table_exists_sql(), &params, None)
        .await
        .map_err(|e| e.in_operation("table_exists"))?;
    Ok(!rows.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::executor::scripted::{Call, ScriptedExecutor};
    use serde_json::json;

    #[allow(dead_code)]
    struct ReportNoteRow;
    #[allow(dead_code)]
    struct Wrapper<T>(T);

    #[test]
    fn entity_name_drops_path_and_generics() {
        assert_eq!(entity_name::<ReportNoteRow>(), "ReportNoteRow");
        assert_eq!(entity_name::<Wrapper<ReportNoteRow>>(), "Wrapper");
    }

    #[tokio::test]
    async fn likely_name_wins_when_present() {
        let exec = ScriptedExecutor::new(Dialect::MySql).rows(vec![json!({"1": 1})]);
        let cache = TableNameCache::new();
        let name = resolve_table_name::<ReportNoteRow>(&exec, &cache, "ReportNote", true)
            .await
            .unwrap();
        assert_eq!(&*name, "reportnote");
        match &exec.calls()[0] {
            Call::Query(_, params) => assert_eq!(params.get("name"), Some(&json!("reportnote"))),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_type_name_and_caches_forever() {
        let exec = ScriptedExecutor::new(Dialect::Sqlite);
        let cache = TableNameCache::new();
        let first = resolve_table_name::<ReportNoteRow>(&exec, &cache, "Notes", true)
            .await
            .unwrap();
        let again = resolve_table_name::<ReportNoteRow>(&exec, &cache, "Other", true)
            .await
            .unwrap();
        assert_eq!(&*first, "reportnoterow");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(exec.calls().len(), 1);
    }

    #[tokio::test]
    async fn case_is_kept_when_folding_is_off() {
        let exec = ScriptedExecutor::new(Dialect::Sqlite);
        let cache = TableNameCache::new();
        let name = resolve_table_name::<ReportNoteRow>(&exec, &cache, "Notes", false)
            .await
            .unwrap();
        assert_eq!(&*name, "ReportNoteRow");
    }

    #[test]
    fn global_caches_are_shared() {
        assert!(Arc::ptr_eq(&Caches::global(), &Caches::global()));
        assert!(!Arc::ptr_eq(&Caches::new(), &Caches::global()));
    }
}
