//! Convention-based table access over a raw SQL execution primitive.
//!
//! A [`Database`] wraps an [`Executor`] (see `tablekit-sqlx`) and hands out
//! [`Table`] handles that synthesize `INSERT`/`UPDATE`/upsert/`DELETE`/`SELECT`
//! statements from serde-serializable values. [`Database::paginate`] pages
//! through any hand-written SELECT by deriving a `COUNT` query from it.
//!
//! ```ignore
//! let db = tablekit_sqlx::sqlite::open(DatabaseOptions::default().with_url("sqlite::memory:")).await?;
//! let profiles = db.table::<Profile>("profiles");
//! let kajang = profiles.all_where(json!({ "facultyId": 1 })).await?;
//! let first = profiles.page(1, Some(1)).await?;
//! ```

pub mod blocking;
pub mod config;
pub mod database;
pub mod dialect;
pub mod error;
pub mod executor;
mod fields;
pub mod naming;
pub mod page;
pub mod params;
pub mod sql;
pub mod statement;
pub mod table;

pub use config::{ConfigError, DatabaseOptions};
pub use database::{Database, Schema};
pub use dialect::{Dialect, KeySource};
pub use error::{DataError, DataResult};
pub use executor::{Execution, Executor, Record};
pub use naming::Caches;
pub use page::{Page, PageInfo, Pageable};
pub use params::{Args, IntoArgs, Params};
pub use table::Table;

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        Database, DataError, DatabaseOptions, IntoArgs, Page, Params, Schema, Table,
    };
}
