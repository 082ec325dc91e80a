//! # tablekit-sqlx: SQLx backend for tablekit
//!
//! This crate provides the [SQLx](https://github.com/launchbadge/sqlx)-based
//! [`Executor`](tablekit::Executor) implementations that `tablekit`'s
//! [`Database`](tablekit::Database) runs on.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | `SqliteExecutor` | Executor over an `sqlx::SqlitePool` (`ON CONFLICT`, `RETURNING`) |
//! | `MySqlExecutor` | Executor over an `sqlx::MySqlPool` (`ON DUPLICATE KEY`, `LAST_INSERT_ID`) |
//! | [`bind`] | `@name` placeholders to positional `?` with their values |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` → `DataError` (`.into_data_error()`) |
//! | [`SqlxResult<T>`] | Type alias for `Result<T, DataError>` |
//!
//! # Feature flags
//!
//! | Feature  | Driver |
//! |----------|--------|
//! | `sqlite` | SQLite via `sqlx/sqlite` (default) |
//! | `mysql`  | MySQL / MariaDB via `sqlx/mysql`, with `chrono` for temporal columns |
//!
//! # Quick start
//!
//! ```ignore
//! use tablekit::prelude::*;
//!
//! let options = DatabaseOptions::load("application.yaml")?;
//! let db = tablekit_sqlx::mysql::open(options).await?;
//!
//! let profiles = db.table::<Profile>("profiles");
//! profiles.update_where(json!({ "id": 1, "facultyId": 1 }), json!({ "city": "Bangi" })).await?;
//! ```
//!
//! # Transactions
//!
//! `Database::begin_transaction` takes a connection out of the pool and keeps
//! it until `commit`/`rollback`; every statement issued in between runs on
//! it. Disposing the database drops (and so rolls back) an open transaction
//! before closing the pool.
//!
//! # Error bridging
//!
//! Due to Rust's orphan rules, `From<sqlx::Error> for DataError` can't be
//! implemented here. Use the [`SqlxErrorExt`] trait instead:
//!
//! ```ignore
//! use tablekit_sqlx::SqlxErrorExt;
//!
//! let rows = sqlx::query("SELECT ...")
//!     .fetch_all(&pool)
//!     .await
//!     .map_err(|e| e.into_data_error())?;
//! ```

pub mod bind;
pub mod error;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod timeout;

pub use error::{SqlxErrorExt, SqlxResult};
#[cfg(feature = "mysql")]
pub use mysql::MySqlExecutor;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutor;

/// Re-exports of the most commonly used types from both `tablekit` and this crate.
pub mod prelude {
    pub use crate::SqlxErrorExt;
    #[cfg(feature = "mysql")]
    pub use crate::MySqlExecutor;
    #[cfg(feature = "sqlite")]
    pub use crate::SqliteExecutor;
    pub use tablekit::prelude::*;
}
