use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::dialect::Dialect;
use crate::error::DataError;
use crate::params::Params;

/// One result row: column name to value, in select-list order.
pub type Record = Map<String, Value>;

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Execution {
    pub rows_affected: u64,
    /// Generated key of the last inserted row, when the backend reports one.
    pub last_insert_id: Option<i64>,
}

/// The SQL execution primitive the data layer runs on.
///
/// Implementations own the connection pool and at most one open transaction;
/// while a transaction is open every statement runs inside it. SQL text uses
/// `@name` placeholders which the implementation binds from `params`.
///
/// See `tablekit-sqlx` for the MySQL and SQLite implementations.
#[async_trait]
pub trait Executor: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn execute(
        &self,
        sql: &str,
        params: &Params,
        timeout: Option<Duration>,
    ) -> Result<Execution, DataError>;

    async fn query(
        &self,
        sql: &str,
        params: &Params,
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>, DataError>;

    async fn begin(&self) -> Result<(), DataError>;

    async fn commit(&self) -> Result<(), DataError>;

    async fn rollback(&self) -> Result<(), DataError>;

    async fn in_transaction(&self) -> bool;

    /// Release every connection. Further calls fail with [`DataError::Closed`].
    async fn close(&self);
}

#[cfg(test)]
pub(crate) mod scripted {
    //! In-memory executor replaying canned results and recording statements.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Execute(String, Params),
        Query(String, Params),
        Begin,
        Commit,
        Rollback,
        Close,
    }

    pub enum Reply {
        Rows(Vec<Record>),
        Done(Execution),
        Fail(DataError),
    }

    pub struct ScriptedExecutor {
        dialect: Dialect,
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<Call>>,
        tx: Mutex<bool>,
        pub fail_rollback: bool,
    }

    impl ScriptedExecutor {
        pub fn new(dialect: Dialect) -> Self {
            Self {
                dialect,
                replies: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                tx: Mutex::new(false),
                fail_rollback: false,
            }
        }

        pub fn reply(self, reply: Reply) -> Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        pub fn rows(self, rows: Vec<Value>) -> Self {
            let rows = rows
                .into_iter()
                .map(|row| match row {
                    Value::Object(map) => map,
                    other => panic!("not a row: {other}"),
                })
                .collect();
            self.reply(Reply::Rows(rows))
        }

        pub fn done(self, rows_affected: u64, last_insert_id: Option<i64>) -> Self {
            self.reply(Reply::Done(Execution {
                rows_affected,
                last_insert_id,
            }))
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn sql(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Execute(sql, _) | Call::Query(sql, _) => Some(sql),
                    _ => None,
                })
                .collect()
        }

        fn next(&self, call: Call) -> Reply {
            self.calls.lock().unwrap().push(call);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::Rows(Vec::new()))
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        fn dialect(&self) -> Dialect {
            self.dialect
        }

        async fn execute(
            &self,
            sql: &str,
            params: &Params,
            _timeout: Option<Duration>,
        ) -> Result<Execution, DataError> {
            match self.next(Call::Execute(sql.to_string(), params.clone())) {
                Reply::Done(execution) => Ok(execution),
                Reply::Rows(_) => Ok(Execution::default()),
                Reply::Fail(err) => Err(err),
            }
        }

        async fn query(
            &self,
            sql: &str,
            params: &Params,
            _timeout: Option<Duration>,
        ) -> Result<Vec<Record>, DataError> {
            match self.next(Call::Query(sql.to_string(), params.clone())) {
                Reply::Rows(rows) => Ok(rows),
                Reply::Done(_) => Ok(Vec::new()),
                Reply::Fail(err) => Err(err),
            }
        }

        async fn begin(&self) -> Result<(), DataError> {
            self.calls.lock().unwrap().push(Call::Begin);
            *self.tx.lock().unwrap() = true;
            Ok(())
        }

        async fn commit(&self) -> Result<(), DataError> {
            self.calls.lock().unwrap().push(Call::Commit);
            *self.tx.lock().unwrap() = false;
            Ok(())
        }

        async fn rollback(&self) -> Result<(), DataError> {
            self.calls.lock().unwrap().push(Call::Rollback);
            *self.tx.lock().unwrap() = false;
            if self.fail_rollback {
                return Err(DataError::database(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "connection reset",
                )));
            }
            Ok(())
        }

        async fn in_transaction(&self) -> bool {
            *self.tx.lock().unwrap()
        }

        async fn close(&self) {
            self.calls.lock().unwrap().push(Call::Close);
        }
    }
}
