//! Batched, transactional execution.
//!
//! A [`QueryContext`] collects composed statements and their bound variables,
//! then submits the whole batch as one combined command inside one
//! transaction:
//!
//! ```text
//! Idle --add_statement--> Accumulating --execute_next_result_set--> Reading
//!   ^                          |                                       |
//!   +---- execute_commands ----+<------- last result set read ---------+
//! ```
//!
//! The database itself sits behind the [`Connection`] trait.

pub mod parameters;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::{WeaveError, WeaveResult};
use crate::value::{DbType, Value};

pub use parameters::{BindVariable, BoundParameter, ParameterSet};

/// One result set: column names and rows of values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(Value::to_json))
                    .collect()
            })
            .collect()
    }

    /// Decode every row into `T`, matching fields by column name.
    pub fn deserialize<T: DeserializeOwned>(&self) -> WeaveResult<Vec<T>> {
        self.to_json()
            .into_iter()
            .map(|object| Ok(serde_json::from_value(serde_json::Value::Object(object))?))
            .collect()
    }
}

/// Cursor over the result sets of one combined command.
#[async_trait]
pub trait ResultReader: Send {
    /// The next result set, or `None` once exhausted.
    async fn next_result(&mut self) -> WeaveResult<Option<ResultSet>>;

    /// Whether another result set remains.
    fn has_more(&self) -> bool;
}

/// A database connection able to run a combined multi-statement command.
#[async_trait]
pub trait Connection: Send {
    type Reader: ResultReader;

    fn is_open(&self) -> bool;

    async fn open(&mut self) -> WeaveResult<()>;

    async fn begin(&mut self) -> WeaveResult<()>;

    async fn commit(&mut self) -> WeaveResult<()>;

    /// Free an open transaction without committing. Must not fail.
    fn release(&mut self);

    /// Submit `sql` and return a reader over its result sets.
    async fn query_multiple(
        &mut self,
        sql: &str,
        parameters: &ParameterSet,
    ) -> WeaveResult<Self::Reader>;

    /// Submit `sql` as a non-query batch and return the affected row count.
    async fn execute(&mut self, sql: &str, parameters: &ParameterSet) -> WeaveResult<u64>;
}

/// Where a [`QueryContext`] is in its batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Idle,
    Accumulating,
    Reading,
}

/// Accumulates statements and variables, then runs them as one transaction.
///
/// Not synchronized: one call chain drives a context at a time.
pub struct QueryContext<C: Connection> {
    connection: C,
    statements: Vec<String>,
    parameters: ParameterSet,
    transaction: bool,
    reader: Option<C::Reader>,
}

impl<C: Connection> QueryContext<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            statements: Vec::new(),
            parameters: ParameterSet::new(),
            transaction: false,
            reader: None,
        }
    }

    /// Queue a statement for the next batch.
    pub fn add_statement(&mut self, sql: impl Into<String>) -> WeaveResult<()> {
        if self.reader.is_some() {
            return Err(WeaveError::ReaderOpen);
        }
        let sql = sql.into();
        trace!(%sql, "queued statement");
        self.statements.push(sql);
        Ok(())
    }

    /// Bind a variable for the next batch and return the name used.
    pub fn add_variable(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        db_type: DbType,
        unique: bool,
    ) -> String {
        self.parameters.add_variable(name, value.into(), db_type, unique)
    }

    pub fn pending_statements(&self) -> &[String] {
        &self.statements
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn state(&self) -> ContextState {
        if self.reader.is_some() {
            ContextState::Reading
        } else if self.statements.is_empty() {
            ContextState::Idle
        } else {
            ContextState::Accumulating
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Open the connection and a transaction if either is missing.
    async fn begin_batch(&mut self) -> WeaveResult<()> {
        if !self.connection.is_open() {
            self.connection.open().await?;
        }
        if !self.transaction {
            self.connection.begin().await?;
            self.transaction = true;
        }
        Ok(())
    }

    async fn finish_batch(&mut self) -> WeaveResult<()> {
        if self.transaction {
            self.connection.commit().await?;
            self.transaction = false;
        }
        // Variables bound while reading belong to the next batch.
        if self.statements.is_empty() && self.parameters.is_empty() {
            self.parameters.reset_counter();
        }
        debug!("batch committed");
        Ok(())
    }

    /// Read the next result set, submitting pending statements first if no
    /// reader is open.
    ///
    /// Reading the last result set commits the transaction before the rows
    /// are returned.
    pub async fn execute_next_result_set(&mut self) -> WeaveResult<ResultSet> {
        if self.reader.is_none() {
            if self.statements.is_empty() {
                return Err(WeaveError::NoQueries);
            }
            self.begin_batch().await?;
            let sql = self.statements.join("\n");
            debug!(
                statements = self.statements.len(),
                parameters = self.parameters.len(),
                "submitting query batch"
            );
            let reader = self.connection.query_multiple(&sql, &self.parameters).await?;
            self.statements.clear();
            self.parameters.clear();
            self.reader = Some(reader);
        }

        let Some(reader) = self.reader.as_mut() else {
            return Err(WeaveError::NoQueries);
        };
        let result = reader.next_result().await?.unwrap_or_default();
        if !reader.has_more() {
            self.reader = None;
            self.finish_batch().await?;
        }
        Ok(result)
    }

    /// Read the next result set as rows of `T`.
    pub async fn execute_next_query<T: DeserializeOwned>(&mut self) -> WeaveResult<Vec<T>> {
        self.execute_next_result_set().await?.deserialize()
    }

    /// Run pending statements as a non-query batch and commit.
    ///
    /// An open reader is drained and its transaction committed first; in that
    /// case an empty queue is not an error.
    pub async fn execute_commands(&mut self) -> WeaveResult<u64> {
        let drained = match self.reader.take() {
            Some(mut reader) => {
                let mut discarded = 0usize;
                while reader.has_more() {
                    if reader.next_result().await?.is_none() {
                        break;
                    }
                    discarded += 1;
                }
                debug!(discarded, "drained open reader");
                self.finish_batch().await?;
                true
            }
            None => false,
        };

        if self.statements.is_empty() {
            return if drained {
                Ok(0)
            } else {
                Err(WeaveError::NoCommands)
            };
        }

        self.begin_batch().await?;
        let sql = self.statements.join("\n");
        debug!(
            statements = self.statements.len(),
            parameters = self.parameters.len(),
            "submitting command batch"
        );
        let affected = self.connection.execute(&sql, &self.parameters).await?;
        self.statements.clear();
        self.parameters.clear();
        self.finish_batch().await?;
        Ok(affected)
    }
}

impl<C: Connection> BindVariable for QueryContext<C> {
    fn add_variable(&mut self, name: &str, value: Value, db_type: DbType, unique: bool) -> String {
        self.parameters.add_variable(name, value, db_type, unique)
    }
}

impl<C: Connection> Drop for QueryContext<C> {
    fn drop(&mut self) {
        if self.transaction {
            debug!("releasing uncommitted transaction");
            self.reader = None;
            self.connection.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    struct MockReader {
        sets: VecDeque<ResultSet>,
    }

    #[async_trait]
    impl ResultReader for MockReader {
        async fn next_result(&mut self) -> WeaveResult<Option<ResultSet>> {
            Ok(self.sets.pop_front())
        }

        fn has_more(&self) -> bool {
            !self.sets.is_empty()
        }
    }

    struct MockConnection {
        open: bool,
        log: Log,
        results: Vec<ResultSet>,
    }

    impl MockConnection {
        fn new(log: &Log, results: Vec<ResultSet>) -> Self {
            Self {
                open: false,
                log: log.clone(),
                results,
            }
        }

        fn record(&self, event: String) {
            self.log.lock().push(event);
        }
    }

    fn describe(sql: &str, parameters: &ParameterSet) -> String {
        let names: Vec<&str> = parameters.iter().map(|p| p.name.as_str()).collect();
        format!("{} [{}]", sql, names.join(","))
    }

    #[async_trait]
    impl Connection for MockConnection {
        type Reader = MockReader;

        fn is_open(&self) -> bool {
            self.open
        }

        async fn open(&mut self) -> WeaveResult<()> {
            self.open = true;
            self.record("open".into());
            Ok(())
        }

        async fn begin(&mut self) -> WeaveResult<()> {
            self.record("begin".into());
            Ok(())
        }

        async fn commit(&mut self) -> WeaveResult<()> {
            self.record("commit".into());
            Ok(())
        }

        fn release(&mut self) {
            self.record("release".into());
        }

        async fn query_multiple(
            &mut self,
            sql: &str,
            parameters: &ParameterSet,
        ) -> WeaveResult<MockReader> {
            self.record(format!("query {}", describe(sql, parameters)));
            Ok(MockReader {
                sets: self.results.clone().into(),
            })
        }

        async fn execute(&mut self, sql: &str, parameters: &ParameterSet) -> WeaveResult<u64> {
            self.record(format!("execute {}", describe(sql, parameters)));
            Ok(self.results.len() as u64)
        }
    }

    fn genres(names: &[&str]) -> ResultSet {
        ResultSet {
            columns: vec!["id".into(), "name".into()],
            rows: names
                .iter()
                .enumerate()
                .map(|(i, n)| vec![Value::Int(i as i64 + 1), Value::from(*n)])
                .collect(),
        }
    }

    fn events(log: &Log) -> Vec<String> {
        log.lock().clone()
    }

    #[tokio::test]
    async fn test_no_queries() {
        let log = Log::default();
        let mut ctx = QueryContext::new(MockConnection::new(&log, vec![]));
        let err = ctx.execute_next_result_set().await.unwrap_err();
        assert_eq!(err.to_string(), "no queries to execute against the database.");
        assert!(err.is_invalid_operation());
        assert!(events(&log).is_empty());
    }

    #[tokio::test]
    async fn test_no_commands() {
        let log = Log::default();
        let mut ctx = QueryContext::new(MockConnection::new(&log, vec![]));
        let err = ctx.execute_commands().await.unwrap_err();
        assert_eq!(err.to_string(), "no commands to execute against the database.");
    }

    #[tokio::test]
    async fn test_commands_run_as_one_batch() {
        let log = Log::default();
        let mut ctx = QueryContext::new(MockConnection::new(&log, vec![]));
        let a = ctx.add_variable("name", "Rock", DbType::String, true);
        ctx.add_statement(format!("INSERT INTO g (name) VALUES (@{});", a)).unwrap();
        let b = ctx.add_variable("name", "Jazz", DbType::String, true);
        ctx.add_statement(format!("INSERT INTO g (name) VALUES (@{});", b)).unwrap();
        assert_eq!(ctx.state(), ContextState::Accumulating);

        ctx.execute_commands().await.unwrap();
        assert_eq!(
            events(&log),
            vec![
                "open".to_string(),
                "begin".to_string(),
                "execute INSERT INTO g (name) VALUES (@name_1);\nINSERT INTO g (name) VALUES (@name_2); [name_1,name_2]"
                    .to_string(),
                "commit".to_string(),
            ]
        );
        assert_eq!(ctx.state(), ContextState::Idle);
        assert!(!ctx.in_transaction());

        let err = ctx.execute_commands().await.unwrap_err();
        assert!(matches!(err, WeaveError::NoCommands));
    }

    #[tokio::test]
    async fn test_counter_resets_after_batch() {
        let log = Log::default();
        let mut ctx = QueryContext::new(MockConnection::new(&log, vec![]));
        assert_eq!(ctx.add_variable("p", 1, DbType::Int32, true), "p_1");
        assert_eq!(ctx.add_variable("p", 2, DbType::Int32, true), "p_2");
        ctx.add_statement("SELECT @p_1, @p_2;").unwrap();
        ctx.execute_commands().await.unwrap();
        assert!(ctx.parameters().is_empty());
        assert_eq!(ctx.add_variable("p", 3, DbType::Int32, true), "p_1");
    }

    #[tokio::test]
    async fn test_counter_kept_for_variables_bound_while_reading() {
        let log = Log::default();
        let mut ctx = QueryContext::new(MockConnection::new(
            &log,
            vec![genres(&["Rock"]), genres(&["Jazz"])],
        ));
        assert_eq!(ctx.add_variable("p", 1, DbType::Int32, true), "p_1");
        ctx.add_statement("SELECT @p_1; SELECT 2;").unwrap();
        ctx.execute_next_result_set().await.unwrap();
        assert_eq!(ctx.state(), ContextState::Reading);

        // Bound for the next batch while the reader is still open.
        assert_eq!(ctx.add_variable("p", 2, DbType::Int32, true), "p_2");
        ctx.execute_next_result_set().await.unwrap();
        assert_eq!(ctx.state(), ContextState::Idle);
        assert_eq!(ctx.parameters().len(), 1);
        assert_eq!(ctx.parameters().next_suffix(), 3);

        assert_eq!(ctx.add_variable("p", 3, DbType::Int32, true), "p_3");
        ctx.add_statement("UPDATE g SET id = @p_2 WHERE id = @p_3;").unwrap();
        ctx.execute_commands().await.unwrap();
        let events = events(&log);
        assert_eq!(
            events[events.len() - 2],
            "execute UPDATE g SET id = @p_2 WHERE id = @p_3; [p_2,p_3]"
        );
        assert_eq!(events.last().map(String::as_str), Some("commit"));
        assert_eq!(ctx.parameters().next_suffix(), 1);
        assert_eq!(ctx.add_variable("p", 4, DbType::Int32, true), "p_1");
    }

    #[tokio::test]
    async fn test_reads_result_sets_then_commits() {
        let log = Log::default();
        let mut ctx = QueryContext::new(MockConnection::new(
            &log,
            vec![genres(&["Rock", "Jazz"]), genres(&["Blues"])],
        ));
        ctx.add_statement("SELECT 1;").unwrap();
        ctx.add_statement("SELECT 2;").unwrap();

        let first = ctx.execute_next_result_set().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(ctx.state(), ContextState::Reading);
        assert!(ctx.in_transaction());
        assert!(matches!(ctx.add_statement("SELECT 3;"), Err(WeaveError::ReaderOpen)));

        let second = ctx.execute_next_result_set().await.unwrap();
        assert_eq!(second.rows, vec![vec![Value::Int(1), Value::from("Blues")]]);
        assert_eq!(ctx.state(), ContextState::Idle);
        assert!(!ctx.in_transaction());
        assert_eq!(
            events(&log),
            vec![
                "open".to_string(),
                "begin".to_string(),
                "query SELECT 1;\nSELECT 2; []".to_string(),
                "commit".to_string(),
            ]
        );

        let err = ctx.execute_next_result_set().await.unwrap_err();
        assert!(matches!(err, WeaveError::NoQueries));
    }

    #[tokio::test]
    async fn test_typed_rows() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Genre {
            id: i64,
            name: String,
        }

        let log = Log::default();
        let mut ctx = QueryContext::new(MockConnection::new(&log, vec![genres(&["Rock"])]));
        ctx.add_statement("SELECT id, name FROM g;").unwrap();
        let rows: Vec<Genre> = ctx.execute_next_query().await.unwrap();
        assert_eq!(
            rows,
            vec![Genre {
                id: 1,
                name: "Rock".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_commands_drain_open_reader() {
        let log = Log::default();
        let mut ctx = QueryContext::new(MockConnection::new(
            &log,
            vec![genres(&["a"]), genres(&["b"]), genres(&["c"])],
        ));
        ctx.add_statement("SELECT 1; SELECT 2; SELECT 3;").unwrap();
        ctx.execute_next_result_set().await.unwrap();

        assert_eq!(ctx.execute_commands().await.unwrap(), 0);
        assert_eq!(ctx.state(), ContextState::Idle);
        assert_eq!(events(&log).last().map(String::as_str), Some("commit"));
    }

    #[tokio::test]
    async fn test_drop_releases_without_commit() {
        let log = Log::default();
        {
            let mut ctx = QueryContext::new(MockConnection::new(
                &log,
                vec![genres(&["a"]), genres(&["b"])],
            ));
            ctx.add_statement("SELECT 1; SELECT 2;").unwrap();
            ctx.execute_next_result_set().await.unwrap();
        }
        let events = events(&log);
        assert_eq!(events.last().map(String::as_str), Some("release"));
        assert!(!events.iter().any(|e| e == "commit"));
    }

    #[tokio::test]
    async fn test_empty_reader_commits_immediately() {
        let log = Log::default();
        let mut ctx = QueryContext::new(MockConnection::new(&log, vec![]));
        ctx.add_statement("UPDATE g SET name = name;").unwrap();
        let result = ctx.execute_next_result_set().await.unwrap();
        assert!(result.is_empty());
        assert!(!ctx.in_transaction());
    }
}
