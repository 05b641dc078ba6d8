//! Embedded SQLite backend.
//!
//! rusqlite is synchronous, so every call runs on the blocking pool over a
//! shared `Arc<Mutex<Connection>>`. SQLite accepts `@name` variables,
//! `"quoted"` and `[bracketed]` identifiers, so statements from either
//! dialect that avoid `OFFSET .. FETCH` run unchanged.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Batch, Statement};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::context::{Connection, ParameterSet, ResultReader, ResultSet};
use crate::error::{WeaveError, WeaveResult};
use crate::value::Value;

const MEMORY: &str = ":memory:";

/// Where and how to open the database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(MEMORY),
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.to_str() == Some(MEMORY)
    }
}

fn open_database(config: &SqliteConfig) -> WeaveResult<rusqlite::Connection> {
    info!(path = ?config.path, "opening SQLite database");

    let conn = if config.is_memory() {
        rusqlite::Connection::open_in_memory()?
    } else {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        rusqlite::Connection::open(&config.path)?
    };

    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    if config.foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    }
    Ok(conn)
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(n) => ToSqlOutput::Owned(SqlValue::Integer(*n)),
            Value::UInt(n) => {
                let n = i64::try_from(*n)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                ToSqlOutput::Owned(SqlValue::Integer(n))
            }
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Bytes(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
            other => match other.to_text() {
                Some(Cow::Borrowed(text)) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
                Some(Cow::Owned(text)) => ToSqlOutput::Owned(SqlValue::Text(text)),
                None => ToSqlOutput::Owned(SqlValue::Null),
            },
        };
        Ok(output)
    }
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

/// Bind every named variable of `stmt` from `parameters`.
fn bind(stmt: &mut Statement<'_>, parameters: &ParameterSet) -> WeaveResult<()> {
    for index in 1..=stmt.parameter_count() {
        let Some(name) = stmt.parameter_name(index).map(str::to_owned) else {
            return Err(WeaveError::UnboundVariable(format!("?{}", index)));
        };
        let key = name.trim_start_matches(&['@', ':', '$'][..]);
        let parameter = parameters
            .get(key)
            .ok_or_else(|| WeaveError::UnboundVariable(key.to_string()))?;
        stmt.raw_bind_parameter(index, &parameter.value)?;
    }
    Ok(())
}

/// Run every statement of `sql` in order.
///
/// Row-producing statements are collected into result sets; the others
/// contribute to the affected-row count.
fn run_batch(
    conn: &rusqlite::Connection,
    sql: &str,
    parameters: &ParameterSet,
) -> WeaveResult<(Vec<ResultSet>, u64)> {
    let mut sets = Vec::new();
    let mut affected = 0u64;
    let mut batch = Batch::new(conn, sql);

    while let Some(mut stmt) = batch.next()? {
        bind(&mut stmt, parameters)?;

        let width = stmt.column_count();
        if width == 0 {
            affected += stmt.raw_execute()? as u64;
            continue;
        }

        let columns = stmt.column_names().into_iter().map(String::from).collect();
        let mut set = ResultSet::new(columns);
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(read_value(row.get_ref(i)?));
            }
            set.rows.push(values);
        }
        trace!(rows = set.len(), "read result set");
        sets.push(set);
    }

    Ok((sets, affected))
}

/// Result sets of one batch, fully buffered.
#[derive(Debug, Default)]
pub struct SqliteReader {
    sets: VecDeque<ResultSet>,
}

#[async_trait]
impl ResultReader for SqliteReader {
    async fn next_result(&mut self) -> WeaveResult<Option<ResultSet>> {
        Ok(self.sets.pop_front())
    }

    fn has_more(&self) -> bool {
        !self.sets.is_empty()
    }
}

/// A lazily opened SQLite connection.
pub struct SqliteConnection {
    config: SqliteConfig,
    conn: Option<Arc<Mutex<rusqlite::Connection>>>,
}

impl SqliteConnection {
    pub fn new(config: SqliteConfig) -> Self {
        Self { config, conn: None }
    }

    /// A private in-memory database.
    pub fn memory() -> Self {
        Self::new(SqliteConfig::memory())
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run `f` against the open connection on the blocking pool.
    async fn with_connection<F, T>(&self, f: F) -> WeaveResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> WeaveResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone().ok_or(WeaveError::ConnectionClosed)?;
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await?
    }

    /// Run a script outside the batch machinery, e.g. to create a schema.
    pub async fn execute_script(&mut self, sql: &str) -> WeaveResult<()> {
        self.open().await?;
        let sql = sql.to_string();
        self.with_connection(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    type Reader = SqliteReader;

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    async fn open(&mut self) -> WeaveResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let config = self.config.clone();
        let conn = tokio::task::spawn_blocking(move || open_database(&config)).await??;
        self.conn = Some(Arc::new(Mutex::new(conn)));
        Ok(())
    }

    async fn begin(&mut self) -> WeaveResult<()> {
        debug!("BEGIN");
        self.with_connection(|conn| Ok(conn.execute_batch("BEGIN")?))
            .await
    }

    async fn commit(&mut self) -> WeaveResult<()> {
        debug!("COMMIT");
        self.with_connection(|conn| Ok(conn.execute_batch("COMMIT")?))
            .await
    }

    fn release(&mut self) {
        let Some(conn) = &self.conn else {
            return;
        };
        let conn = conn.lock();
        if conn.is_autocommit() {
            return;
        }
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "failed to roll back released transaction");
        }
    }

    async fn query_multiple(
        &mut self,
        sql: &str,
        parameters: &ParameterSet,
    ) -> WeaveResult<SqliteReader> {
        let sql = sql.to_string();
        let parameters = parameters.clone();
        let (sets, affected) = self
            .with_connection(move |conn| run_batch(conn, &sql, &parameters))
            .await?;
        debug!(result_sets = sets.len(), affected, "query batch finished");
        Ok(SqliteReader { sets: sets.into() })
    }

    async fn execute(&mut self, sql: &str, parameters: &ParameterSet) -> WeaveResult<u64> {
        let sql = sql.to_string();
        let parameters = parameters.clone();
        let (_, affected) = self
            .with_connection(move |conn| run_batch(conn, &sql, &parameters))
            .await?;
        debug!(affected, "command batch finished");
        Ok(affected)
    }
}
