use crate::driver::{Connection, Driver, Row, StatementResult};
use crate::error::Result;
use async_trait::async_trait;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::Connection as RusqliteConnection;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// SQLite driver: a file-backed or in-memory database.
///
/// The compiled templates' neutral `?` placeholder is SQLite's native
/// positional marker, so statements pass through untranslated. Each
/// in-memory database is private to its connection, so the pool is pinned
/// to a single connection for that target.
#[derive(Debug)]
pub enum Sqlite {
    File(PathBuf),
    InMemory,
}

impl Sqlite {
    /// Open a SQLite database at the given file path.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Sqlite::File(path.as_ref().to_path_buf())
    }

    /// An in-memory SQLite database.
    pub fn in_memory() -> Self {
        Sqlite::InMemory
    }
}

#[async_trait]
impl Driver for Sqlite {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = match self {
            Sqlite::File(path) => RusqliteConnection::open(path)?,
            Sqlite::InMemory => RusqliteConnection::open_in_memory()?,
        };
        Ok(Box::new(SqliteConnection { conn }))
    }

    fn max_connections(&self) -> Option<usize> {
        matches!(self, Sqlite::InMemory).then_some(1)
    }
}

pub struct SqliteConnection {
    conn: RusqliteConnection,
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn execute_statement(&mut self, sql: &str, args: &[Value]) -> Result<StatementResult> {
        let mut stmt = self.conn.prepare(sql)?;

        if stmt.column_count() > 0 {
            let column_names: Vec<String> = (0..stmt.column_count())
                .map(|i| stmt.column_name(i).unwrap_or("?").to_string())
                .collect();

            let rows = stmt.query_map(
                rusqlite::params_from_iter(args.iter().map(SqlParam)),
                |row| {
                    let mut out = Row::new();
                    for (i, name) in column_names.iter().enumerate() {
                        let value: SqlValue = row.get(i)?;
                        out.insert(name.clone(), sqlite_to_json(value));
                    }
                    Ok(out)
                },
            )?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(StatementResult::Rows(results))
        } else {
            let affected = stmt.execute(rusqlite::params_from_iter(args.iter().map(SqlParam)))?;
            Ok(StatementResult::Affected(affected as u64))
        }
    }

    async fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

/// A bound argument. Arrays and objects are stored as JSON text.
struct SqlParam<'a>(&'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self.0 {
            Value::Null => Ok(ToSqlOutput::Owned(SqlValue::Null)),
            Value::Bool(b) => Ok(ToSqlOutput::Owned(SqlValue::Integer(*b as i64))),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ToSqlOutput::Owned(SqlValue::Integer(i)))
                } else if let Some(f) = n.as_f64() {
                    Ok(ToSqlOutput::Owned(SqlValue::Real(f)))
                } else {
                    Ok(ToSqlOutput::Owned(SqlValue::Null))
                }
            }
            Value::String(s) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
            value @ (Value::Array(_) | Value::Object(_)) => {
                let text = serde_json::to_string(value)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                Ok(ToSqlOutput::Owned(SqlValue::Text(text)))
            }
        }
    }
}

/// Convert a SQLite value within a row to a JSON value.
fn sqlite_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(n) => Value::Number(n.into()),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(&b).into()),
    }
}
