use super::{Backend, ColumnType, Store};
use crate::error::StoreResult;
use crate::types::Value;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use tracing::debug;

/// SQLite-backed store, on disk or in memory.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        debug!("Opened SQLite store at {}", path.as_ref().display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Number(n) => SqlValue::Real(*n),
        Value::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i as f64),
        ValueRef::Real(f) => Value::Number(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl Store for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn table_exists(&mut self, table: &str) -> StoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn execute_script(&mut self, statements: &[String]) -> StoreResult<()> {
        // Dropping an uncommitted transaction rolls it back
        let tx = self.conn.transaction()?;
        for sql in statements {
            tx.execute_batch(sql)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn write_rows(
        &mut self,
        setup: &[String],
        sql: &str,
        _types: &[ColumnType],
        rows: &[Vec<Value>],
    ) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        for statement in setup {
            tx.execute_batch(statement)?;
        }
        let mut affected = 0;
        {
            let mut stmt = tx.prepare(sql)?;
            for row in rows {
                affected += stmt.execute(params_from_iter(row.iter().map(to_sql)))?;
            }
        }
        tx.commit()?;
        Ok(affected)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> StoreResult<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sql(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }
}
