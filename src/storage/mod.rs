//! Durable store abstraction used by the loader, the enrichment step and
//! the read-only reports.

pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

use crate::config::DbConfig;
use crate::error::{EtlError, Result, StoreResult};
use crate::types::Value;
use std::path::PathBuf;

pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PgStore;

/// SQL dialect of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }

    /// 1-based bind placeholder.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Backend::Sqlite => format!("?{n}"),
            Backend::Postgres => format!("${n}"),
        }
    }

    pub fn column_sql(&self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (_, ColumnType::Text) => "TEXT",
            (Backend::Sqlite, ColumnType::Number) => "REAL",
            (Backend::Postgres, ColumnType::Number) => "DOUBLE PRECISION",
            // SQLite has no date type; ISO text sorts and compares correctly
            (Backend::Sqlite, ColumnType::Date) => "TEXT",
            (Backend::Postgres, ColumnType::Date) => "DATE",
        }
    }

    /// Conflict target for a natural key. On SQLite each column is wrapped in
    /// `coalesce(.., '')` so it matches the expression index from
    /// [`Backend::unique_key_sql`].
    pub fn conflict_target(&self, key: &[String]) -> String {
        let cols = key.iter().map(|c| match self {
            Backend::Sqlite => format!("coalesce({}, '')", quote_ident(c)),
            Backend::Postgres => quote_ident(c),
        });
        cols.collect::<Vec<_>>().join(", ")
    }

    /// Uniqueness over `key` in which NULLs compare equal. PostgreSQL gets an
    /// inline constraint; SQLite gets a separate expression index.
    pub fn unique_key_sql(&self, table: &str, key: &[String]) -> UniqueKeySql {
        match self {
            Backend::Postgres => UniqueKeySql {
                constraint: Some(format!("UNIQUE NULLS NOT DISTINCT ({})", self.conflict_target(key))),
                index: None,
            },
            Backend::Sqlite => UniqueKeySql {
                constraint: None,
                index: Some(format!(
                    "CREATE UNIQUE INDEX {} ON {} ({})",
                    quote_ident(&format!("uq_{table}_key")),
                    quote_ident(table),
                    self.conflict_target(key)
                )),
            },
        }
    }

    /// Drops the table along with dependent objects where the engine can.
    pub fn drop_table_sql(&self, table: &str) -> String {
        match self {
            Backend::Sqlite => format!("DROP TABLE IF EXISTS {}", quote_ident(table)),
            Backend::Postgres => format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(table)),
        }
    }
}

/// DDL pieces that enforce a natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKeySql {
    /// Table constraint, placed inside `CREATE TABLE`.
    pub constraint: Option<String>,
    /// Statement run after `CREATE TABLE`.
    pub index: Option<String>,
}

/// Storage type of a column, inferred from its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Number,
    Date,
}

impl ColumnType {
    /// Type of the first non-null value; all-null columns are text.
    pub fn infer<'a>(mut values: impl Iterator<Item = &'a Value>) -> Self {
        match values.find(|v| !v.is_null()) {
            Some(Value::Number(_)) => ColumnType::Number,
            Some(Value::Date(_)) => ColumnType::Date,
            _ => ColumnType::Text,
        }
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Synchronous, transactional access to a relational store.
///
/// Every write method runs inside a single transaction: either all of its
/// effects are committed or none are.
pub trait Store {
    fn backend(&self) -> Backend;

    fn table_exists(&mut self, table: &str) -> StoreResult<bool>;

    /// Runs the statements in one transaction. Each entry may hold several
    /// `;`-separated statements.
    fn execute_script(&mut self, statements: &[String]) -> StoreResult<()>;

    /// Runs `setup`, then `sql` once per row, in one transaction. Returns the
    /// number of rows the engine reports as affected.
    fn write_rows(
        &mut self,
        setup: &[String],
        sql: &str,
        types: &[ColumnType],
        rows: &[Vec<Value>],
    ) -> StoreResult<usize>;

    /// Read-only query with positional parameters.
    fn query(&mut self, sql: &str, params: &[Value]) -> StoreResult<Vec<Vec<Value>>>;

    fn drop_table(&mut self, table: &str) -> StoreResult<()> {
        let sql = self.backend().drop_table_sql(table);
        self.execute_script(&[sql])
    }

    /// Releases the connection, reporting any error the engine raises on
    /// shutdown. Dropping the store also releases it, silently.
    fn close(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }

    fn count_rows(&mut self, table: &str) -> StoreResult<usize> {
        let rows = self.query(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), &[])?;
        Ok(rows
            .first()
            .and_then(|r| r.first())
            .and_then(Value::as_number)
            .unwrap_or(0.0) as usize)
    }
}

/// Where the durable table lives.
#[derive(Debug, Clone)]
pub enum StoreTarget {
    Sqlite(PathBuf),
    Postgres(DbConfig),
}

/// Opens a connection for one load/enrichment/report call. The connection
/// is released by [`Store::close`] or when the returned store is dropped.
pub fn open_store(target: &StoreTarget) -> Result<Box<dyn Store>> {
    match target {
        StoreTarget::Sqlite(path) => {
            let store = SqliteStore::open(path).map_err(|e| EtlError::Connection {
                message: format!("failed to open SQLite database {}: {e}", path.display()),
            })?;
            Ok(Box::new(store))
        }
        #[cfg(feature = "postgres")]
        StoreTarget::Postgres(config) => Ok(Box::new(PgStore::connect(config)?)),
        #[cfg(not(feature = "postgres"))]
        StoreTarget::Postgres(_) => Err(EtlError::Config(
            "PostgreSQL target requested but this build lacks the `postgres` feature; use --sqlite".to_string(),
        )),
    }
}
