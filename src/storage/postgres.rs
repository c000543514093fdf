use super::{Backend, ColumnType, Store};
use crate::config::DbConfig;
use crate::error::{EtlError, Result, StoreError, StoreResult};
use crate::types::Value;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::{Column, Connection, Postgres, Row, TypeInfo};
use tokio::runtime::Runtime;
use tracing::info;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// PostgreSQL-backed store holding a single connection.
///
/// Calls are driven to completion on a private current-thread runtime, so
/// the store is used synchronously like the SQLite one.
pub struct PgStore {
    runtime: Runtime,
    conn: PgConnection,
}

impl PgStore {
    pub fn connect(config: &DbConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EtlError::Connection {
                message: format!("failed to start database runtime: {e}"),
            })?;

        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.dbname)
            .options([("search_path", config.schema.as_str())]);
        if let Some(mode) = &config.sslmode {
            let mode: PgSslMode = mode
                .parse()
                .map_err(|e| EtlError::Config(format!("invalid sslmode '{mode}': {e}")))?;
            options = options.ssl_mode(mode);
        }

        let conn = runtime
            .block_on(PgConnection::connect_with(&options))
            .map_err(|e| EtlError::Connection {
                message: format!("failed to connect to {config}: {e}"),
            })?;
        info!("Successfully connected to the database.");

        Ok(Self { runtime, conn })
    }
}

fn bind_value<'q>(query: PgQuery<'q>, value: &Value, ty: ColumnType) -> StoreResult<PgQuery<'q>> {
    let bound = match (ty, value) {
        (ColumnType::Text, Value::Null) => query.bind(Option::<String>::None),
        (ColumnType::Number, Value::Null) => query.bind(Option::<f64>::None),
        (ColumnType::Date, Value::Null) => query.bind(Option::<NaiveDate>::None),
        (ColumnType::Number, Value::Number(n)) => query.bind(*n),
        (ColumnType::Date, Value::Date(d)) => query.bind(*d),
        (ColumnType::Text, other) => query.bind(other.to_display()),
        (ty, other) => {
            return Err(StoreError::Unsupported {
                column: format!("{ty:?}"),
                message: format!("cannot bind {other:?}"),
            })
        }
    };
    Ok(bound)
}

fn bind_param<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Text(s) => query.bind(s.clone()),
        Value::Number(n) => query.bind(*n),
        Value::Date(d) => query.bind(*d),
    }
}

fn decode_row(row: &PgRow) -> StoreResult<Vec<Value>> {
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "INT2" => row.try_get::<Option<i16>, _>(i)?.map(|n| Value::Number(n.into())),
            "INT4" => row.try_get::<Option<i32>, _>(i)?.map(|n| Value::Number(n.into())),
            "INT8" => row.try_get::<Option<i64>, _>(i)?.map(|n| Value::Number(n as f64)),
            "FLOAT4" => row.try_get::<Option<f32>, _>(i)?.map(|n| Value::Number(n.into())),
            "FLOAT8" => row.try_get::<Option<f64>, _>(i)?.map(Value::Number),
            "DATE" => row.try_get::<Option<NaiveDate>, _>(i)?.map(Value::Date),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(i)?
                .map(|dt| Value::Date(dt.date())),
            _ => row.try_get::<Option<String>, _>(i)?.map(Value::Text),
        };
        values.push(value.unwrap_or(Value::Null));
    }
    Ok(values)
}

impl Store for PgStore {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn table_exists(&mut self, table: &str) -> StoreResult<bool> {
        let conn = &mut self.conn;
        let exists: bool = self.runtime.block_on(async {
            sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1)",
            )
            .bind(table)
            .fetch_one(&mut *conn)
            .await
        })?;
        Ok(exists)
    }

    fn execute_script(&mut self, statements: &[String]) -> StoreResult<()> {
        let conn = &mut self.conn;
        self.runtime.block_on(async {
            // An uncommitted transaction is rolled back when dropped
            let mut tx = conn.begin().await?;
            for sql in statements {
                sqlx::raw_sql(sql).execute(&mut *tx).await?;
            }
            tx.commit().await?;
            Ok::<_, StoreError>(())
        })
    }

    fn write_rows(
        &mut self,
        setup: &[String],
        sql: &str,
        types: &[ColumnType],
        rows: &[Vec<Value>],
    ) -> StoreResult<usize> {
        let conn = &mut self.conn;
        self.runtime.block_on(async {
            let mut tx = conn.begin().await?;
            for statement in setup {
                sqlx::raw_sql(statement).execute(&mut *tx).await?;
            }
            let mut affected = 0u64;
            for row in rows {
                let mut query = sqlx::query(sql);
                for (value, ty) in row.iter().zip(types) {
                    query = bind_value(query, value, *ty)?;
                }
                affected += query.execute(&mut *tx).await?.rows_affected();
            }
            tx.commit().await?;
            Ok::<_, StoreError>(affected as usize)
        })
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> StoreResult<Vec<Vec<Value>>> {
        let conn = &mut self.conn;
        self.runtime.block_on(async {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_param(query, param);
            }
            let rows = query.fetch_all(&mut *conn).await?;
            rows.iter().map(decode_row).collect::<StoreResult<Vec<_>>>()
        })
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        let PgStore { runtime, conn } = *self;
        runtime.block_on(conn.close())?;
        Ok(())
    }
}
