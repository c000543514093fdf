use crate::constants::{BOROUGH, DATE, POSTCODE, VIEW_AVG_PRICE_OUTCODE, VIEW_FLIPS_24M};
use crate::error::StoreResult;
use crate::storage::{quote_ident, Backend, Store};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Token in view SQL replaced by the quoted target table name.
pub const TABLE_TOKEN: &str = "{table}";

const SQLITE_AVG_PRICE_OUTCODE: &str = include_str!("../sql/sqlite/v_avg_price_outcode.sql");
const SQLITE_FLIPS_24M: &str = include_str!("../sql/sqlite/v_flips_24m.sql");
const POSTGRES_AVG_PRICE_OUTCODE: &str = include_str!("../sql/postgres/v_avg_price_outcode.sql");
const POSTGRES_FLIPS_24M: &str = include_str!("../sql/postgres/v_flips_24m.sql");

const INDEXED_COLUMNS: [&str; 3] = [POSTCODE, DATE, BOROUGH];

/// Optional replacements for the bundled view definitions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub avg_price_outcode_sql: Option<PathBuf>,
    pub flips_sql: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentReport {
    pub indexes: Vec<String>,
    pub views: Vec<String>,
}

/// Builds the lookup indexes and derived views over a loaded table.
#[derive(Debug, Clone, Default)]
pub struct Enricher {
    config: EnrichmentConfig,
}

impl Enricher {
    pub fn new(config: EnrichmentConfig) -> Self {
        Self { config }
    }

    pub fn index_name(table: &str, column: &str) -> String {
        format!("idx_{table}_{column}")
    }

    pub fn index_statements(table: &str) -> Vec<String> {
        INDEXED_COLUMNS
            .iter()
            .map(|column| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    quote_ident(&Self::index_name(table, column)),
                    quote_ident(table),
                    quote_ident(column)
                )
            })
            .collect()
    }

    /// View SQL for the backend, from the configured file or the bundled default.
    pub fn view_sql(&self, backend: Backend, table: &str) -> StoreResult<Vec<(&'static str, String)>> {
        let (avg_default, flips_default) = match backend {
            Backend::Sqlite => (SQLITE_AVG_PRICE_OUTCODE, SQLITE_FLIPS_24M),
            Backend::Postgres => (POSTGRES_AVG_PRICE_OUTCODE, POSTGRES_FLIPS_24M),
        };
        let avg = read_or(&self.config.avg_price_outcode_sql, avg_default)?;
        let flips = read_or(&self.config.flips_sql, flips_default)?;

        let quoted = quote_ident(table);
        Ok(vec![
            (VIEW_AVG_PRICE_OUTCODE, avg.replace(TABLE_TOKEN, &quoted)),
            (VIEW_FLIPS_24M, flips.replace(TABLE_TOKEN, &quoted)),
        ])
    }

    /// Runs every index and view statement in one transaction. On failure
    /// none of them are kept; the loaded rows are not touched.
    pub fn enrich(&self, store: &mut dyn Store, table: &str) -> StoreResult<EnrichmentReport> {
        let indexes = Self::index_statements(table);
        let views = self.view_sql(store.backend(), table)?;

        let mut script = indexes.clone();
        script.extend(views.iter().map(|(_, sql)| sql.clone()));
        debug!("Running {} enrichment statements on {}", script.len(), table);
        store.execute_script(&script)?;

        let report = EnrichmentReport {
            indexes: INDEXED_COLUMNS.iter().map(|c| Self::index_name(table, c)).collect(),
            views: views.iter().map(|(name, _)| name.to_string()).collect(),
        };
        for index in &report.indexes {
            info!("Index applied: {}", index);
        }
        for view in &report.views {
            info!("View {} created / replaced", view);
        }
        Ok(report)
    }
}

fn read_or(path: &Option<PathBuf>, default: &str) -> StoreResult<String> {
    match path {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => Ok(default.to_string()),
    }
}
