//! Writes the cleaned dataset into the durable table.
//!
//! A load is a two-state machine over the target table. When the table is
//! absent it is created with a uniqueness rule over the natural key, under
//! which NULL key values compare equal, and filled in the same transaction.
//! When it is present the rows go through the configured conflict policy.
//! Enrichment runs after every successful load.

use crate::constants::{ADDRESS, BOROUGH, DATE, POSTCODE, PRICE};
use crate::enrich::{Enricher, EnrichmentReport};
use crate::error::{EtlError, Result};
use crate::storage::{quote_ident, Backend, ColumnType, Store};
use crate::types::Dataset;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// What happens to an incoming row whose natural key already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Skip the row; the stored row is left untouched.
    #[default]
    IgnoreDuplicates,
    /// Overwrite every non-key column of the stored row.
    Upsert,
}

impl ConflictPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ConflictPolicy::IgnoreDuplicates => "ignore_duplicates",
            ConflictPolicy::Upsert => "upsert",
        }
    }
}

/// Ordered set of columns identifying one real-world transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey {
    columns: Vec<String>,
}

impl NaturalKey {
    pub fn new(columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(EtlError::Config("natural key must name at least one column".to_string()));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].contains(column) {
                return Err(EtlError::Config(format!("natural key lists '{column}' twice")));
            }
        }
        Ok(Self { columns })
    }

    /// date, postcode, price, borough
    pub fn by_borough() -> Self {
        Self {
            columns: [DATE, POSTCODE, PRICE, BOROUGH].iter().map(|c| c.to_string()).collect(),
        }
    }

    /// date, postcode, address, price
    pub fn by_address() -> Self {
        Self {
            columns: [DATE, POSTCODE, ADDRESS, PRICE].iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub table: String,
    pub policy: ConflictPolicy,
    pub key: Vec<String>,
    /// Drop the table (and its dependent objects) before loading.
    pub replace: bool,
}

/// Result of the create attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub table: String,
    pub outcome: CreateOutcome,
    pub policy: ConflictPolicy,
    pub rows_offered: usize,
    pub rows_written: usize,
    pub enrichment: EnrichmentReport,
}

pub struct Loader {
    table: String,
    policy: ConflictPolicy,
    key: NaturalKey,
    replace: bool,
    enricher: Enricher,
}

impl Loader {
    pub fn new(config: &LoadConfig, enricher: Enricher) -> Result<Self> {
        if config.table.trim().is_empty() {
            return Err(EtlError::Config("target table name must not be empty".to_string()));
        }
        Ok(Self {
            table: config.table.clone(),
            policy: config.policy,
            key: NaturalKey::new(config.key.clone())?,
            replace: config.replace,
            enricher,
        })
    }

    /// Loads `data` and then runs enrichment.
    ///
    /// A failed write rolls the whole batch back and surfaces as
    /// [`EtlError::Load`]. A failed enrichment leaves the load committed and
    /// surfaces as [`EtlError::Enrichment`].
    #[instrument(skip_all, fields(table = %self.table, policy = self.policy.name(), rows = data.len()))]
    pub fn load(&self, store: &mut dyn Store, data: &Dataset) -> Result<LoadReport> {
        let start = Instant::now();
        self.check_key_columns(data)?;

        if self.replace {
            info!("Dropping {} before reload", self.table);
            store.drop_table(&self.table).map_err(|source| EtlError::Load {
                stage: "drop".to_string(),
                table: self.table.clone(),
                source,
            })?;
        }

        let exists = store.table_exists(&self.table).map_err(|source| EtlError::Load {
            stage: "existence check".to_string(),
            table: self.table.clone(),
            source,
        })?;
        let outcome = if exists { CreateOutcome::AlreadyExists } else { CreateOutcome::Created };

        let backend = store.backend();
        let types = column_types(data);
        let setup = match outcome {
            CreateOutcome::Created => self.create_table_sql(backend, data.columns(), &types),
            CreateOutcome::AlreadyExists => {
                info!(
                    "Table {} already exists, resolving conflicts with {} policy",
                    self.table,
                    self.policy.name()
                );
                Vec::new()
            }
        };
        let insert = self.insert_sql(backend, data.columns());

        let stage = match outcome {
            CreateOutcome::Created => "create",
            CreateOutcome::AlreadyExists => self.policy.name(),
        };
        let rows_written = store
            .write_rows(&setup, &insert, &types, data.rows())
            .map_err(|source| EtlError::Load {
                stage: stage.to_string(),
                table: self.table.clone(),
                source,
            })?;

        info!(
            "✅ Loaded {} of {} rows into {} on {} ({:?})",
            rows_written,
            data.len(),
            self.table,
            backend.name(),
            outcome
        );
        counter!("house_prices_rows_loaded_total", "policy" => self.policy.name()).increment(rows_written as u64);
        histogram!("house_prices_load_duration_seconds").record(start.elapsed().as_secs_f64());

        let enrichment = self
            .enricher
            .enrich(store, &self.table)
            .map_err(|source| {
                warn!("Data loaded into {} but enrichment failed: {}", self.table, source);
                EtlError::Enrichment {
                    table: self.table.clone(),
                    loaded_rows: rows_written,
                    source,
                }
            })?;

        Ok(LoadReport {
            table: self.table.clone(),
            outcome,
            policy: self.policy,
            rows_offered: data.len(),
            rows_written,
            enrichment,
        })
    }

    fn check_key_columns(&self, data: &Dataset) -> Result<()> {
        let missing: Vec<&str> = self
            .key
            .columns()
            .iter()
            .filter(|c| !data.has_column(c))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EtlError::structure(
                "load",
                format!("natural key columns missing from dataset: {}", missing.join(", ")),
            ))
        }
    }

    /// `CREATE TABLE` plus whatever the backend needs to enforce the key.
    pub fn create_table_sql(&self, backend: Backend, columns: &[String], types: &[ColumnType]) -> Vec<String> {
        let unique = backend.unique_key_sql(&self.table, self.key.columns());
        let mut defs: Vec<String> = columns
            .iter()
            .zip(types)
            .map(|(name, ty)| format!("{} {}", quote_ident(name), backend.column_sql(*ty)))
            .collect();
        defs.extend(unique.constraint);

        let mut statements = vec![format!("CREATE TABLE {} ({})", quote_ident(&self.table), defs.join(", "))];
        statements.extend(unique.index);
        statements
    }

    pub fn insert_sql(&self, backend: Backend, columns: &[String]) -> String {
        let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|n| backend.placeholder(n)).collect();

        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !self.key.contains(c))
            .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
            .collect();
        let action = match self.policy {
            ConflictPolicy::Upsert if !updates.is_empty() => format!("DO UPDATE SET {}", updates.join(", ")),
            _ => "DO NOTHING".to_string(),
        };

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            quote_ident(&self.table),
            names.join(", "),
            placeholders.join(", "),
            backend.conflict_target(self.key.columns()),
            action
        )
    }
}

fn column_types(data: &Dataset) -> Vec<ColumnType> {
    (0..data.width())
        .map(|i| ColumnType::infer(data.rows().iter().map(|row| &row[i])))
        .collect()
}
