//! One ETL run: extract, clean, load, enrich.

use crate::config::Config;
use crate::enrich::Enricher;
use crate::error::Result;
use crate::extract::extract_house_prices;
use crate::load::{LoadReport, Loader};
use crate::pipeline::{CleanOutcome, CleanReport, CleaningPipeline};
use crate::storage::Store;
use crate::types::CleanRecord;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub extracted_rows: usize,
    pub clean: CleanReport,
    pub load: LoadReport,
    pub duration_secs: f64,
}

/// Extracts and cleans without touching a store.
pub fn extract_and_clean(config: &Config) -> Result<CleanOutcome> {
    let raw = extract_house_prices(&config.extract)?;
    CleaningPipeline::new(&config.pipeline).clean(raw)
}

/// Full run against `store`.
pub fn run(config: &Config, store: &mut dyn Store, run_id: Uuid) -> Result<RunSummary> {
    let start = Instant::now();

    let raw = extract_house_prices(&config.extract)?;
    let extracted_rows = raw.len();
    let CleanOutcome { data, report } = CleaningPipeline::new(&config.pipeline).clean(raw)?;

    let loader = Loader::new(&config.load, Enricher::new(config.enrichment.clone()))?;
    let load = loader.load(store, &data)?;

    let duration_secs = start.elapsed().as_secs_f64();
    info!("🏁 Run {} finished in {:.2}s", run_id, duration_secs);
    Ok(RunSummary {
        run_id,
        extracted_rows,
        clean: report,
        load,
        duration_secs,
    })
}

#[derive(Serialize)]
struct CleanFile<'a> {
    report: &'a CleanReport,
    records: Vec<CleanRecord>,
}

/// Writes the cleaned rows and the clean report as
/// `clean_house_prices_<timestamp>.json` under `output_dir`.
pub fn write_clean_output(outcome: &CleanOutcome, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = output_dir.join(format!("clean_house_prices_{timestamp}.json"));

    let body = CleanFile {
        report: &outcome.report,
        records: outcome.data.records(),
    };
    fs::write(&path, serde_json::to_string_pretty(&body)?)?;
    info!("💾 Wrote {} clean rows to {}", outcome.data.len(), path.display());
    Ok(path)
}
