//! Reads the raw borough extracts into one [`Dataset`].

use crate::constants::BOROUGH;
use crate::error::Result;
use crate::pipeline::schema::normalize_column_name;
use crate::types::{Dataset, Value};
use csv::ReaderBuilder;
use metrics::{counter, histogram};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Per-row extraction budget in seconds. Slower runs are logged as a warning.
pub const EXPECTED_PER_ROW: f64 = 0.0001;

const TYPE_DESCRIPTION: &str = "HOUSE-PRICE CSVs (raw)";

#[derive(Debug, Clone, Deserialize)]
pub struct BoroughSource {
    pub borough: String,
    pub file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub data_dir: PathBuf,
    pub sources: Vec<BoroughSource>,
    pub expected_secs_per_row: f64,
}

/// Reads one CSV. Headers are trimmed and lowercased so files that disagree on
/// case still line up in [`concat`]. Empty cells become `Null`; every row is
/// tagged with `borough`.
pub fn load_one(borough: &str, path: &Path) -> Result<Dataset> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut columns: Vec<String> = reader.headers()?.iter().map(normalize_column_name).collect();
    let width = columns.len();
    columns.push(BOROUGH.to_string());

    let mut data = Dataset::new(columns);
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<Value> = (0..width)
            .map(|i| match record.get(i) {
                Some(cell) if !cell.is_empty() => Value::text(cell),
                _ => Value::Null,
            })
            .collect();
        row.push(Value::text(borough));
        data.push_row(row)?;
    }
    debug!("Read {} rows from {}", data.len(), path.display());
    Ok(data)
}

/// Stacks datasets, unioning their columns in first-seen order. Cells a
/// dataset does not have are `Null`.
pub fn concat(frames: Vec<Dataset>) -> Result<Dataset> {
    let mut columns: Vec<String> = Vec::new();
    for frame in &frames {
        for column in frame.columns() {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }

    let mut combined = Dataset::new(columns.clone());
    for frame in frames {
        let positions: Vec<Option<usize>> = columns.iter().map(|c| frame.column_index(c)).collect();
        let (_, rows) = frame.into_parts();
        for row in rows {
            let out = positions
                .iter()
                .map(|p| p.map(|i| row[i].clone()).unwrap_or(Value::Null))
                .collect();
            combined.push_row(out)?;
        }
    }
    Ok(combined)
}

/// Extracts every configured borough file and combines them.
#[instrument(skip_all, fields(sources = config.sources.len()))]
pub fn extract_house_prices(config: &ExtractConfig) -> Result<Dataset> {
    let start = Instant::now();

    let frames = config
        .sources
        .iter()
        .map(|source| load_one(&source.borough, &config.data_dir.join(&source.file)))
        .collect::<Result<Vec<_>>>()?;
    let combined = concat(frames)?;

    let elapsed = start.elapsed().as_secs_f64();
    log_extract_success(&combined, elapsed, config.expected_secs_per_row);
    counter!("house_prices_rows_extracted_total").increment(combined.len() as u64);
    histogram!("house_prices_extract_duration_seconds").record(elapsed);

    Ok(combined)
}

fn log_extract_success(data: &Dataset, elapsed: f64, expected_rate: f64) {
    info!("Data extraction successful for {}!", TYPE_DESCRIPTION);
    info!("Extracted {} rows and {} columns", data.len(), data.width());
    info!("Execution time: {} seconds", elapsed);

    if data.is_empty() {
        return;
    }
    let per_row = elapsed / data.len() as f64;
    if per_row <= expected_rate {
        info!("Execution time per row: {} seconds", per_row);
    } else {
        warn!("Execution time per row exceeds {}: {} seconds", expected_rate, per_row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_one_tags_borough_and_nulls_empty_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("brent.csv");
        fs::write(&path, "price_paid,deed_date,postcode\n100,2020-01-01,\n").unwrap();

        let data = load_one("Brent", &path).unwrap();

        assert_eq!(data.columns().last().map(String::as_str), Some("borough"));
        assert_eq!(data.value(0, "postcode"), Some(&Value::Null));
        assert_eq!(data.value(0, "borough"), Some(&Value::text("Brent")));
    }

    #[test]
    fn test_headers_are_normalized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hackney.csv");
        fs::write(&path, "Price_Paid, Deed_Date ,POSTCODE\n100,2020-01-01,E8 1AA\n").unwrap();

        let data = load_one("Hackney", &path).unwrap();

        assert_eq!(data.columns(), &["price_paid", "deed_date", "postcode", "borough"]);
    }

    #[test]
    fn test_mixed_case_headers_across_files_share_columns() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "price_paid,postcode\n1,E8 1AA\n").unwrap();
        fs::write(dir.path().join("b.csv"), "PRICE_PAID,Postcode\n2,NW10 4XY\n").unwrap();
        let config = ExtractConfig {
            data_dir: dir.path().to_path_buf(),
            sources: vec![
                BoroughSource { borough: "Hackney".into(), file: "a.csv".into() },
                BoroughSource { borough: "Brent".into(), file: "b.csv".into() },
            ],
            expected_secs_per_row: EXPECTED_PER_ROW,
        };

        let data = extract_house_prices(&config).unwrap();

        assert_eq!(data.width(), 3);
        assert_eq!(data.value(1, "price_paid"), Some(&Value::text("2")));
        assert_eq!(data.value(1, "postcode"), Some(&Value::text("NW10 4XY")));
    }

    #[test]
    fn test_concat_unions_columns() {
        let a = Dataset::from_rows(vec!["x".into()], vec![vec![Value::text("1")]]).unwrap();
        let b = Dataset::from_rows(
            vec!["y".into(), "x".into()],
            vec![vec![Value::text("2"), Value::text("3")]],
        )
        .unwrap();

        let combined = concat(vec![a, b]).unwrap();

        assert_eq!(combined.columns(), &["x".to_string(), "y".to_string()]);
        assert_eq!(combined.rows()[0], vec![Value::text("1"), Value::Null]);
        assert_eq!(combined.rows()[1], vec![Value::text("3"), Value::text("2")]);
    }

    #[test]
    fn test_extract_reads_all_sources() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "price_paid\n1\n2\n").unwrap();
        fs::write(dir.path().join("b.csv"), "price_paid\n3\n").unwrap();
        let config = ExtractConfig {
            data_dir: dir.path().to_path_buf(),
            sources: vec![
                BoroughSource { borough: "Hackney".into(), file: "a.csv".into() },
                BoroughSource { borough: "Brent".into(), file: "b.csv".into() },
            ],
            expected_secs_per_row: EXPECTED_PER_ROW,
        };

        let data = extract_house_prices(&config).unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(data.value(2, "borough"), Some(&Value::text("Brent")));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let config = ExtractConfig {
            data_dir: PathBuf::from("/nonexistent"),
            sources: vec![BoroughSource { borough: "Brent".into(), file: "x.csv".into() }],
            expected_secs_per_row: EXPECTED_PER_ROW,
        };
        assert!(extract_house_prices(&config).is_err());
    }
}
