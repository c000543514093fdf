use crate::constants::KEEP_AND_RENAME;
use crate::types::Dataset;
use tracing::warn;

/// Trimmed, lower-cased column name.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Position of the first raw column whose normalized name equals `name`.
pub fn find_raw_column(data: &Dataset, name: &str) -> Option<usize> {
    data.columns()
        .iter()
        .position(|c| normalize_column_name(c) == name)
}

/// Keeps the expected columns that are present and renames them to their
/// canonical names, in mapping order. Anything else is dropped.
///
/// Missing expected columns are returned (sorted) and logged; they never fail
/// the stage. Row count is unchanged.
pub fn select_and_rename(data: Dataset) -> (Dataset, Vec<String>) {
    let mut picks = Vec::new();
    let mut missing = Vec::new();

    for (raw, canonical) in KEEP_AND_RENAME {
        match find_raw_column(&data, raw) {
            Some(idx) => picks.push((idx, canonical.to_string())),
            None => missing.push(raw.to_string()),
        }
    }

    missing.sort();
    if !missing.is_empty() {
        warn!("Missing cols: {}", missing.join(", "));
    }

    (data.project(&picks), missing)
}
