use crate::constants::{ADDRESS, ADDRESS_PARTS};
use crate::error::Result;
use crate::types::{Dataset, Value};

/// Joins the present fragments as "saon, paon street". Blank fragments are
/// skipped; no fragments gives `None`.
pub fn compose_address(parts: &[Option<&Value>]) -> Option<String> {
    let parts: Vec<String> = parts
        .iter()
        .flatten()
        .filter_map(|v| v.to_display())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let (last, head) = parts.split_last()?;
    if head.is_empty() {
        Some(last.clone())
    } else {
        Some(format!("{} {}", head.join(", "), last))
    }
}

/// Adds `address` and drops saon/paon/street. Row count is unchanged.
pub fn build_address(mut data: Dataset) -> Result<Dataset> {
    let idx: Vec<Option<usize>> = ADDRESS_PARTS
        .iter()
        .map(|name| data.column_index(name))
        .collect();

    let addresses = data
        .rows()
        .iter()
        .map(|row| {
            let parts: Vec<Option<&Value>> = idx.iter().map(|i| i.map(|i| &row[i])).collect();
            compose_address(&parts).map(Value::Text).unwrap_or(Value::Null)
        })
        .collect();

    data.drop_columns(&ADDRESS_PARTS);
    data.add_column(ADDRESS, addresses)?;
    Ok(data)
}
