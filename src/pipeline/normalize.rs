use crate::constants::{estate_type_label, property_type_label, DATE, ESTATE_TYPE, PRICE, PROPERTY_TYPE};
use crate::types::{Dataset, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Numeric coercion. Anything unparseable or non-finite becomes `Null`.
pub fn coerce_price(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_finite() => Value::Number(*n),
        Value::Text(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

/// Calendar-date coercion. Anything unparseable becomes `Null`.
pub fn coerce_date(value: &Value) -> Value {
    match value {
        Value::Date(d) => Value::Date(*d),
        Value::Text(s) => parse_date(s).map(Value::Date).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Converts `price` to a number and `date` to a calendar date when present.
/// Never changes the row count.
pub fn standardise_types(mut data: Dataset) -> Dataset {
    data.map_column(PRICE, coerce_price);
    data.map_column(DATE, coerce_date);
    data
}

fn map_code(value: &Value, lookup: fn(&str) -> Option<&'static str>) -> Value {
    match value {
        Value::Text(code) => lookup(code)
            .map(Value::text)
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

/// Replaces property and estate type codes with labels. Unknown codes and
/// absent columns are left alone.
pub fn map_codes(mut data: Dataset) -> Dataset {
    data.map_column(PROPERTY_TYPE, |v| map_code(v, property_type_label));
    data.map_column(ESTATE_TYPE, |v| map_code(v, estate_type_label));
    data
}
