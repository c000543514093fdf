use super::schema::find_raw_column;
use crate::constants::{
    DATE, MANDATORY_RAW_COLUMNS, NON_STANDARD_TRANSACTION, OTHER_PROPERTY_TYPE, PROPERTY_TYPE,
    TRANSACTION_CATEGORY,
};
use crate::error::{EtlError, Result};
use crate::types::{Dataset, Value};
use std::collections::HashSet;
use tracing::info;

/// Drops rows missing price_paid, deed_date or postcode, looked up by their
/// raw (pre-rename) names. Blank text counts as missing.
///
/// A mandatory column absent from the input altogether is a structural error.
pub fn remove_missing(mut data: Dataset) -> Result<Dataset> {
    let mut indexes = Vec::with_capacity(MANDATORY_RAW_COLUMNS.len());
    for name in MANDATORY_RAW_COLUMNS {
        let idx = find_raw_column(&data, name).ok_or_else(|| {
            EtlError::structure("remove_missing", format!("raw input has no {name} column"))
        })?;
        indexes.push(idx);
    }
    data.retain_rows(|row| indexes.iter().all(|i| !row[*i].is_missing()));
    Ok(data)
}

/// Drops rows whose mapped property type is "Other".
pub fn remove_other_types(mut data: Dataset) -> Dataset {
    if let Some(idx) = data.column_index(PROPERTY_TYPE) {
        data.retain_rows(|row| row[idx].as_text() != Some(OTHER_PROPERTY_TYPE));
    }
    data
}

/// Drops rows whose date failed to parse.
pub fn remove_invalid_dates(mut data: Dataset) -> Dataset {
    if let Some(idx) = data.column_index(DATE) {
        data.retain_rows(|row| matches!(row[idx], Value::Date(_)));
    }
    data
}

/// Drops rows with transaction category exactly "B". Missing categories stay.
pub fn remove_non_standard_transaction(mut data: Dataset) -> Dataset {
    if let Some(idx) = data.column_index(TRANSACTION_CATEGORY) {
        data.retain_rows(|row| row[idx].as_text() != Some(NON_STANDARD_TRANSACTION));
    }
    data
}

/// Keeps the first occurrence of every distinct row across all columns.
pub fn deduplicate(mut data: Dataset) -> Dataset {
    let before = data.len();
    let mut seen: HashSet<Vec<Value>> = HashSet::with_capacity(before);
    data.retain_rows(|row| seen.insert(row.to_vec()));
    info!("Removed {} duplicate rows", before - data.len());
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(name: &str, values: Vec<Value>) -> Dataset {
        Dataset::from_rows(
            vec![name.to_string()],
            values.into_iter().map(|v| vec![v]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_remove_missing() {
        let data = Dataset::from_rows(
            vec!["price_paid".into(), "deed_date".into(), "postcode".into()],
            vec![
                vec![Value::Number(100000.0), Value::text("2023-01-01"), Value::text("SW1A 1AA")],
                vec![Value::Null, Value::Null, Value::text("SW1A 1AB")],
                vec![Value::Number(2000.0), Value::text("2023-03-01"), Value::Null],
            ],
        )
        .unwrap();

        let result = remove_missing(data).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.value(0, "price_paid"), Some(&Value::Number(100000.0)));
    }

    #[test]
    fn test_remove_missing_uses_raw_names() {
        let data = Dataset::from_rows(
            vec![" Price_Paid".into(), "DEED_DATE ".into(), "postcode".into()],
            vec![
                vec![Value::text("  "), Value::text("2023-01-01"), Value::text("E1")],
                vec![Value::text("5"), Value::text("2023-01-01"), Value::text("E1")],
            ],
        )
        .unwrap();

        let result = remove_missing(data).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0][0], Value::text("5"));
    }

    #[test]
    fn test_remove_missing_requires_mandatory_columns() {
        let data = single("price_paid", vec![Value::text("1")]);
        let err = remove_missing(data).unwrap_err();
        assert!(matches!(err, EtlError::Structure { .. }));
    }

    #[test]
    fn test_remove_other_types() {
        let data = single(
            "property_type",
            vec![Value::text("Flat"), Value::text("Other"), Value::text("Detached")],
        );

        let cleaned = remove_other_types(data);

        let left: Vec<_> = cleaned.column_values("property_type").unwrap().cloned().collect();
        assert_eq!(left, vec![Value::text("Flat"), Value::text("Detached")]);
    }

    #[test]
    fn test_remove_non_standard_transaction() {
        let data = single(
            "transaction_category",
            vec![Value::text("A"), Value::text("B"), Value::text("C"), Value::Null],
        );

        let cleaned = remove_non_standard_transaction(data);

        let left: Vec<_> = cleaned
            .column_values("transaction_category")
            .unwrap()
            .cloned()
            .collect();
        assert_eq!(left, vec![Value::text("A"), Value::text("C"), Value::Null]);
    }

    #[test]
    fn test_remove_invalid_dates() {
        let d = chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let data = single("date", vec![Value::Date(d), Value::Null]);
        assert_eq!(remove_invalid_dates(data).len(), 1);
    }

    #[test]
    fn test_deduplicate() {
        let data = Dataset::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::Number(1.0), Value::Number(3.0)],
                vec![Value::Number(1.0), Value::Number(3.0)],
                vec![Value::Number(2.0), Value::Number(4.0)],
            ],
        )
        .unwrap();

        let out = deduplicate(data);

        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[1], vec![Value::Number(2.0), Value::Number(4.0)]);
    }

    #[test]
    fn test_deduplicate_keeps_rows_differing_in_one_column() {
        let data = Dataset::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::Number(1.0), Value::text("x")],
                vec![Value::Number(1.0), Value::Null],
            ],
        )
        .unwrap();

        assert_eq!(deduplicate(data).len(), 2);
    }
}
