//! Read-only queries behind the dashboard pages.

use crate::constants::{
    ADDRESS, BOROUGH, DATE, ESTATE_TYPE, NEW_BUILD, POSTCODE, PRICE, PROPERTY_TYPE, TRANSACTION_CATEGORY,
    VIEW_AVG_PRICE_OUTCODE, VIEW_FLIPS_24M,
};
use crate::error::{EtlError, Result};
use crate::storage::{quote_ident, Backend, Store};
use crate::types::{CleanRecord, Dataset, Value};
use chrono::NaiveDate;
use serde::Serialize;

const RECORD_COLUMNS: [&str; 9] = [
    PRICE,
    DATE,
    POSTCODE,
    PROPERTY_TYPE,
    NEW_BUILD,
    ESTATE_TYPE,
    ADDRESS,
    BOROUGH,
    TRANSACTION_CATEGORY,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcodeSummary {
    pub outcode: String,
    pub avg_price: f64,
    pub n_sales: u64,
}

/// A repeat sale of the same address within 24 months.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flip {
    pub postcode: String,
    pub address: String,
    pub sale_date: Option<NaiveDate>,
    pub next_date: Option<NaiveDate>,
    pub sale_price: f64,
    pub next_price: f64,
    pub months_between: f64,
    pub pct_gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoroughSummary {
    pub borough: String,
    pub n_sales: u64,
    pub avg_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySales {
    /// `YYYY-MM`
    pub month: String,
    pub borough: String,
    pub n_sales: u64,
    pub avg_price: f64,
}

fn run(store: &mut dyn Store, target: &str, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
    store.query(sql, params).map_err(|source| EtlError::Query {
        target: target.to_string(),
        source,
    })
}

fn text(value: &Value) -> String {
    value.to_display().unwrap_or_default()
}

fn number(value: &Value) -> f64 {
    value.as_number().unwrap_or(0.0)
}

fn count(value: &Value) -> u64 {
    value.as_number().map(|n| n as u64).unwrap_or(0)
}

/// Outward codes by average sale price, most expensive first.
pub fn avg_price_by_outcode(store: &mut dyn Store, limit: usize) -> Result<Vec<OutcodeSummary>> {
    let sql = format!(
        "SELECT outcode, avg_price, n_sales FROM {VIEW_AVG_PRICE_OUTCODE} \
         ORDER BY avg_price DESC LIMIT {limit}"
    );
    let rows = run(store, VIEW_AVG_PRICE_OUTCODE, &sql, &[])?;
    Ok(rows
        .iter()
        .map(|r| OutcodeSummary {
            outcode: text(&r[0]),
            avg_price: number(&r[1]),
            n_sales: count(&r[2]),
        })
        .collect())
}

/// Flips with the largest percentage gain first.
pub fn top_flips(store: &mut dyn Store, limit: usize) -> Result<Vec<Flip>> {
    let sql = format!(
        "SELECT postcode, address, sale_date, next_date, sale_price, next_price, months_between, pct_gain \
         FROM {VIEW_FLIPS_24M} ORDER BY pct_gain DESC LIMIT {limit}"
    );
    let rows = run(store, VIEW_FLIPS_24M, &sql, &[])?;
    Ok(rows
        .iter()
        .map(|r| Flip {
            postcode: text(&r[0]),
            address: text(&r[1]),
            sale_date: r[2].to_date(),
            next_date: r[3].to_date(),
            sale_price: number(&r[4]),
            next_price: number(&r[5]),
            months_between: number(&r[6]),
            pct_gain: number(&r[7]),
        })
        .collect())
}

pub fn borough_summary(store: &mut dyn Store, table: &str) -> Result<Vec<BoroughSummary>> {
    let sql = format!(
        "SELECT borough, COUNT(*) AS n_sales, AVG(price) AS avg_price FROM {} \
         GROUP BY borough ORDER BY borough",
        quote_ident(table)
    );
    let rows = run(store, table, &sql, &[])?;
    Ok(rows
        .iter()
        .map(|r| BoroughSummary {
            borough: text(&r[0]),
            n_sales: count(&r[1]),
            avg_price: number(&r[2]),
        })
        .collect())
}

pub fn monthly_sales(store: &mut dyn Store, table: &str) -> Result<Vec<MonthlySales>> {
    let month = match store.backend() {
        Backend::Sqlite => "substr(date, 1, 7)",
        Backend::Postgres => "to_char(date, 'YYYY-MM')",
    };
    let sql = format!(
        "SELECT {month} AS month, borough, COUNT(*) AS n_sales, AVG(price) AS avg_price FROM {} \
         WHERE date IS NOT NULL GROUP BY month, borough ORDER BY month, borough",
        quote_ident(table)
    );
    let rows = run(store, table, &sql, &[])?;
    Ok(rows
        .iter()
        .map(|r| MonthlySales {
            month: text(&r[0]),
            borough: text(&r[1]),
            n_sales: count(&r[2]),
            avg_price: number(&r[3]),
        })
        .collect())
}

/// Transactions whose postcode starts with `prefix`, newest first.
pub fn search_postcode(store: &mut dyn Store, table: &str, prefix: &str) -> Result<Vec<CleanRecord>> {
    let placeholder = store.backend().placeholder(1);
    let sql = format!(
        "SELECT {} FROM {} WHERE postcode LIKE {placeholder} ORDER BY date DESC",
        RECORD_COLUMNS.map(quote_ident).join(", "),
        quote_ident(table)
    );
    let pattern = format!("{}%", prefix.trim().to_uppercase());
    let rows = run(store, table, &sql, &[Value::Text(pattern)])?;

    let columns = RECORD_COLUMNS.iter().map(|c| c.to_string()).collect();
    Ok(Dataset::from_rows(columns, rows)?.records())
}
