use anyhow::Result;
use chrono::NaiveDate;
use house_prices::config::Config;
use house_prices::enrich::{EnrichmentConfig, Enricher};
use house_prices::etl;
use house_prices::extract::{BoroughSource, ExtractConfig, EXPECTED_PER_ROW};
use house_prices::load::{ConflictPolicy, CreateOutcome, LoadConfig, Loader};
use house_prices::report;
use house_prices::storage::{SqliteStore, Store};
use house_prices::{Dataset, EtlError, Value};
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

const TABLE: &str = "clean_house_prices";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn temp_store() -> (TempDir, SqliteStore) {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("prices.db")).unwrap();
    (dir, store)
}

fn load_config(policy: ConflictPolicy, key: &[&str]) -> LoadConfig {
    LoadConfig {
        table: TABLE.to_string(),
        policy,
        key: key.iter().map(|k| k.to_string()).collect(),
        replace: false,
    }
}

fn date(y: i32, m: u32, d: u32) -> Value {
    Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn sales() -> Dataset {
    Dataset::from_rows(
        vec!["price".into(), "date".into(), "postcode".into(), "address".into(), "borough".into()],
        vec![
            vec![Value::Number(250000.0), date(2020, 1, 15), Value::text("E8 1AA"), Value::text("12 Mare St"), Value::text("Hackney")],
            vec![Value::Number(300000.0), date(2021, 6, 1), Value::text("E8 1AA"), Value::text("12 Mare St"), Value::text("Hackney")],
            vec![Value::Number(500000.0), date(2019, 11, 20), Value::text("NW10 4XY"), Value::text("3 High Rd"), Value::text("Brent")],
        ],
    )
    .unwrap()
}

fn prices(store: &mut dyn Store) -> Vec<f64> {
    store
        .query(&format!("SELECT price FROM {TABLE} ORDER BY date"), &[])
        .unwrap()
        .iter()
        .filter_map(|r| r[0].as_number())
        .collect()
}

fn object_exists(store: &mut dyn Store, kind: &str, name: &str) -> bool {
    let rows = store
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
            &[Value::text(kind), Value::text(name)],
        )
        .unwrap();
    rows[0][0].as_number() == Some(1.0)
}

#[test]
fn test_first_load_creates_table_and_enriches() -> Result<()> {
    let (_dir, mut store) = temp_store();
    let loader = Loader::new(&load_config(ConflictPolicy::IgnoreDuplicates, &["date", "postcode", "price", "borough"]), Enricher::default())?;

    let report = loader.load(&mut store, &sales())?;

    assert_eq!(report.outcome, CreateOutcome::Created);
    assert_eq!(report.rows_offered, 3);
    assert_eq!(report.rows_written, 3);
    assert_eq!(store.count_rows(TABLE)?, 3);
    assert!(object_exists(&mut store, "index", "idx_clean_house_prices_postcode"));
    assert!(object_exists(&mut store, "index", "idx_clean_house_prices_borough"));
    assert!(object_exists(&mut store, "view", "v_avg_price_outcode"));
    assert!(object_exists(&mut store, "view", "v_flips_24m"));
    Ok(())
}

#[test]
fn test_ignore_duplicates_reload_leaves_count_unchanged() -> Result<()> {
    let (_dir, mut store) = temp_store();
    let loader = Loader::new(&load_config(ConflictPolicy::IgnoreDuplicates, &["date", "postcode", "price", "borough"]), Enricher::default())?;

    loader.load(&mut store, &sales())?;
    let mut changed = sales();
    changed.map_column("address", |_| Value::text("somewhere else"));
    let second = loader.load(&mut store, &changed)?;

    assert_eq!(second.outcome, CreateOutcome::AlreadyExists);
    assert_eq!(second.rows_written, 0);
    assert_eq!(store.count_rows(TABLE)?, 3);
    let addresses = store.query(&format!("SELECT DISTINCT address FROM {TABLE}"), &[])?;
    assert!(addresses.iter().all(|r| r[0] != Value::text("somewhere else")));
    Ok(())
}

#[test]
fn test_upsert_reload_updates_changed_price_only() -> Result<()> {
    let (_dir, mut store) = temp_store();
    let loader = Loader::new(&load_config(ConflictPolicy::Upsert, &["date", "postcode", "address", "borough"]), Enricher::default())?;

    loader.load(&mut store, &sales())?;
    let mut changed = sales();
    let mut seen = false;
    changed.map_column("price", |v| {
        if !seen && *v == Value::Number(300000.0) {
            seen = true;
            Value::Number(315000.0)
        } else {
            v.clone()
        }
    });
    let second = loader.load(&mut store, &changed)?;

    assert_eq!(second.outcome, CreateOutcome::AlreadyExists);
    assert_eq!(store.count_rows(TABLE)?, 3);
    assert_eq!(prices(&mut store), vec![500000.0, 250000.0, 315000.0]);
    Ok(())
}

#[test]
fn test_in_batch_key_collision_follows_policy() -> Result<()> {
    let (_dir, mut store) = temp_store();
    let loader = Loader::new(&load_config(ConflictPolicy::IgnoreDuplicates, &["date", "postcode", "price"]), Enricher::default())?;
    let data = Dataset::from_rows(
        vec!["price".into(), "date".into(), "postcode".into(), "address".into(), "borough".into()],
        vec![
            vec![Value::Number(1.0), date(2020, 1, 1), Value::text("E1 1AA"), Value::text("first"), Value::text("Hackney")],
            vec![Value::Number(1.0), date(2020, 1, 1), Value::text("E1 1AA"), Value::text("second"), Value::text("Hackney")],
        ],
    )?;

    let report = loader.load(&mut store, &data)?;

    assert_eq!(report.outcome, CreateOutcome::Created);
    assert_eq!(report.rows_written, 1);
    let kept = store.query(&format!("SELECT address FROM {TABLE}"), &[])?;
    assert_eq!(kept, vec![vec![Value::text("first")]]);
    Ok(())
}

fn unaddressed_sale(borough: &str) -> Dataset {
    Dataset::from_rows(
        vec!["price".into(), "date".into(), "postcode".into(), "address".into(), "borough".into()],
        vec![vec![Value::Number(410000.0), date(2022, 3, 4), Value::text("E8 4DD"), Value::Null, Value::text(borough)]],
    )
    .unwrap()
}

#[test]
fn test_null_key_column_reload_is_a_duplicate() -> Result<()> {
    let (_dir, mut store) = temp_store();
    let loader = Loader::new(&load_config(ConflictPolicy::IgnoreDuplicates, &["date", "postcode", "address", "price"]), Enricher::default())?;

    let first = loader.load(&mut store, &unaddressed_sale("Hackney"))?;
    let second = loader.load(&mut store, &unaddressed_sale("Hackney"))?;

    assert_eq!(first.rows_written, 1);
    assert_eq!(second.rows_written, 0);
    assert_eq!(store.count_rows(TABLE)?, 1);
    Ok(())
}

#[test]
fn test_upsert_matches_rows_with_null_key_column() -> Result<()> {
    let (_dir, mut store) = temp_store();
    let loader = Loader::new(&load_config(ConflictPolicy::Upsert, &["date", "postcode", "address", "price"]), Enricher::default())?;

    loader.load(&mut store, &unaddressed_sale("Hackney"))?;
    loader.load(&mut store, &unaddressed_sale("Islington"))?;

    assert_eq!(store.count_rows(TABLE)?, 1);
    let stored = store.query(&format!("SELECT borough, address FROM {TABLE}"), &[])?;
    assert_eq!(stored, vec![vec![Value::text("Islington"), Value::Null]]);
    Ok(())
}

#[test]
fn test_failed_row_rolls_back_whole_batch() -> Result<()> {
    let (_dir, mut store) = temp_store();
    store.execute_script(&[
        format!(
            "CREATE TABLE {TABLE} (price REAL CHECK (price < 400000), date TEXT, postcode TEXT, \
             address TEXT, borough TEXT)"
        ),
        format!(
            "CREATE UNIQUE INDEX uq_{TABLE}_key ON {TABLE} (coalesce(date, ''), coalesce(postcode, ''), \
             coalesce(price, ''), coalesce(borough, ''))"
        ),
    ])?;
    let loader = Loader::new(&load_config(ConflictPolicy::IgnoreDuplicates, &["date", "postcode", "price", "borough"]), Enricher::default())?;

    let err = loader.load(&mut store, &sales()).unwrap_err();

    assert!(matches!(err, EtlError::Load { ref stage, ref table, .. } if stage == "ignore_duplicates" && table == TABLE));
    assert_eq!(store.count_rows(TABLE)?, 0);
    Ok(())
}

#[test]
fn test_missing_key_column_is_structural() -> Result<()> {
    let (_dir, mut store) = temp_store();
    let loader = Loader::new(&load_config(ConflictPolicy::Upsert, &["date", "postcode", "transaction_category"]), Enricher::default())?;

    let err = loader.load(&mut store, &sales()).unwrap_err();

    assert!(matches!(err, EtlError::Structure { .. }));
    assert!(!store.table_exists(TABLE)?);
    Ok(())
}

#[test]
fn test_enrichment_failure_keeps_loaded_rows() -> Result<()> {
    let (_dir, mut store) = temp_store();
    let enricher = Enricher::new(EnrichmentConfig {
        avg_price_outcode_sql: None,
        flips_sql: Some(fixture("broken_view.sql")),
    });
    let loader = Loader::new(&load_config(ConflictPolicy::IgnoreDuplicates, &["date", "postcode", "price", "borough"]), enricher)?;

    let err = loader.load(&mut store, &sales()).unwrap_err();

    assert!(err.is_enrichment_failure());
    assert!(matches!(err, EtlError::Enrichment { loaded_rows: 3, .. }));
    assert_eq!(store.count_rows(TABLE)?, 3);
    // The whole enrichment transaction is rolled back
    assert!(!object_exists(&mut store, "index", "idx_clean_house_prices_postcode"));
    assert!(!object_exists(&mut store, "view", "v_avg_price_outcode"));
    Ok(())
}

#[test]
fn test_replace_drops_and_recreates() -> Result<()> {
    let (_dir, mut store) = temp_store();
    let mut config = load_config(ConflictPolicy::IgnoreDuplicates, &["date", "postcode", "price", "borough"]);
    Loader::new(&config, Enricher::default())?.load(&mut store, &sales())?;

    config.replace = true;
    let data = Dataset::from_rows(sales().columns().to_vec(), sales().rows()[..1].to_vec())?;
    let report = Loader::new(&config, Enricher::default())?.load(&mut store, &data)?;

    assert_eq!(report.outcome, CreateOutcome::Created);
    assert_eq!(store.count_rows(TABLE)?, 1);
    Ok(())
}

#[test]
fn test_full_run_feeds_dashboard_reports() -> Result<()> {
    let (_dir, mut store) = temp_store();
    let config = Config {
        extract: ExtractConfig {
            data_dir: fixture(""),
            sources: vec![
                BoroughSource { borough: "Hackney".into(), file: "unclean_hackney.csv".into() },
                BoroughSource { borough: "Brent".into(), file: "unclean_brent.csv".into() },
            ],
            expected_secs_per_row: EXPECTED_PER_ROW,
        },
        ..Config::default()
    };

    let summary = etl::run(&config, &mut store, Uuid::new_v4())?;

    assert_eq!(summary.extracted_rows, 8);
    assert_eq!(summary.clean.output_rows, 3);
    assert_eq!(summary.load.rows_written, 3);
    assert_eq!(summary.load.enrichment.views, vec!["v_avg_price_outcode", "v_flips_24m"]);

    let outcodes = report::avg_price_by_outcode(&mut store, 10)?;
    assert_eq!(outcodes.len(), 2);
    assert_eq!(outcodes[0].outcode, "NW10");
    assert_eq!(outcodes[1].outcode, "E8");
    assert_eq!(outcodes[1].avg_price, 275000.0);
    assert_eq!(outcodes[1].n_sales, 2);

    let flips = report::top_flips(&mut store, 5)?;
    assert_eq!(flips.len(), 1);
    assert_eq!(flips[0].address, "FLAT 1, 12 MARE STREET");
    assert_eq!(flips[0].sale_date, NaiveDate::from_ymd_opt(2020, 1, 15));
    assert_eq!(flips[0].next_price, 300000.0);
    assert_eq!(flips[0].pct_gain, 20.0);

    let boroughs = report::borough_summary(&mut store, TABLE)?;
    assert_eq!(boroughs.iter().map(|b| b.n_sales).sum::<u64>(), 3);

    // Second run over the same files adds nothing
    let again = etl::run(&config, &mut store, Uuid::new_v4())?;
    assert_eq!(again.load.outcome, CreateOutcome::AlreadyExists);
    assert_eq!(again.load.rows_written, 0);
    assert_eq!(store.count_rows(TABLE)?, 3);
    Ok(())
}
