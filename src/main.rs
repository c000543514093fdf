use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use house_prices::config::{setup_env, Config, DbConfig, DB_ENV_PREFIX};
use house_prices::enrich::Enricher;
use house_prices::etl;
use house_prices::logging;
use house_prices::report;
use house_prices::storage::{open_store, StoreTarget};
use std::path::PathBuf;
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_SQLITE_PATH: &str = "data/house_prices.db";

#[derive(Parser)]
#[command(name = "house_prices")]
#[command(about = "London borough house-price ETL")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Environment name; loads .env.<env>
    #[arg(long, global = true)]
    env: Option<String>,

    /// Use a local SQLite database instead of PostgreSQL
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = DEFAULT_SQLITE_PATH)]
    sqlite: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, clean, load and enrich
    Run,
    /// Extract and clean, writing the result as JSON
    Clean {
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Rebuild indexes and views on the loaded table
    Enrich,
    /// Print a report from the loaded table
    Report {
        #[arg(value_enum)]
        kind: ReportKind,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Postcode prefix for the `postcode` report
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKind {
    Outcodes,
    Flips,
    Boroughs,
    Monthly,
    Postcode,
}

fn store_target(sqlite: Option<PathBuf>) -> anyhow::Result<StoreTarget> {
    if let Some(path) = sqlite {
        return Ok(StoreTarget::Sqlite(path));
    }
    if cfg!(feature = "postgres") {
        Ok(StoreTarget::Postgres(DbConfig::from_env(DB_ENV_PREFIX)?))
    } else {
        info!("Built without PostgreSQL support, using {}", DEFAULT_SQLITE_PATH);
        Ok(StoreTarget::Sqlite(DEFAULT_SQLITE_PATH.into()))
    }
}

fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let cli = Cli::parse();
    setup_env(cli.env.as_deref());
    let config = Config::resolve(cli.config.as_deref()).context("loading configuration")?;

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("etl_run", run_id = %run_id);
    let _enter = span.enter();

    match cli.command {
        Commands::Run => {
            println!("🚀 Running full pipeline (extract + clean + load)...");
            let target = store_target(cli.sqlite)?;
            let mut store = open_store(&target)?;

            match etl::run(&config, store.as_mut(), run_id) {
                Ok(summary) => {
                    println!("\n📊 Pipeline Results:");
                    println!("   Extracted rows: {}", summary.extracted_rows);
                    println!("   Clean rows: {}", summary.clean.output_rows);
                    println!("   Table: {} ({:?})", summary.load.table, summary.load.outcome);
                    println!("   Rows written: {}", summary.load.rows_written);
                    println!("   Views: {}", summary.load.enrichment.views.join(", "));
                    println!("✅ Full pipeline completed successfully!");
                    store.close()?;
                }
                Err(e) if e.is_enrichment_failure() => {
                    error!("Enrichment failed: {}", e);
                    println!("⚠️  Data loaded, but enrichment failed: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    println!("❌ Pipeline failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Clean { output_dir } => {
            println!("🧹 Running extract + clean...");
            let outcome = etl::extract_and_clean(&config)?;
            for stage in &outcome.report.stages {
                println!("   {:<32} -{}", stage.stage.name(), stage.removed());
            }
            let path = etl::write_clean_output(&outcome, &output_dir)?;
            println!("✅ {} clean rows written to {}", outcome.data.len(), path.display());
        }
        Commands::Enrich => {
            println!("🔨 Rebuilding indexes and views on {}...", config.load.table);
            let mut store = open_store(&store_target(cli.sqlite)?)?;
            let enricher = Enricher::new(config.enrichment.clone());
            let report = enricher
                .enrich(store.as_mut(), &config.load.table)
                .with_context(|| format!("enriching {}", config.load.table))?;
            println!("✅ Indexes: {}", report.indexes.join(", "));
            println!("✅ Views: {}", report.views.join(", "));
            store.close()?;
        }
        Commands::Report { kind, limit, prefix } => {
            let mut handle = open_store(&store_target(cli.sqlite)?)?;
            let store = handle.as_mut();
            let table = config.load.table.as_str();
            match kind {
                ReportKind::Outcodes => {
                    println!("🏘️  Average price by outward code:");
                    for row in report::avg_price_by_outcode(store, limit)? {
                        println!("   {:<8} £{:>12.0}  ({} sales)", row.outcode, row.avg_price, row.n_sales);
                    }
                }
                ReportKind::Flips => {
                    println!("🔁 Top property flips within 24 months:");
                    for flip in report::top_flips(store, limit)? {
                        println!(
                            "   {:+.1}%  {}, {}  £{:.0} → £{:.0} in {:.1} months",
                            flip.pct_gain, flip.address, flip.postcode, flip.sale_price, flip.next_price, flip.months_between
                        );
                    }
                }
                ReportKind::Boroughs => {
                    println!("🗺️  Borough breakdown:");
                    for row in report::borough_summary(store, table)? {
                        println!("   {:<24} {:>7} sales  avg £{:.0}", row.borough, row.n_sales, row.avg_price);
                    }
                }
                ReportKind::Monthly => {
                    println!("📅 Monthly sales:");
                    for row in report::monthly_sales(store, table)? {
                        println!("   {}  {:<24} {:>6}  avg £{:.0}", row.month, row.borough, row.n_sales, row.avg_price);
                    }
                }
                ReportKind::Postcode => {
                    let prefix = prefix.context("the postcode report needs --prefix")?;
                    let records = report::search_postcode(store, table, &prefix)?;
                    println!("🔎 {} transactions under {}:", records.len(), prefix.trim().to_uppercase());
                    for record in records.iter().take(limit) {
                        println!("{}", serde_json::to_string(record)?);
                    }
                }
            }
            handle.close()?;
        }
    }
    Ok(())
}
