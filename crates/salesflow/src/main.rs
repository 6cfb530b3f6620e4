use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use salesflow_core::config::{
    ObjectStoreBackend, RunConfig, WarehouseBackend, DEFAULT_CONFIG_PATH,
};
use salesflow_core::db::{SqlxMySqlClient, SqlxPostgresClient, TiberiusClient};
use salesflow_core::model::{SourceDescriptor, SourceLocation};
use salesflow_core::object_store::{LocalObjectStore, ObjectStore, S3ObjectStore, StagingArea};
use salesflow_core::readers::{ReaderKey, ReaderRegistry};
use salesflow_core::warehouse::{ParquetWarehouse, PostgresWarehouse, Warehouse};
use salesflow_core::{run_pipeline, RunContext};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Daily multi-source sales ETL", long_about = None)]
struct Cli {
    /// Path to the run configuration
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Use the built-in deployment defaults when the config file is absent
    #[arg(long, global = true)]
    defaults: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, transform and append one day of sales
    Run(RunArgs),
    /// Validate configuration and show how each source will be read
    Check,
    /// Print the conversion table
    Rates,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Run identifier supplied by the scheduler
    #[arg(long)]
    run_id: Option<String>,
    /// Logical date of the scheduled interval (YYYY-MM-DD)
    #[arg(long)]
    logical_date: Option<NaiveDate>,
    /// Run every stage but skip the warehouse append
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(&cli.config, cli.defaults)?;

    match cli.command {
        Command::Run(args) => handle_run(config, args).await,
        Command::Check => handle_check(&config),
        Command::Rates => {
            handle_rates(&config);
            Ok(())
        }
    }
}

fn load_config(path: &Path, defaults: bool) -> Result<RunConfig> {
    if path.exists() {
        return RunConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()));
    }
    if defaults {
        info!(path = %path.display(), "config file not found, using built-in defaults");
        return RunConfig::builtin().context("built-in configuration is invalid");
    }
    bail!(
        "config file {} not found (pass --defaults to use the built-in deployment)",
        path.display()
    )
}

async fn handle_run(config: RunConfig, args: RunArgs) -> Result<()> {
    let run_id = args.run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut context = RunContext::new(run_id.clone()).dry_run(args.dry_run);
    if let Some(date) = args.logical_date {
        context = context.with_logical_date(date);
    }

    let store: Arc<dyn ObjectStore> = match config.object_store.backend {
        ObjectStoreBackend::Local => Arc::new(LocalObjectStore::new(&config.object_store.root)),
        ObjectStoreBackend::S3 => Arc::new(
            S3ObjectStore::new(&config.object_store)
                .await
                .context("failed to configure object store")?,
        ),
    };
    let staging = Arc::new(
        StagingArea::new(config.staging.dir.as_deref())
            .context("failed to create staging directory")?,
    );

    let readers = ReaderRegistry::new()
        .with_file_readers(store, staging)
        .with_database_client(Arc::new(SqlxMySqlClient::new(config.connections.clone())))
        .with_database_client(Arc::new(SqlxPostgresClient::new(
            config.connections.clone(),
        )))
        .with_database_client(Arc::new(TiberiusClient::new(config.connections.clone())));

    let warehouse: Box<dyn Warehouse> = match config.warehouse.backend {
        WarehouseBackend::Parquet => {
            Box::new(ParquetWarehouse::new(&config.warehouse.root).with_run_id(run_id.clone()))
        }
        WarehouseBackend::Postgres => {
            let var = &config.warehouse.url_env;
            let url = std::env::var(var).with_context(|| format!("{var} must be set"))?;
            Box::new(
                PostgresWarehouse::connect(&url)
                    .await
                    .context("failed to connect to warehouse")?,
            )
        }
    };

    info!(
        run_id = %run_id,
        sources = config.sources.len(),
        destination = %config.destination,
        warehouse = warehouse.name(),
        "starting run"
    );

    let summary = run_pipeline(&config, &readers, warehouse.as_ref(), &context)
        .await
        .with_context(|| format!("run {run_id} failed"))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn handle_check(config: &RunConfig) -> Result<()> {
    let mut sources = Table::new();
    sources.set_header(vec!["Source", "Reader", "Columns", "Status"]);

    let mut problems = 0;
    for source in &config.sources {
        let (reader, status) = source_status(config, source);
        if status.is_err() {
            problems += 1;
        }
        sources.add_row(vec![
            source.name(),
            reader,
            format!("{:?}", source.columns).to_lowercase(),
            status.err().unwrap_or_else(|| "ok".to_string()),
        ]);
    }
    println!("{sources}");

    let mut run = Table::new();
    run.set_header(vec!["Setting", "Value"]);
    run.add_row(vec!["destination".to_string(), config.destination.to_string()]);
    run.add_row(vec![
        "columns".to_string(),
        config.schema.column_names().join(", "),
    ]);
    run.add_row(vec![
        "object store".to_string(),
        format!("{:?}", config.object_store.backend).to_lowercase(),
    ]);
    run.add_row(vec![
        "warehouse".to_string(),
        format!("{:?}", config.warehouse.backend).to_lowercase(),
    ]);
    run.add_row(vec![
        "schedule".to_string(),
        format!(
            "{} ({} retries, {}s delay, catchup {})",
            config.schedule.interval,
            config.schedule.retries,
            config.schedule.retry_delay_secs,
            config.schedule.catchup
        ),
    ]);
    println!("{run}");

    if problems > 0 {
        bail!("{problems} source(s) cannot be read");
    }
    Ok(())
}

/// Reader resolution for one source, and whether it can be read as configured.
fn source_status(config: &RunConfig, source: &SourceDescriptor) -> (String, Result<(), String>) {
    let reader = match ReaderKey::for_source(source) {
        Ok(key) => key.to_string(),
        Err(err) => return ("-".to_string(), Err(err.to_string())),
    };
    if let SourceLocation::Database { connection, .. } = &source.location {
        if let Err(message) = config.connection(connection).resolve_url(connection) {
            return (reader, Err(message));
        }
    }
    (reader, Ok(()))
}

fn handle_rates(config: &RunConfig) {
    let mut table = Table::new();
    table.set_header(vec!["Country", "Multiplier"]);
    for (country, rate) in config.rates.entries() {
        table.add_row(vec![country.to_string(), rate.to_string()]);
    }
    println!("{table}");
    println!("Countries not listed convert at 1.");
}
