//! CLI entry point for the origin-destination demand pipeline.
//!
//! Provides subcommands to run the full pipeline into a sink, list the
//! services that drive the fan-out, and preview the final table.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use od_demand::config::{ConfigLayer, PipelineConfig, SinkConfig};
use od_demand::pipeline::executor::TokioExecutor;
use od_demand::pipeline::filter::filter_confirmed;
use od_demand::pipeline::{aggregate_tickets, run};
use od_demand::{sink, source::load_tickets};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "od_demand")]
#[command(about = "Historical demand and mean price per origin-destination and departure slot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SinkKind {
    Postgres,
    Csv,
    S3,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a ticket snapshot and replace the destination table
    Run {
        /// Path or s3:// URI of the ticket dataset (.parquet, .csv, .csv.gz)
        #[arg(short, long)]
        source: Option<String>,

        /// Destination table name
        #[arg(short, long)]
        table: Option<String>,

        /// Maximum number of partitions aggregated at once
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Where to write the final table (default: postgres)
        #[arg(long, value_enum)]
        sink: Option<SinkKind>,

        /// Directory for the csv sink
        #[arg(short = 'd', long, default_value = "output")]
        output_dir: String,

        /// Bucket for the s3 sink
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Key prefix for the s3 sink
        #[arg(long, default_value = "")]
        s3_prefix: String,

        /// Gzip compress the CSV uploaded by the s3 sink
        #[arg(long, default_value_t = false)]
        gzip: bool,

        /// Optional JSON config file; flags override its values
        #[arg(long)]
        config: Option<String>,
    },
    /// List the services with confirmed tickets
    Services {
        /// Path or s3:// URI of the ticket dataset
        #[arg(short, long)]
        source: String,
    },
    /// Compute the final table and log its first rows without writing it
    Preview {
        /// Path or s3:// URI of the ticket dataset
        #[arg(short, long)]
        source: String,

        /// Number of rows to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Maximum number of partitions aggregated at once
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/od_demand.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("od_demand.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            table,
            concurrency,
            sink,
            output_dir,
            s3_bucket,
            s3_prefix,
            gzip,
            config,
        } => {
            let sink = match sink {
                None => None,
                Some(SinkKind::Postgres) => Some(SinkConfig::postgres_from_env()?),
                Some(SinkKind::Csv) => Some(SinkConfig::Csv { dir: output_dir }),
                Some(SinkKind::S3) => Some(SinkConfig::S3 {
                    bucket: s3_bucket.context("--s3-bucket is required for the s3 sink")?,
                    prefix: s3_prefix,
                    gzip,
                }),
            };
            let flags = ConfigLayer {
                source,
                table_name: table,
                concurrency,
                sink,
            };
            let file = match config {
                Some(path) => ConfigLayer::load(&path)
                    .with_context(|| format!("failed to load config {path}"))?,
                None => ConfigLayer::default(),
            };
            let config = file.merged(flags).resolve(SinkConfig::postgres_from_env)?;

            run_pipeline(&config).await?;
        }
        Commands::Services { source } => {
            let tickets = load_tickets(&source).await?;
            let confirmed = filter_confirmed(&tickets);

            for service in &confirmed.services {
                info!(service = %service, "Service");
            }
            info!(
                services = confirmed.services.len(),
                confirmed = confirmed.tickets.len(),
                total = tickets.len(),
                "Service list summary"
            );
        }
        Commands::Preview {
            source,
            limit,
            concurrency,
        } => {
            let tickets = load_tickets(&source).await?;
            let executor =
                TokioExecutor::new(concurrency.unwrap_or_else(od_demand::config::default_concurrency));
            let aggregation = aggregate_tickets(&tickets, &executor).await?;

            if aggregation.table.is_empty() {
                warn!("Final table is empty");
            }
            for row in aggregation.table.rows.iter().take(limit) {
                info!("{}", serde_json::to_string(row)?);
            }
            info!(
                rows = aggregation.table.len(),
                total_demand = aggregation.table.total_demand(),
                "Preview complete"
            );
        }
    }

    Ok(())
}

/// Loads the snapshot, aggregates it and replaces the destination table.
#[tracing::instrument(skip_all, fields(source = %config.source, table = %config.table_name))]
async fn run_pipeline(config: &PipelineConfig) -> Result<()> {
    let tickets = load_tickets(&config.source)
        .await
        .with_context(|| format!("failed to load {}", config.source))?;

    let executor = TokioExecutor::new(config.concurrency);
    let sink = sink::connect(&config.sink).await?;

    let summary = run(&tickets, &executor, sink.as_ref(), &config.table_name).await?;
    info!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
