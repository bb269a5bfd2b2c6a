//! CLI entry point for the split-ticket analysis tool.
//!
//! Provides subcommands for mapping House districts to counties, fetching
//! county-level results, reshaping them into grouped and flattened tables,
//! and deriving the vote-ratio and split-ticket summaries.

mod infra;

use crate::infra::cnn::client::CnnResultsClient;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use split_ticket::analyzers::analyzer::{aggregate_archive, analyze, write_analysis};
use split_ticket::analyzers::flatten::flatten_rows;
use split_ticket::config::{AnalysisConfig, SourceConfig};
use split_ticket::ingest::{DistrictMap, ResultsArchive, build_district_map, fetch_archive};
use split_ticket::output::{
    load_json, read_flattened_csv, read_grouped_csv, save_json, write_flattened_csv,
    write_grouped_csv,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "split_ticket")]
#[command(about = "County-level presidential/House ratio and split-ticket analysis", long_about = None)]
struct Cli {
    /// JSON file overriding the default years, states and swing states
    #[arg(long, global = true)]
    config: Option<String>,

    /// Restrict fetches to these state codes (comma separated)
    #[arg(long, global = true, value_delimiter = ',')]
    states: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OutputOpts {
    /// Gzip-compress written CSV files
    #[arg(long, default_value_t = false)]
    gzip: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Map House districts to counties for every configured year and state
    MapDistricts {
        #[arg(short, long, default_value = "district_map.json")]
        output: PathBuf,
    },
    /// Fetch county results for every race in the district map
    Fetch {
        #[arg(short, long, default_value = "district_map.json")]
        district_map: PathBuf,

        #[arg(short, long, default_value = "results.json")]
        output: PathBuf,
    },
    /// Aggregate fetched results into one row per year, race and county
    Aggregate {
        #[arg(short, long, default_value = "results.json")]
        input: PathBuf,

        #[arg(short, long, default_value = "grouped.csv")]
        output: PathBuf,

        #[command(flatten)]
        opts: OutputOpts,
    },
    /// Pivot the grouped table into one row per county
    Flatten {
        #[arg(short, long, default_value = "grouped.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "flattened.csv")]
        output: PathBuf,

        #[command(flatten)]
        opts: OutputOpts,
    },
    /// Derive metrics and summaries from the flattened table
    Analyze {
        #[arg(short, long, default_value = "flattened.csv")]
        input: PathBuf,

        #[arg(short = 'd', long, default_value = "analysis")]
        output_dir: PathBuf,

        #[command(flatten)]
        opts: OutputOpts,
    },
    /// Run every step, writing all intermediate files to one directory
    Run {
        #[arg(short = 'd', long, default_value = "out")]
        output_dir: PathBuf,

        #[command(flatten)]
        opts: OutputOpts,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/split_ticket.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("split_ticket.log"));

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

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if !cli.states.is_empty() {
        config = config.restrict_states(&cli.states)?;
    }

    match cli.command {
        Commands::MapDistricts { output } => {
            let client = CnnResultsClient::new(&SourceConfig::from_env()?)?;
            let map = build_district_map(&client, &config).await?;
            save_json(&output, &map)?;
        }
        Commands::Fetch {
            district_map,
            output,
        } => {
            let map: DistrictMap = load_json(&district_map)?;
            let client = CnnResultsClient::new(&SourceConfig::from_env()?)?;
            let archive = fetch_archive(&client, &config, &map).await?;
            info!(records = archive.record_count(), "Results fetched");
            save_json(&output, &archive)?;
        }
        Commands::Aggregate {
            input,
            output,
            opts,
        } => {
            let archive: ResultsArchive = load_json(&input)?;
            let grouped = aggregate_archive(&archive)?;
            write_grouped_csv(&output, &grouped, opts.gzip)?;
        }
        Commands::Flatten {
            input,
            output,
            opts,
        } => {
            let grouped = read_grouped_csv(&input)?;
            let flattened = flatten_rows(&grouped);
            write_flattened_csv(&output, &flattened, &config.years(), opts.gzip)?;
        }
        Commands::Analyze {
            input,
            output_dir,
            opts,
        } => {
            let flattened = read_flattened_csv(&input)?;
            let analysis = analyze(flattened, &config);
            write_analysis(&analysis, &output_dir, opts.gzip)?;
        }
        Commands::Run { output_dir, opts } => {
            run_all(&config, &output_dir, opts.gzip).await?;
        }
    }

    Ok(())
}

/// Fetches everything and runs the full pipeline, keeping every
/// intermediate artifact in `output_dir`.
#[tracing::instrument(skip(config), fields(output_dir = %output_dir.display()))]
async fn run_all(config: &AnalysisConfig, output_dir: &Path, gzip: bool) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let client = CnnResultsClient::new(&SourceConfig::from_env()?)?;

    let map = build_district_map(&client, config).await?;
    save_json(&output_dir.join("district_map.json"), &map)?;

    let archive = fetch_archive(&client, config, &map).await?;
    save_json(&output_dir.join("results.json"), &archive)?;

    let grouped = aggregate_archive(&archive)?;
    write_grouped_csv(&output_dir.join("grouped.csv"), &grouped, gzip)?;

    let flattened = flatten_rows(&grouped);
    write_flattened_csv(&output_dir.join("flattened.csv"), &flattened, &config.years(), gzip)?;

    let analysis = analyze(flattened, config);
    write_analysis(&analysis, &output_dir.join("analysis"), gzip)?;

    info!("Pipeline finished");
    Ok(())
}
