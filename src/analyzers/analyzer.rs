use crate::analyzers::aggregate::aggregate_records;
use crate::analyzers::flatten::flatten_rows;
use crate::analyzers::metrics::MetricTable;
use crate::analyzers::summary::{ComparisonSeries, build_summary};
use crate::analyzers::types::{AggregatedRow, FlattenedRow, MetricFamily, SummaryRow};
use crate::config::AnalysisConfig;
use crate::error::PipelineError;
use crate::ingest::ResultsArchive;
use crate::output::{save_json, write_metrics_csv, write_summary_csv};
use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

/// Everything derived from one flattened table.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub table: MetricTable,
    pub ratio_summary: Vec<SummaryRow>,
    pub split_ticket_summary: Vec<SummaryRow>,
    pub ratio_comparison: Option<ComparisonSeries>,
    pub split_ticket_comparison: Option<ComparisonSeries>,
}

/// Aggregates every record in the archive.
#[tracing::instrument(skip_all)]
pub fn aggregate_archive(archive: &ResultsArchive) -> Result<Vec<AggregatedRow>, PipelineError> {
    let records = archive.race_records();
    let rows = aggregate_records(&records)?;
    info!(records = records.len(), rows = rows.len(), "Aggregated archive");
    Ok(rows)
}

/// Derives metrics for the flattened table and builds both summaries.
#[tracing::instrument(skip_all, fields(rows = flattened.len()))]
pub fn analyze(flattened: Vec<FlattenedRow>, config: &AnalysisConfig) -> Analysis {
    let table = MetricTable::from_flattened(flattened, config);

    let ratio_summary = build_summary(&table, MetricFamily::Ratio, config);
    let split_ticket_summary = build_summary(&table, MetricFamily::SplitTicket, config);

    let ratio_comparison = ComparisonSeries::from_summary(
        &ratio_summary,
        MetricFamily::Ratio,
        config.current_year,
        config.prior_year,
    );
    let split_ticket_comparison = ComparisonSeries::from_summary(
        &split_ticket_summary,
        MetricFamily::SplitTicket,
        config.current_year,
        config.prior_year,
    );

    info!(
        counties = table.len(),
        ratio_rows = ratio_summary.len(),
        split_ticket_rows = split_ticket_summary.len(),
        "Analysis complete"
    );

    Analysis {
        table,
        ratio_summary,
        split_ticket_summary,
        ratio_comparison,
        split_ticket_comparison,
    }
}

/// Runs the whole reshaping pipeline on an archive: aggregate, flatten,
/// derive metrics, summarize.
pub fn analyze_archive(archive: &ResultsArchive, config: &AnalysisConfig) -> Result<Analysis, PipelineError> {
    let grouped = aggregate_archive(archive)?;
    let flattened = flatten_rows(&grouped);
    Ok(analyze(flattened, config))
}

/// Writes the metric table, both summaries and both comparison series into
/// `output_dir`.
#[tracing::instrument(skip(analysis), fields(output_dir = %output_dir.display()))]
pub fn write_analysis(analysis: &Analysis, output_dir: &Path, gzip: bool) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let [current_year, prior_year] = analysis.table.years();

    write_metrics_csv(&output_dir.join("metrics.csv"), &analysis.table, gzip)?;
    write_summary_csv(
        &output_dir.join("ratio_summary.csv"),
        &analysis.ratio_summary,
        MetricFamily::Ratio,
        current_year,
        prior_year,
        gzip,
    )?;
    write_summary_csv(
        &output_dir.join("split_ticket_summary.csv"),
        &analysis.split_ticket_summary,
        MetricFamily::SplitTicket,
        current_year,
        prior_year,
        gzip,
    )?;

    for (name, series) in [
        ("ratio_comparison.json", &analysis.ratio_comparison),
        ("split_ticket_comparison.json", &analysis.split_ticket_comparison),
    ] {
        match series {
            Some(series) => save_json(&output_dir.join(name), series)?,
            None => warn!(file = name, "No swing/non-swing aggregates, comparison not written"),
        }
    }

    Ok(())
}
