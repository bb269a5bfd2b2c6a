//! Grouped and ranked summaries over one metric family.

use crate::analyzers::metrics::MetricTable;
use crate::analyzers::types::{MetricFamily, MetricRow, SummaryRow};
use crate::analyzers::utility::{max, mean, min, sample_stddev};
use crate::config::AnalysisConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

pub const NATIONWIDE: &str = "ALL";
pub const SWING: &str = "SWING";
pub const NON_SWING: &str = "NON-SWING";

/// Builds the summary table for `family`.
///
/// Only rows whose current, prior and change values are all finite take
/// part. The output holds, in order: the nationwide, swing-state and
/// non-swing-state aggregates; the largest increases for each swing state;
/// the largest nationwide increases; the largest nationwide decreases. A
/// county may appear in several sections.
///
/// The per-state rows carry the label `Top 2 Increase - {state}` even
/// though `top_per_state` (3 by default) rows are emitted; downstream
/// consumers match on that label.
pub fn build_summary(table: &MetricTable, family: MetricFamily, config: &AnalysisConfig) -> Vec<SummaryRow> {
    let [current_year, prior_year] = table.years();

    let working: Vec<&MetricRow> = table
        .rows()
        .iter()
        .filter(|row| {
            family.value(row, current_year).is_finite()
                && family.value(row, prior_year).is_finite()
                && family.change(row).is_finite()
        })
        .collect();

    let (swing, non_swing): (Vec<&MetricRow>, Vec<&MetricRow>) = working
        .iter()
        .copied()
        .partition(|row| config.is_swing_state(&row.base.state_code));

    let mut results = vec![
        aggregate_row("Nationwide", NATIONWIDE, &working, family, current_year, prior_year),
        aggregate_row("Swing States Aggregate", SWING, &swing, family, current_year, prior_year),
        aggregate_row(
            "Non-Swing States Aggregate",
            NON_SWING,
            &non_swing,
            family,
            current_year,
            prior_year,
        ),
    ];

    for state in &config.swing_states {
        let state_rows: Vec<&MetricRow> = working
            .iter()
            .copied()
            .filter(|row| &row.base.state_code == state)
            .collect();

        let category = format!("Top 2 Increase - {state}");
        for row in largest(&state_rows, family, config.top_per_state) {
            results.push(county_row(&category, row, family, current_year, prior_year));
        }
    }

    for row in largest(&working, family, config.top_nationwide) {
        results.push(county_row(
            &format!("Top {} Increase - Nationwide", config.top_nationwide),
            row,
            family,
            current_year,
            prior_year,
        ));
    }

    for row in smallest(&working, family, config.top_nationwide) {
        results.push(county_row(
            &format!("Top {} Decrease - Nationwide", config.top_nationwide),
            row,
            family,
            current_year,
            prior_year,
        ));
    }

    debug!(
        family = family.label(),
        eligible = working.len(),
        rows = results.len(),
        "Built summary"
    );
    results
}

fn aggregate_row(
    category: &str,
    state_code: &str,
    rows: &[&MetricRow],
    family: MetricFamily,
    current_year: u16,
    prior_year: u16,
) -> SummaryRow {
    let current: Vec<f64> = rows.iter().map(|r| family.value(r, current_year)).collect();
    let prior: Vec<f64> = rows.iter().map(|r| family.value(r, prior_year)).collect();
    let change: Vec<f64> = rows.iter().map(|r| family.change(r)).collect();
    let avg_change = mean(&change);

    SummaryRow {
        category: category.to_string(),
        state_code: state_code.to_string(),
        county: None,
        county_count: rows.len(),
        avg_current: mean(&current),
        avg_prior: mean(&prior),
        avg_change,
        max_change: Some(max(&change)),
        min_change: Some(min(&change)),
        std_change: Some(sample_stddev(&change, avg_change)),
    }
}

fn county_row(
    category: &str,
    row: &MetricRow,
    family: MetricFamily,
    current_year: u16,
    prior_year: u16,
) -> SummaryRow {
    SummaryRow {
        category: category.to_string(),
        state_code: row.base.state_code.clone(),
        county: Some(row.base.county.clone()),
        county_count: 1,
        avg_current: family.value(row, current_year),
        avg_prior: family.value(row, prior_year),
        avg_change: family.change(row),
        max_change: None,
        min_change: None,
        std_change: None,
    }
}

/// The `n` rows with the largest change, descending. Ties keep input order.
fn largest<'a>(rows: &[&'a MetricRow], family: MetricFamily, n: usize) -> Vec<&'a MetricRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| compare_change(family, b, a));
    sorted.truncate(n);
    sorted
}

/// The `n` rows with the smallest change, ascending. Ties keep input order.
fn smallest<'a>(rows: &[&'a MetricRow], family: MetricFamily, n: usize) -> Vec<&'a MetricRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| compare_change(family, a, b));
    sorted.truncate(n);
    sorted
}

fn compare_change(family: MetricFamily, a: &MetricRow, b: &MetricRow) -> Ordering {
    family.change(a).total_cmp(&family.change(b))
}

/// Input for the swing versus non-swing comparison chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSeries {
    pub title: String,
    pub metric: String,
    pub generated_at: DateTime<Utc>,
    pub prior_year: u16,
    pub current_year: u16,
    pub non_swing_prior: f64,
    pub non_swing_current: f64,
    pub swing_prior: f64,
    pub swing_current: f64,
}

impl ComparisonSeries {
    /// Picks the swing and non-swing aggregates out of a summary built by
    /// [`build_summary`]. Returns `None` if either aggregate is missing.
    pub fn from_summary(
        summary: &[SummaryRow],
        family: MetricFamily,
        current_year: u16,
        prior_year: u16,
    ) -> Option<Self> {
        let find = |code: &str| {
            summary
                .iter()
                .find(|row| row.county.is_none() && row.state_code == code)
        };
        let swing = find(SWING)?;
        let non_swing = find(NON_SWING)?;

        Some(Self {
            title: family.title().to_string(),
            metric: family.label().to_string(),
            generated_at: Utc::now(),
            prior_year,
            current_year,
            non_swing_prior: non_swing.avg_prior,
            non_swing_current: non_swing.avg_current,
            swing_prior: swing.avg_prior,
            swing_current: swing.avg_current,
        })
    }

    pub fn swing_change(&self) -> f64 {
        self.swing_current - self.swing_prior
    }

    pub fn non_swing_change(&self) -> f64 {
        self.non_swing_current - self.non_swing_prior
    }
}
