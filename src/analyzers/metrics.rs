//! Presidential/House vote ratio and split-ticket estimates per county.
//!
//! Both metrics are approximations. The ratio compares raw turnout in the
//! two races. The split-ticket estimate treats the smaller of a party's two
//! vote counts as its straight-ticket voters and the smaller of the two race
//! totals as the voters who could have voted in both; whatever remains is
//! counted as split. When those assumptions fail the split count goes
//! negative, and that is reported as-is.
//!
//! Missing operands and zero denominators produce NaN or infinity, which
//! summaries filter out.

use crate::analyzers::types::{DerivedMetrics, FlattenedRow, MetricRow, RaceField, YearMetrics};
use crate::analyzers::utility::nan_min;
use crate::config::{AnalysisConfig, RaceType};
use std::collections::BTreeMap;
use tracing::debug;

/// Flattened rows with their derived metric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    current_year: u16,
    prior_year: u16,
    rows: Vec<MetricRow>,
}

impl MetricTable {
    /// Takes ownership of the flattened rows and derives every metric column.
    pub fn from_flattened(rows: Vec<FlattenedRow>, config: &AnalysisConfig) -> Self {
        let current_year = config.current_year;
        let prior_year = config.prior_year;
        let rows = rows
            .into_iter()
            .map(|base| {
                let derived = derive_metrics(&base, current_year, prior_year);
                MetricRow { base, derived }
            })
            .collect();

        Self {
            current_year,
            prior_year,
            rows,
        }
    }

    /// Recomputes all derived columns from the base columns. Every row's
    /// metrics are computed before any is replaced.
    pub fn recompute(&mut self) {
        let derived: Vec<DerivedMetrics> = self
            .rows
            .iter()
            .map(|row| derive_metrics(&row.base, self.current_year, self.prior_year))
            .collect();

        for (row, derived) in self.rows.iter_mut().zip(derived) {
            row.derived = derived;
        }
        debug!(rows = self.rows.len(), "Recomputed derived metrics");
    }

    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    pub fn current_year(&self) -> u16 {
        self.current_year
    }

    pub fn prior_year(&self) -> u16 {
        self.prior_year
    }

    pub fn years(&self) -> [u16; 2] {
        [self.current_year, self.prior_year]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Derives every metric column of one row.
pub fn derive_metrics(row: &FlattenedRow, current_year: u16, prior_year: u16) -> DerivedMetrics {
    let mut years = BTreeMap::new();
    for year in [current_year, prior_year] {
        years.insert(year, year_metrics(row, year));
    }

    let current = years[&current_year];
    let prior = years[&prior_year];

    let pres_house_ratio_change = current.pres_house_ratio - prior.pres_house_ratio;
    let split_ticket_change = current.split_ticket_pct - prior.split_ticket_pct;

    DerivedMetrics {
        years,
        pres_house_ratio_change,
        abs_ratio_change: pres_house_ratio_change.abs(),
        split_ticket_change,
        abs_split_ticket_change: split_ticket_change.abs(),
    }
}

fn year_metrics(row: &FlattenedRow, year: u16) -> YearMetrics {
    let pres_total = row.votes(RaceType::President, year, RaceField::TotalVotes);
    let house_total = row.votes(RaceType::House, year, RaceField::TotalVotes);

    let split = split_ticket_estimate(SplitTicketInputs {
        pres_total,
        house_total,
        pres_dem: row.votes(RaceType::President, year, RaceField::DemVotes),
        house_dem: row.votes(RaceType::House, year, RaceField::DemVotes),
        pres_rep: row.votes(RaceType::President, year, RaceField::RepVotes),
        house_rep: row.votes(RaceType::House, year, RaceField::RepVotes),
    });

    YearMetrics {
        pres_house_ratio: pres_total / house_total,
        split_ticket_pct: split.split_ticket_pct,
        total_two_race_voters: split.two_race_voters,
        straight_ticket_voters: split.straight_voters,
        split_ticket_voters: split.split_voters,
    }
}

/// Vote counts feeding one split-ticket estimate. Missing counts are NaN.
#[derive(Debug, Clone, Copy)]
pub struct SplitTicketInputs {
    pub pres_total: f64,
    pub house_total: f64,
    pub pres_dem: f64,
    pub house_dem: f64,
    pub pres_rep: f64,
    pub house_rep: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitTicketEstimate {
    pub two_race_voters: f64,
    pub straight_voters: f64,
    pub split_voters: f64,
    pub split_ticket_pct: f64,
}

pub fn split_ticket_estimate(inputs: SplitTicketInputs) -> SplitTicketEstimate {
    let straight_dem = nan_min(inputs.pres_dem, inputs.house_dem);
    let straight_rep = nan_min(inputs.pres_rep, inputs.house_rep);
    let two_race_voters = nan_min(inputs.pres_total, inputs.house_total);

    let straight_voters = straight_dem + straight_rep;
    let split_voters = two_race_voters - straight_voters;

    let split_ticket_pct = if two_race_voters == 0.0 {
        f64::NAN
    } else {
        split_voters / two_race_voters * 100.0
    };

    SplitTicketEstimate {
        two_race_voters,
        straight_voters,
        split_voters,
        split_ticket_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::RaceColumns;

    #[test]
    fn test_split_ticket_worked_example() {
        let est = split_ticket_estimate(SplitTicketInputs {
            pres_total: 1000.0,
            house_total: 900.0,
            pres_dem: 300.0,
            house_dem: 250.0,
            pres_rep: 600.0,
            house_rep: 650.0,
        });
        assert_eq!(est.straight_voters, 850.0);
        assert_eq!(est.two_race_voters, 900.0);
        assert_eq!(est.split_voters, 50.0);
        assert!((est.split_ticket_pct - 5.56).abs() < 0.01);
    }

    #[test]
    fn test_split_ticket_negative_is_kept() {
        // More straight-ticket voters than two-race voters
        let est = split_ticket_estimate(SplitTicketInputs {
            pres_total: 100.0,
            house_total: 100.0,
            pres_dem: 60.0,
            house_dem: 60.0,
            pres_rep: 60.0,
            house_rep: 60.0,
        });
        assert_eq!(est.split_voters, -20.0);
        assert_eq!(est.split_ticket_pct, -20.0);
    }

    #[test]
    fn test_split_ticket_zero_two_race_voters_is_nan() {
        let est = split_ticket_estimate(SplitTicketInputs {
            pres_total: 500.0,
            house_total: 0.0,
            pres_dem: 200.0,
            house_dem: 0.0,
            pres_rep: 300.0,
            house_rep: 0.0,
        });
        assert!(est.split_ticket_pct.is_nan());
    }

    #[test]
    fn test_split_ticket_missing_operand_is_nan() {
        let est = split_ticket_estimate(SplitTicketInputs {
            pres_total: 500.0,
            house_total: f64::NAN,
            pres_dem: 200.0,
            house_dem: f64::NAN,
            pres_rep: 300.0,
            house_rep: f64::NAN,
        });
        assert!(est.two_race_voters.is_nan());
        assert!(est.split_ticket_pct.is_nan());
    }

    #[test]
    fn test_ratio_and_change() {
        let mut row = FlattenedRow::new("PA", "Erie");
        set_totals(&mut row, 2024, 1000, 800);
        set_totals(&mut row, 2020, 900, 900);

        let derived = derive_metrics(&row, 2024, 2020);
        assert_eq!(derived.years[&2024].pres_house_ratio, 1.25);
        assert_eq!(derived.years[&2020].pres_house_ratio, 1.0);
        assert!((derived.pres_house_ratio_change - 0.25).abs() < 1e-12);
        assert_eq!(derived.abs_ratio_change, derived.pres_house_ratio_change.abs());
    }

    #[test]
    fn test_ratio_with_zero_house_total_is_not_finite() {
        let mut row = FlattenedRow::new("PA", "Bucks");
        set_totals(&mut row, 2024, 500, 0);
        set_totals(&mut row, 2020, 500, 400);

        let derived = derive_metrics(&row, 2024, 2020);
        assert!(derived.years[&2024].pres_house_ratio.is_infinite());
        assert!(!derived.pres_house_ratio_change.is_finite());
    }

    #[test]
    fn test_missing_house_race_is_nan() {
        let mut row = FlattenedRow::new("PA", "Erie");
        row.groups.insert(
            (RaceType::President, 2024),
            RaceColumns {
                total_votes: Some(10),
                ..Default::default()
            },
        );
        let derived = derive_metrics(&row, 2024, 2020);
        assert!(derived.years[&2024].pres_house_ratio.is_nan());
        assert!(derived.split_ticket_change.is_nan());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut row = FlattenedRow::new("PA", "Erie");
        set_totals(&mut row, 2024, 1000, 800);
        set_totals(&mut row, 2020, 700, 900);

        let config = AnalysisConfig::default();
        let mut table = MetricTable::from_flattened(vec![row], &config);
        let before = table.clone();
        table.recompute();

        let a = &before.rows()[0].derived;
        let b = &table.rows()[0].derived;
        assert_eq!(a.pres_house_ratio_change.to_bits(), b.pres_house_ratio_change.to_bits());
        assert_eq!(a.split_ticket_change.to_bits(), b.split_ticket_change.to_bits());
        assert_eq!(
            a.years[&2024].split_ticket_pct.to_bits(),
            b.years[&2024].split_ticket_pct.to_bits()
        );
    }

    fn set_totals(row: &mut FlattenedRow, year: u16, pres: u64, house: u64) {
        row.groups.insert(
            (RaceType::President, year),
            RaceColumns {
                total_votes: Some(pres),
                dem_votes: Some(pres / 2),
                rep_votes: Some(pres - pres / 2),
                other_votes: Some(0),
                ..Default::default()
            },
        );
        row.groups.insert(
            (RaceType::House, year),
            RaceColumns {
                total_votes: Some(house),
                dem_votes: Some(house / 2),
                rep_votes: Some(house - house / 2),
                other_votes: Some(0),
                ..Default::default()
            },
        );
    }
}
