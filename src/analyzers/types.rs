//! Data types used by the reshaping and metrics pipeline.

use crate::config::RaceType;
use std::collections::BTreeMap;

/// Party bucket a candidate's votes are counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyBucket {
    Democratic,
    Republican,
    Other,
}

impl PartyBucket {
    /// `D` and `R` map to the major parties; every other code is `Other`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "D" => PartyBucket::Democratic,
            "R" => PartyBucket::Republican,
            _ => PartyBucket::Other,
        }
    }
}

/// One race in one county for one year, with all candidates bucketed by
/// party. House rows merge every district overlapping the county.
///
/// `dem_votes + rep_votes + other_votes == total_votes` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRow {
    pub year: u16,
    pub race: RaceType,
    pub state_code: String,
    pub county: String,
    pub dem_candidates: Vec<String>,
    pub rep_candidates: Vec<String>,
    pub other_candidates: Vec<String>,
    pub dem_votes: u64,
    pub rep_votes: u64,
    pub other_votes: u64,
    pub total_votes: u64,
    pub reported_pct: Option<f64>,
}

impl AggregatedRow {
    pub(crate) fn empty(year: u16, race: RaceType, state_code: &str, county: &str) -> Self {
        Self {
            year,
            race,
            state_code: state_code.to_string(),
            county: county.to_string(),
            dem_candidates: Vec::new(),
            rep_candidates: Vec::new(),
            other_candidates: Vec::new(),
            dem_votes: 0,
            rep_votes: 0,
            other_votes: 0,
            total_votes: 0,
            reported_pct: None,
        }
    }

    pub(crate) fn add_candidate(&mut self, bucket: PartyBucket, name: String, votes: u64) {
        match bucket {
            PartyBucket::Democratic => {
                self.dem_candidates.push(name);
                self.dem_votes += votes;
            }
            PartyBucket::Republican => {
                self.rep_candidates.push(name);
                self.rep_votes += votes;
            }
            PartyBucket::Other => {
                self.other_candidates.push(name);
                self.other_votes += votes;
            }
        }
        self.total_votes += votes;
    }

    /// Share of `votes` in the row total, in percent. `None` when no votes were cast.
    pub fn share(&self, votes: u64) -> Option<f64> {
        if self.total_votes == 0 {
            None
        } else {
            Some(votes as f64 / self.total_votes as f64 * 100.0)
        }
    }

    pub fn dem_pct(&self) -> Option<f64> {
        self.share(self.dem_votes)
    }

    pub fn rep_pct(&self) -> Option<f64> {
        self.share(self.rep_votes)
    }

    pub fn other_pct(&self) -> Option<f64> {
        self.share(self.other_votes)
    }
}

/// The eight per-race, per-year columns of a flattened row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RaceColumns {
    pub total_votes: Option<u64>,
    pub dem_votes: Option<u64>,
    pub rep_votes: Option<u64>,
    pub other_votes: Option<u64>,
    pub dem_pct: Option<f64>,
    pub rep_pct: Option<f64>,
    pub other_pct: Option<f64>,
    pub pct_reported: Option<f64>,
}

/// One field within a [`RaceColumns`] group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceField {
    TotalVotes,
    DemVotes,
    RepVotes,
    OtherVotes,
    DemPct,
    RepPct,
    OtherPct,
    PctReported,
}

impl RaceField {
    /// Column order within a group.
    pub const ALL: [RaceField; 8] = [
        RaceField::TotalVotes,
        RaceField::DemVotes,
        RaceField::RepVotes,
        RaceField::OtherVotes,
        RaceField::DemPct,
        RaceField::RepPct,
        RaceField::OtherPct,
        RaceField::PctReported,
    ];

    fn stem(self) -> &'static str {
        match self {
            RaceField::TotalVotes => "total_votes",
            RaceField::DemVotes => "total_votes_dem",
            RaceField::RepVotes => "total_votes_rep",
            RaceField::OtherVotes => "total_votes_other",
            RaceField::DemPct => "total_votes_dem_pct",
            RaceField::RepPct => "total_votes_rep_pct",
            RaceField::OtherPct => "total_votes_other_pct",
            RaceField::PctReported => "pct_reported",
        }
    }

    fn from_stem(stem: &str) -> Option<Self> {
        RaceField::ALL.into_iter().find(|f| f.stem() == stem)
    }

    /// Vote counts are integers; percentages are floats.
    pub fn is_count(self) -> bool {
        matches!(
            self,
            RaceField::TotalVotes | RaceField::DemVotes | RaceField::RepVotes | RaceField::OtherVotes
        )
    }
}

/// Name of one flattened column, e.g. `house_total_votes_dem_pct_2020`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnKey {
    pub race: RaceType,
    pub field: RaceField,
    pub year: u16,
}

impl ColumnKey {
    pub fn name(&self) -> String {
        format!("{}_{}_{}", self.race.column_prefix(), self.field.stem(), self.year)
    }

    /// Resolves a column name back to its key. Names outside the flattened
    /// layout (metrics, identifiers) return `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let (rest, year) = name.rsplit_once('_')?;
        let year: u16 = year.parse().ok()?;
        let (prefix, stem) = rest.split_once('_')?;
        Some(Self {
            race: RaceType::from_column_prefix(prefix)?,
            field: RaceField::from_stem(stem)?,
            year,
        })
    }

    /// All flattened columns for `years`, in persisted order.
    pub fn layout(years: &[u16]) -> Vec<ColumnKey> {
        let mut keys = Vec::with_capacity(years.len() * RaceType::ALL.len() * RaceField::ALL.len());
        for &year in years {
            for race in RaceType::ALL {
                for field in RaceField::ALL {
                    keys.push(ColumnKey { race, field, year });
                }
            }
        }
        keys
    }
}

/// Cell value of a flattened column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue {
    Count(Option<u64>),
    Float(Option<f64>),
}

impl RaceColumns {
    pub fn get(&self, field: RaceField) -> CellValue {
        match field {
            RaceField::TotalVotes => CellValue::Count(self.total_votes),
            RaceField::DemVotes => CellValue::Count(self.dem_votes),
            RaceField::RepVotes => CellValue::Count(self.rep_votes),
            RaceField::OtherVotes => CellValue::Count(self.other_votes),
            RaceField::DemPct => CellValue::Float(self.dem_pct),
            RaceField::RepPct => CellValue::Float(self.rep_pct),
            RaceField::OtherPct => CellValue::Float(self.other_pct),
            RaceField::PctReported => CellValue::Float(self.pct_reported),
        }
    }

    /// Writes `value` into `field`. A value of the wrong kind is ignored.
    pub fn set(&mut self, field: RaceField, value: CellValue) {
        match (field, value) {
            (RaceField::TotalVotes, CellValue::Count(v)) => self.total_votes = v,
            (RaceField::DemVotes, CellValue::Count(v)) => self.dem_votes = v,
            (RaceField::RepVotes, CellValue::Count(v)) => self.rep_votes = v,
            (RaceField::OtherVotes, CellValue::Count(v)) => self.other_votes = v,
            (RaceField::DemPct, CellValue::Float(v)) => self.dem_pct = v,
            (RaceField::RepPct, CellValue::Float(v)) => self.rep_pct = v,
            (RaceField::OtherPct, CellValue::Float(v)) => self.other_pct = v,
            (RaceField::PctReported, CellValue::Float(v)) => self.pct_reported = v,
            _ => {}
        }
    }
}

/// One county with a column group per (race, year) it has results for.
/// Absent groups read as null, never as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedRow {
    pub state_code: String,
    pub county: String,
    pub groups: BTreeMap<(RaceType, u16), RaceColumns>,
}

impl FlattenedRow {
    pub fn new(state_code: &str, county: &str) -> Self {
        Self {
            state_code: state_code.to_string(),
            county: county.to_string(),
            groups: BTreeMap::new(),
        }
    }

    pub fn group(&self, race: RaceType, year: u16) -> Option<&RaceColumns> {
        self.groups.get(&(race, year))
    }

    pub fn cell(&self, key: ColumnKey) -> CellValue {
        match self.group(key.race, key.year) {
            Some(group) => group.get(key.field),
            None if key.field.is_count() => CellValue::Count(None),
            None => CellValue::Float(None),
        }
    }

    pub fn set_cell(&mut self, key: ColumnKey, value: CellValue) {
        self.groups
            .entry((key.race, key.year))
            .or_default()
            .set(key.field, value);
    }

    /// Vote count as a float; missing values read as NaN.
    pub fn votes(&self, race: RaceType, year: u16, field: RaceField) -> f64 {
        match self.cell(ColumnKey { race, field, year }) {
            CellValue::Count(Some(v)) => v as f64,
            CellValue::Float(Some(v)) => v,
            _ => f64::NAN,
        }
    }
}

/// Derived values for one year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearMetrics {
    pub pres_house_ratio: f64,
    pub split_ticket_pct: f64,
    pub total_two_race_voters: f64,
    pub straight_ticket_voters: f64,
    pub split_ticket_voters: f64,
}

/// Every derived column of a metric row. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub years: BTreeMap<u16, YearMetrics>,
    pub pres_house_ratio_change: f64,
    pub abs_ratio_change: f64,
    pub split_ticket_change: f64,
    pub abs_split_ticket_change: f64,
}

/// A flattened row plus its derived metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub base: FlattenedRow,
    pub derived: DerivedMetrics,
}

/// Metric a summary is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricFamily {
    /// Presidential-to-House vote ratio.
    Ratio,
    /// Estimated split-ticket voting percentage.
    SplitTicket,
}

impl MetricFamily {
    /// Stem of the summary column names (`avg_ratio_2024`, `std_split_ticket_change`).
    pub fn label(self) -> &'static str {
        match self {
            MetricFamily::Ratio => "ratio",
            MetricFamily::SplitTicket => "split_ticket",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MetricFamily::Ratio => "Presidential to House Vote Ratio",
            MetricFamily::SplitTicket => "Estimated Split-Ticket Voting",
        }
    }

    /// Value of this metric for `year`; NaN when the year was not derived.
    pub fn value(self, row: &MetricRow, year: u16) -> f64 {
        match row.derived.years.get(&year) {
            Some(m) => match self {
                MetricFamily::Ratio => m.pres_house_ratio,
                MetricFamily::SplitTicket => m.split_ticket_pct,
            },
            None => f64::NAN,
        }
    }

    pub fn change(self, row: &MetricRow) -> f64 {
        match self {
            MetricFamily::Ratio => row.derived.pres_house_ratio_change,
            MetricFamily::SplitTicket => row.derived.split_ticket_change,
        }
    }
}

/// One line of a summary table: either a group aggregate or a single county.
///
/// For single-county rows the `avg_*` fields hold the county's own values and
/// the spread fields are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub category: String,
    pub state_code: String,
    pub county: Option<String>,
    pub county_count: usize,
    pub avg_current: f64,
    pub avg_prior: f64,
    pub avg_change: f64,
    pub max_change: Option<f64>,
    pub min_change: Option<f64>,
    pub std_change: Option<f64>,
}
