//! Trait and types for interacting with a county-level election results source.

use crate::config::RaceType;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One candidate's tally in a single county race, keyed by party code in
/// [`RaceRecord::candidates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub votes: u64,
    pub votes_pct: Option<f64>,
}

/// Results of one race in one county.
///
/// House races carry the district the record belongs to; a county split
/// across districts has one record per district. An empty candidate map
/// means the race did not take place there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRecord {
    pub year: u16,
    pub state: String,
    pub county: String,
    pub race: RaceType,
    pub district: Option<u32>,
    pub pct_reported: Option<f64>,
    pub total_votes: Option<u64>,
    pub candidates: BTreeMap<String, Candidate>,
    pub timestamp: Option<String>,
}

impl RaceRecord {
    /// A placeholder for a race that has not (yet) been reported.
    pub fn blank(year: u16, state: &str, county: &str, race: RaceType, district: Option<u32>) -> Self {
        Self {
            year,
            state: state.to_string(),
            county: county.to_string(),
            race,
            district,
            pct_reported: None,
            total_votes: None,
            candidates: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn has_results(&self) -> bool {
        !self.candidates.is_empty()
    }
}

/// Abstraction over a results provider (e.g., the CNN results API).
#[async_trait::async_trait]
pub trait ResultsSource: Send + Sync {
    /// Returns the per-county records of one race, or `Ok(None)` when the
    /// provider has no such race (no race that cycle, no such district).
    async fn county_races(
        &self,
        year: u16,
        state: &str,
        race: RaceType,
        district: Option<u32>,
    ) -> Result<Option<Vec<RaceRecord>>, PipelineError>;
}
