//! Fatal pipeline faults.
//!
//! Source and integrity faults abort processing for the affected input and
//! always name the offending key. Indeterminate arithmetic (zero or missing
//! denominators) is not an error; it surfaces as NaN or infinity.

use crate::config::RaceType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The results API failed for a unit even after retrying.
    #[error("results source unavailable for {race} race, state {state}, year {year}{}: {reason}", district_suffix(.district))]
    SourceUnavailable {
        year: u16,
        state: String,
        race: RaceType,
        district: Option<u32>,
        reason: String,
    },

    /// The same county was reported twice for one statewide race.
    #[error("duplicate county '{county}' for {race} race, state {state}, year {year}")]
    DuplicateCounty {
        year: u16,
        state: String,
        race: RaceType,
        county: String,
    },

    /// A down-ballot race reported a county the presidential race did not.
    #[error("county '{county}' from {race} race{} not present in presidential results, state {state}, year {year}", district_suffix(.district))]
    UnknownCounty {
        year: u16,
        state: String,
        race: RaceType,
        district: Option<u32>,
        county: String,
    },

    /// The presidential county list could not be established for a state.
    #[error("no presidential results for state {state}, year {year}")]
    MissingPresidentialRace { year: u16, state: String },
}

fn district_suffix(district: &Option<u32>) -> String {
    match district {
        Some(d) => format!(" (district {d})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_key() {
        let err = PipelineError::DuplicateCounty {
            year: 2024,
            state: "PA".to_string(),
            race: RaceType::Senate,
            county: "Erie".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Erie"));
        assert!(msg.contains("PA"));
        assert!(msg.contains("2024"));

        let err = PipelineError::UnknownCounty {
            year: 2020,
            state: "AL".to_string(),
            race: RaceType::House,
            district: Some(2),
            county: "Mobile".to_string(),
        };
        assert!(err.to_string().contains("(district 2)"));
    }
}
