//! Immutable pipeline configuration.
//!
//! [`AnalysisConfig`] carries the election years, race types, state list and
//! swing-state set into every stage. [`SourceConfig`] holds the connection
//! settings for the remote results API and is read from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// One of the four tracked race types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RaceType {
    #[serde(rename = "P")]
    President,
    #[serde(rename = "S")]
    Senate,
    #[serde(rename = "H")]
    House,
    #[serde(rename = "G")]
    Governor,
}

impl RaceType {
    /// Column-group order used by every flattened table.
    pub const ALL: [RaceType; 4] = [
        RaceType::President,
        RaceType::Senate,
        RaceType::House,
        RaceType::Governor,
    ];

    /// Single-letter code used by the results API and the grouped table.
    pub fn code(self) -> &'static str {
        match self {
            RaceType::President => "P",
            RaceType::Senate => "S",
            RaceType::House => "H",
            RaceType::Governor => "G",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "P" => Some(RaceType::President),
            "S" => Some(RaceType::Senate),
            "H" => Some(RaceType::House),
            "G" => Some(RaceType::Governor),
            _ => None,
        }
    }

    /// Prefix of the flattened column family (`pres_total_votes_2024`, ...).
    pub fn column_prefix(self) -> &'static str {
        match self {
            RaceType::President => "pres",
            RaceType::Senate => "senate",
            RaceType::House => "house",
            RaceType::Governor => "gov",
        }
    }

    pub fn from_column_prefix(prefix: &str) -> Option<Self> {
        RaceType::ALL
            .into_iter()
            .find(|race| race.column_prefix() == prefix)
    }

    pub fn is_house(self) -> bool {
        self == RaceType::House
    }
}

impl fmt::Display for RaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RaceType::President => "Presidential",
            RaceType::Senate => "Senate",
            RaceType::House => "House",
            RaceType::Governor => "Gubernatorial",
        };
        f.write_str(name)
    }
}

static STATES: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
    ("DC", "District of Columbia"),
];

static SWING_STATES: &[&str] = &["AZ", "GA", "MI", "NV", "PA", "WI", "NC"];

/// Configuration shared by every pipeline stage.
///
/// Stored as JSON on disk; any omitted field falls back to the default:
/// ```json
/// {
///   "current_year": 2024,
///   "prior_year": 2020,
///   "swing_states": ["AZ", "GA", "MI", "NV", "PA", "WI", "NC"]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub current_year: u16,
    pub prior_year: u16,
    pub race_types: Vec<RaceType>,
    /// State code to state name, iterated in code order.
    pub states: BTreeMap<String, String>,
    /// Iteration order here is the order of the per-state summary rows.
    pub swing_states: Vec<String>,
    pub top_per_state: usize,
    pub top_nationwide: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            current_year: 2024,
            prior_year: 2020,
            race_types: RaceType::ALL.to_vec(),
            states: STATES
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
            swing_states: SWING_STATES.iter().map(|s| s.to_string()).collect(),
            top_per_state: 3,
            top_nationwide: 5,
        }
    }
}

impl AnalysisConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading analysis config '{path}'"))?;
        let config: AnalysisConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing analysis config '{path}'"))?;
        Ok(config)
    }

    /// Years in column-group order: current first, then prior.
    pub fn years(&self) -> [u16; 2] {
        [self.current_year, self.prior_year]
    }

    pub fn is_swing_state(&self, state_code: &str) -> bool {
        self.swing_states.iter().any(|s| s == state_code)
    }

    pub fn state_codes(&self) -> Vec<String> {
        self.states.keys().cloned().collect()
    }

    /// Keeps only the given state codes. Unknown codes are an error.
    pub fn restrict_states(mut self, codes: &[String]) -> Result<Self> {
        for code in codes {
            if !self.states.contains_key(code) {
                anyhow::bail!("unknown state code '{code}'");
            }
        }
        self.states.retain(|code, _| codes.contains(code));
        Ok(self)
    }
}

/// Connection settings for the remote results API.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://politics.api.cnn.io".to_string(),
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(30),
        }
    }
}

impl SourceConfig {
    /// Reads `RESULTS_API_BASE_URL`, `RESULTS_API_RETRY_DELAY_MS` and
    /// `RESULTS_API_TIMEOUT_SECS`, keeping defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("RESULTS_API_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(ms) = std::env::var("RESULTS_API_RETRY_DELAY_MS") {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("RESULTS_API_RETRY_DELAY_MS is not a number: '{ms}'"))?;
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Ok(secs) = std::env::var("RESULTS_API_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("RESULTS_API_TIMEOUT_SECS is not a number: '{secs}'"))?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_tracked_elections() {
        let config = AnalysisConfig::default();
        assert_eq!(config.years(), [2024, 2020]);
        assert_eq!(config.states.len(), 51);
        assert_eq!(config.swing_states.len(), 7);
        assert!(config.is_swing_state("PA"));
        assert!(!config.is_swing_state("CA"));
    }

    #[test]
    fn test_race_codes_and_prefixes() {
        for race in RaceType::ALL {
            assert_eq!(RaceType::from_code(race.code()), Some(race));
            assert_eq!(RaceType::from_column_prefix(race.column_prefix()), Some(race));
        }
        assert_eq!(RaceType::from_code("X"), None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{ "swing_states": ["PA"] }"#).unwrap();
        assert_eq!(config.current_year, 2024);
        assert_eq!(config.swing_states, vec!["PA".to_string()]);
        assert_eq!(config.top_per_state, 3);
    }

    #[test]
    fn test_restrict_states() {
        let config = AnalysisConfig::default()
            .restrict_states(&["PA".to_string(), "OH".to_string()])
            .unwrap();
        assert_eq!(config.state_codes(), vec!["OH".to_string(), "PA".to_string()]);

        assert!(AnalysisConfig::default()
            .restrict_states(&["ZZ".to_string()])
            .is_err());
    }
}
