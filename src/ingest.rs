//! Retrieval of raw race records from a [`ResultsSource`].
//!
//! Ingestion runs in two passes. [`build_district_map`] establishes, per year
//! and state, the presidential county list and which House districts cover
//! each county. [`fetch_archive`] then loads every configured race into a
//! [`ResultsArchive`], seeded with blank records so that races that did not
//! take place remain visible as empty.

use crate::config::{AnalysisConfig, RaceType};
use crate::error::PipelineError;
use crate::services::results_api::{RaceRecord, ResultsSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Counties and House districts of one state in one year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDistricts {
    /// Counties in presidential-results order.
    pub counties: Vec<String>,
    pub districts: Vec<u32>,
    /// Districts overlapping each county; empty for counties with none.
    pub county_districts: BTreeMap<String, Vec<u32>>,
}

/// Year → state code → counties and districts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistrictMap {
    pub years: BTreeMap<u16, BTreeMap<String, StateDistricts>>,
}

impl DistrictMap {
    pub fn state(&self, year: u16, state: &str) -> Option<&StateDistricts> {
        self.years.get(&year).and_then(|states| states.get(state))
    }
}

/// All records of one county: one per statewide race and one per
/// overlapping House district.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyResults {
    pub county: String,
    pub statewide: Vec<RaceRecord>,
    pub house: Vec<RaceRecord>,
}

/// Raw results keyed by year and state, counties in presidential order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsArchive {
    pub generated_at: DateTime<Utc>,
    pub years: BTreeMap<u16, BTreeMap<String, Vec<CountyResults>>>,
}

impl ResultsArchive {
    /// Every record in year, state, county order; statewide races before
    /// House districts.
    pub fn race_records(&self) -> Vec<RaceRecord> {
        self.years
            .values()
            .flat_map(|states| states.values())
            .flat_map(|counties| counties.iter())
            .flat_map(|county| county.statewide.iter().chain(county.house.iter()))
            .cloned()
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.years
            .values()
            .flat_map(|states| states.values())
            .flat_map(|counties| counties.iter())
            .map(|county| county.statewide.len() + county.house.len())
            .sum()
    }
}

/// Builds the county/district map for every configured year and state.
///
/// House districts are probed sequentially from 1; the first district the
/// source reports absent, or fails to deliver after its retry, ends the
/// probe for that state.
///
/// # Errors
///
/// Fails if the presidential race of a state is missing or unavailable,
/// reports a county twice, or a House district reports a county the
/// presidential race did not.
#[tracing::instrument(skip_all)]
pub async fn build_district_map<S>(source: &S, config: &AnalysisConfig) -> Result<DistrictMap, PipelineError>
where
    S: ResultsSource + ?Sized,
{
    let mut map = DistrictMap::default();

    for year in config.years() {
        info!(year, "Loading district map");
        let mut states = BTreeMap::new();

        for state in config.states.keys() {
            let districts = load_state_districts(source, year, state).await?;
            info!(
                year,
                state = %state,
                counties = districts.counties.len(),
                districts = districts.districts.len(),
                "Loaded state"
            );
            states.insert(state.clone(), districts);
        }

        map.years.insert(year, states);
    }

    Ok(map)
}

async fn load_state_districts<S>(source: &S, year: u16, state: &str) -> Result<StateDistricts, PipelineError>
where
    S: ResultsSource + ?Sized,
{
    let presidential = source
        .county_races(year, state, RaceType::President, None)
        .await?
        .ok_or_else(|| PipelineError::MissingPresidentialRace {
            year,
            state: state.to_string(),
        })?;

    let mut counties = Vec::with_capacity(presidential.len());
    let mut seen = HashSet::new();
    for record in presidential {
        if !seen.insert(record.county.clone()) {
            return Err(PipelineError::DuplicateCounty {
                year,
                state: state.to_string(),
                race: RaceType::President,
                county: record.county,
            });
        }
        counties.push(record.county);
    }

    let mut districts = Vec::new();
    let mut county_districts: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    let mut district = 1;

    loop {
        let records = match source
            .county_races(year, state, RaceType::House, Some(district))
            .await
        {
            Ok(Some(records)) => records,
            Ok(None) => break,
            Err(e) => {
                warn!(year, state, district, error = %e, "District probe failed, assuming no more districts");
                break;
            }
        };

        for record in records {
            if !seen.contains(&record.county) {
                return Err(PipelineError::UnknownCounty {
                    year,
                    state: state.to_string(),
                    race: RaceType::House,
                    district: Some(district),
                    county: record.county,
                });
            }
            let entry = county_districts.entry(record.county).or_default();
            if !entry.contains(&district) {
                entry.push(district);
            }
        }

        districts.push(district);
        district += 1;
    }

    for county in &counties {
        county_districts.entry(county.clone()).or_default();
    }

    Ok(StateDistricts {
        counties,
        districts,
        county_districts,
    })
}

/// Loads every configured race for every state in `map`.
///
/// A statewide race the source reports absent leaves its blank records in
/// place; a race that did not take place is not an error.
///
/// # Errors
///
/// Propagates [`PipelineError::SourceUnavailable`] from the source, and fails
/// on a county reported twice by a statewide race or a county missing from
/// the presidential list.
#[tracing::instrument(skip_all)]
pub async fn fetch_archive<S>(
    source: &S,
    config: &AnalysisConfig,
    map: &DistrictMap,
) -> Result<ResultsArchive, PipelineError>
where
    S: ResultsSource + ?Sized,
{
    let mut years = BTreeMap::new();

    for (&year, states) in &map.years {
        info!(year, "Loading results");
        let mut year_results = BTreeMap::new();

        for (state, districts) in states {
            let counties = load_state_results(source, config, year, state, districts).await?;
            info!(year, state = %state, counties = counties.len(), "Loaded state results");
            year_results.insert(state.clone(), counties);
        }

        years.insert(year, year_results);
    }

    Ok(ResultsArchive {
        generated_at: Utc::now(),
        years,
    })
}

async fn load_state_results<S>(
    source: &S,
    config: &AnalysisConfig,
    year: u16,
    state: &str,
    districts: &StateDistricts,
) -> Result<Vec<CountyResults>, PipelineError>
where
    S: ResultsSource + ?Sized,
{
    let index: HashMap<&str, usize> = districts
        .counties
        .iter()
        .enumerate()
        .map(|(i, county)| (county.as_str(), i))
        .collect();

    let mut counties: Vec<CountyResults> = districts
        .counties
        .iter()
        .map(|county| {
            let statewide = config
                .race_types
                .iter()
                .filter(|race| !race.is_house())
                .map(|&race| RaceRecord::blank(year, state, county, race, None))
                .collect();
            let house = if config.race_types.contains(&RaceType::House) {
                districts
                    .county_districts
                    .get(county)
                    .map(|ds| {
                        ds.iter()
                            .map(|&d| RaceRecord::blank(year, state, county, RaceType::House, Some(d)))
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            CountyResults {
                county: county.clone(),
                statewide,
                house,
            }
        })
        .collect();

    for &race in &config.race_types {
        if race.is_house() {
            for &district in &districts.districts {
                let Some(records) = source
                    .county_races(year, state, race, Some(district))
                    .await?
                else {
                    debug!(year, state, district, "House district not reported");
                    continue;
                };

                for record in records {
                    let slot = lookup(&index, year, state, race, Some(district), &record.county)?;
                    let house = &mut counties[slot].house;
                    match house.iter_mut().find(|r| r.district == Some(district)) {
                        Some(existing) => *existing = record,
                        None => house.push(record),
                    }
                }
            }
        } else {
            let Some(records) = source.county_races(year, state, race, None).await? else {
                debug!(year, state, race = %race, "Race not held");
                continue;
            };

            let mut loaded = HashSet::new();
            for record in records {
                let slot = lookup(&index, year, state, race, None, &record.county)?;
                if !loaded.insert(slot) {
                    return Err(PipelineError::DuplicateCounty {
                        year,
                        state: state.to_string(),
                        race,
                        county: record.county,
                    });
                }
                let statewide = &mut counties[slot].statewide;
                match statewide.iter_mut().find(|r| r.race == race) {
                    Some(existing) => *existing = record,
                    None => statewide.push(record),
                }
            }
        }
    }

    Ok(counties)
}

fn lookup(
    index: &HashMap<&str, usize>,
    year: u16,
    state: &str,
    race: RaceType,
    district: Option<u32>,
    county: &str,
) -> Result<usize, PipelineError> {
    index
        .get(county)
        .copied()
        .ok_or_else(|| PipelineError::UnknownCounty {
            year,
            state: state.to_string(),
            race,
            district,
            county: county.to_string(),
        })
}
