use crate::analyzers::types::{AggregatedRow, PartyBucket};
use crate::config::RaceType;
use crate::error::PipelineError;
use crate::services::results_api::RaceRecord;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::debug;

type RowKey = (u16, RaceType, String, String);

/// Accumulates one county's House districts before the reported percentage
/// can be resolved.
struct HouseAccumulator {
    /// `(district total votes, district pct reported)` pairs.
    weights: Vec<(u64, f64)>,
}

/// Collapses per-county race records into one [`AggregatedRow`] per
/// (year, race, state, county), in order of first appearance.
///
/// Statewide races (president, senate, governor) with no candidates are
/// omitted. House records for the same county are merged: candidate names
/// are tagged with their district (`[3]Jane Doe`) and the reported
/// percentage is the district-vote-weighted mean of the districts' own
/// percentages. A House county whose districts all lack results still gets a
/// row, with zero votes and no reported percentage.
///
/// # Errors
///
/// Fails with [`PipelineError::DuplicateCounty`] if a statewide race reports
/// the same county twice.
pub fn aggregate_records(records: &[RaceRecord]) -> Result<Vec<AggregatedRow>, PipelineError> {
    let mut rows: Vec<AggregatedRow> = Vec::new();
    let mut house: Vec<Option<HouseAccumulator>> = Vec::new();
    let mut index: HashMap<RowKey, usize> = HashMap::new();

    for record in records {
        let key = (
            record.year,
            record.race,
            record.state.clone(),
            record.county.clone(),
        );

        if record.race.is_house() {
            let slot = *index.entry(key).or_insert_with(|| {
                rows.push(AggregatedRow::empty(
                    record.year,
                    record.race,
                    &record.state,
                    &record.county,
                ));
                house.push(Some(HouseAccumulator { weights: Vec::new() }));
                rows.len() - 1
            });

            if !record.has_results() {
                continue;
            }

            let district_total = record.total_votes.unwrap_or(0);
            if district_total > 0 {
                if let (Some(pct), Some(acc)) = (record.pct_reported, house[slot].as_mut()) {
                    acc.weights.push((district_total, pct));
                }
            }

            let tag = record.district.map(|d| format!("[{d}]")).unwrap_or_default();
            for (party, candidate) in &record.candidates {
                rows[slot].add_candidate(
                    PartyBucket::from_code(party),
                    format!("{tag}{}", candidate.name),
                    candidate.votes,
                );
            }
        } else {
            if !record.has_results() {
                continue;
            }

            match index.entry(key) {
                Entry::Occupied(_) => {
                    return Err(PipelineError::DuplicateCounty {
                        year: record.year,
                        state: record.state.clone(),
                        race: record.race,
                        county: record.county.clone(),
                    });
                }
                Entry::Vacant(entry) => {
                    let mut row = AggregatedRow::empty(
                        record.year,
                        record.race,
                        &record.state,
                        &record.county,
                    );
                    row.reported_pct = record.pct_reported;
                    for (party, candidate) in &record.candidates {
                        row.add_candidate(
                            PartyBucket::from_code(party),
                            candidate.name.clone(),
                            candidate.votes,
                        );
                    }
                    entry.insert(rows.len());
                    rows.push(row);
                    house.push(None);
                }
            }
        }
    }

    for (row, acc) in rows.iter_mut().zip(house) {
        if let Some(acc) = acc {
            row.reported_pct = weighted_mean(&acc.weights);
        }
    }

    debug!(records = records.len(), rows = rows.len(), "Aggregated race records");
    Ok(rows)
}

/// Mean of `pct` weighted by vote count; `None` when the weights sum to zero.
fn weighted_mean(weights: &[(u64, f64)]) -> Option<f64> {
    let total: u64 = weights.iter().map(|(votes, _)| votes).sum();
    if total == 0 {
        return None;
    }
    let total = total as f64;
    Some(
        weights
            .iter()
            .map(|&(votes, pct)| pct * (votes as f64 / total))
            .sum(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::results_api::Candidate;
    use std::collections::BTreeMap;

    #[test]
    fn test_statewide_buckets_candidates() {
        let record = record(
            RaceType::President,
            None,
            Some(95.0),
            &[("D", "Harris", 400), ("R", "Trump", 585), ("L", "Oliver", 10), ("G", "Stein", 5)],
        );
        let rows = aggregate_records(&[record]).unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.dem_votes, 400);
        assert_eq!(row.rep_votes, 585);
        assert_eq!(row.other_votes, 15);
        assert_eq!(row.total_votes, 1000);
        assert_eq!(row.other_candidates, vec!["Stein".to_string(), "Oliver".to_string()]);
        assert_eq!(row.reported_pct, Some(95.0));
        assert_eq!(row.dem_pct(), Some(40.0));
    }

    #[test]
    fn test_statewide_without_candidates_is_omitted() {
        let record = record(RaceType::Senate, None, None, &[]);
        let rows = aggregate_records(&[record]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_duplicate_statewide_county_fails() {
        let a = record(RaceType::Governor, None, Some(100.0), &[("D", "A", 1)]);
        let b = a.clone();
        let err = aggregate_records(&[a, b]).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateCounty { .. }));
    }

    #[test]
    fn test_house_districts_merge_with_weighted_pct() {
        let mut d1 = record(RaceType::House, Some(1), Some(90.0), &[("D", "Holmes", 100), ("R", "Moore", 200)]);
        d1.total_votes = Some(300);
        let mut d2 = record(RaceType::House, Some(2), Some(60.0), &[("D", "Figures", 50), ("R", "Dobson", 50)]);
        d2.total_votes = Some(100);

        let rows = aggregate_records(&[d1, d2]).unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.total_votes, 400);
        assert_eq!(row.dem_votes + row.rep_votes + row.other_votes, row.total_votes);
        assert_eq!(
            row.dem_candidates,
            vec!["[1]Holmes".to_string(), "[2]Figures".to_string()]
        );
        // 90 * 0.75 + 60 * 0.25
        let pct = row.reported_pct.unwrap();
        assert!((pct - 82.5).abs() < 1e-9);
        assert!(pct > 60.0 && pct < 90.0);
    }

    #[test]
    fn test_house_without_results_keeps_row_with_null_pct() {
        let d1 = record(RaceType::House, Some(1), Some(90.0), &[]);
        let rows = aggregate_records(&[d1]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_votes, 0);
        assert_eq!(rows[0].reported_pct, None);
        assert_eq!(rows[0].dem_pct(), None);
    }

    #[test]
    fn test_house_zero_vote_district_is_not_weighted() {
        let mut d1 = record(RaceType::House, Some(1), Some(50.0), &[("D", "A", 10)]);
        d1.total_votes = Some(10);
        let mut d2 = record(RaceType::House, Some(2), Some(0.0), &[("R", "B", 0)]);
        d2.total_votes = Some(0);

        let rows = aggregate_records(&[d1, d2]).unwrap();
        assert_eq!(rows[0].reported_pct, Some(50.0));
    }

    #[test]
    fn test_house_repeat_districts_are_not_duplicates() {
        let d1 = record(RaceType::House, Some(1), Some(100.0), &[("D", "A", 10)]);
        let d1_again = d1.clone();
        assert!(aggregate_records(&[d1, d1_again]).is_ok());
    }

    fn record(
        race: RaceType,
        district: Option<u32>,
        pct_reported: Option<f64>,
        candidates: &[(&str, &str, u64)],
    ) -> RaceRecord {
        let candidates: BTreeMap<String, Candidate> = candidates
            .iter()
            .map(|(party, name, votes)| {
                (
                    party.to_string(),
                    Candidate {
                        name: name.to_string(),
                        votes: *votes,
                        votes_pct: None,
                    },
                )
            })
            .collect();
        let total = candidates.values().map(|c| c.votes).sum();
        RaceRecord {
            year: 2024,
            state: "AL".to_string(),
            county: "Baldwin".to_string(),
            race,
            district,
            pct_reported,
            total_votes: Some(total),
            candidates,
            timestamp: None,
        }
    }
}
