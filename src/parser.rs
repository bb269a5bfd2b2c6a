//! JSON parser for county-race payloads from the results API.

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::config::RaceType;
use crate::services::results_api::{Candidate, RaceRecord};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountyRacePayload {
    county_name: String,
    percent_reporting: Option<f64>,
    total_vote: Option<u64>,
    #[serde(default)]
    candidates: Vec<CandidatePayload>,
    extracted_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidatePayload {
    candidate_party_code: String,
    full_name: String,
    #[serde(default)]
    vote_num: u64,
    vote_percent_str: Option<String>,
}

/// Decodes a county-race payload (a JSON array, one element per county)
/// into [`RaceRecord`]s tagged with the requested race key.
///
/// When two candidates share a party code, the later one wins.
///
/// # Errors
///
/// Returns an error if the bytes are not a JSON array of county results.
pub fn parse_county_races(
    bytes: &[u8],
    year: u16,
    state: &str,
    race: RaceType,
    district: Option<u32>,
) -> Result<Vec<RaceRecord>> {
    let payload: Vec<CountyRacePayload> = serde_json::from_slice(bytes)?;

    let records = payload
        .into_iter()
        .map(|county| {
            let candidates: BTreeMap<String, Candidate> = county
                .candidates
                .into_iter()
                .map(|c| {
                    let votes_pct = c
                        .vote_percent_str
                        .as_deref()
                        .and_then(|s| s.trim().parse::<f64>().ok());
                    (
                        c.candidate_party_code,
                        Candidate {
                            name: c.full_name,
                            votes: c.vote_num,
                            votes_pct,
                        },
                    )
                })
                .collect();

            RaceRecord {
                year,
                state: state.to_string(),
                county: county.county_name,
                race,
                district,
                pct_reported: county.percent_reporting,
                total_votes: county.total_vote,
                candidates,
                timestamp: county.extracted_at,
            }
        })
        .collect();

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "countyName": "Baldwin",
            "percentReporting": 95.0,
            "totalVote": 1000,
            "extractedAt": "2024-11-13T07:55:26.402536",
            "candidates": [
                { "candidatePartyCode": "D", "fullName": "Kamala Harris", "voteNum": 400, "votePercentStr": "40.0" },
                { "candidatePartyCode": "R", "fullName": "Donald Trump", "voteNum": 585, "votePercentStr": "58.5" },
                { "candidatePartyCode": "L", "fullName": "Chase Oliver", "voteNum": 15, "votePercentStr": "n/a" }
            ]
        },
        { "countyName": "Mobile", "percentReporting": null, "totalVote": null }
    ]"#;

    #[test]
    fn test_parse_sample_payload() {
        let records =
            parse_county_races(SAMPLE.as_bytes(), 2024, "AL", RaceType::President, None).unwrap();
        assert_eq!(records.len(), 2);

        let baldwin = &records[0];
        assert_eq!(baldwin.county, "Baldwin");
        assert_eq!(baldwin.state, "AL");
        assert_eq!(baldwin.total_votes, Some(1000));
        assert_eq!(baldwin.pct_reported, Some(95.0));
        assert_eq!(baldwin.candidates.len(), 3);
        assert_eq!(baldwin.candidates["R"].votes, 585);
        assert_eq!(baldwin.candidates["R"].votes_pct, Some(58.5));
        assert_eq!(baldwin.candidates["L"].votes_pct, None);

        let mobile = &records[1];
        assert!(!mobile.has_results());
        assert_eq!(mobile.total_votes, None);
    }

    #[test]
    fn test_parse_tags_district() {
        let records =
            parse_county_races(SAMPLE.as_bytes(), 2020, "AL", RaceType::House, Some(2)).unwrap();
        assert!(records.iter().all(|r| r.district == Some(2)));
        assert!(records.iter().all(|r| r.race == RaceType::House));
    }

    #[test]
    fn test_parse_invalid_bytes() {
        let result = parse_county_races(b"{not json", 2024, "AL", RaceType::President, None);
        assert!(result.is_err());
    }
}
