use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use split_ticket::config::{RaceType, SourceConfig};
use split_ticket::error::PipelineError;
use split_ticket::fetch::{BasicClient, FetchOutcome, HttpClient, fetch_with_retry};
use split_ticket::parser::parse_county_races;
use split_ticket::services::results_api::{RaceRecord, ResultsSource};

/// County-level race results from the CNN politics API.
pub struct CnnResultsClient<C = BasicClient> {
    http: C,
    base_url: String,
    retry_delay: Duration,
}

impl CnnResultsClient<BasicClient> {
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        Ok(Self::with_client(BasicClient::new(config.timeout)?, config))
    }
}

impl<C: HttpClient> CnnResultsClient<C> {
    pub fn with_client(http: C, config: &SourceConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            retry_delay: config.retry_delay,
        }
    }

    /// `{base}/results/county-races/2024-PG-PA.json`, with `-{district}`
    /// before the extension for House races.
    pub fn race_url(&self, year: u16, state: &str, race: RaceType, district: Option<u32>) -> String {
        match district {
            Some(d) => format!(
                "{}/results/county-races/{}-{}G-{}-{}.json",
                self.base_url,
                year,
                race.code(),
                state,
                d
            ),
            None => format!(
                "{}/results/county-races/{}-{}G-{}.json",
                self.base_url,
                year,
                race.code(),
                state
            ),
        }
    }
}

#[async_trait]
impl<C: HttpClient> ResultsSource for CnnResultsClient<C> {
    async fn county_races(
        &self,
        year: u16,
        state: &str,
        race: RaceType,
        district: Option<u32>,
    ) -> Result<Option<Vec<RaceRecord>>, PipelineError> {
        let url = self.race_url(year, state, race, district);
        let unavailable = |reason: String| PipelineError::SourceUnavailable {
            year,
            state: state.to_string(),
            race,
            district,
            reason,
        };

        match fetch_with_retry(&self.http, &url, self.retry_delay).await {
            Ok(FetchOutcome::Body(bytes)) => {
                let records = parse_county_races(&bytes, year, state, race, district)
                    .map_err(|e| unavailable(format!("unparseable response from {url}: {e}")))?;
                debug!(url = %url, counties = records.len(), "County races loaded");
                Ok(Some(records))
            }
            Ok(FetchOutcome::Status(StatusCode::NOT_FOUND | StatusCode::FORBIDDEN)) => {
                debug!(url = %url, "Race not present");
                Ok(None)
            }
            Ok(FetchOutcome::Status(status)) => {
                Err(unavailable(format!("{url} returned status {status}")))
            }
            Err(e) => Err(unavailable(format!("request to {url} failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_race_urls() {
        let client = CnnResultsClient::new(&SourceConfig::default()).unwrap();
        assert_eq!(
            client.race_url(2024, "PA", RaceType::President, None),
            "https://politics.api.cnn.io/results/county-races/2024-PG-PA.json"
        );
        assert_eq!(
            client.race_url(2020, "AL", RaceType::House, Some(3)),
            "https://politics.api.cnn.io/results/county-races/2020-HG-AL-3.json"
        );
        assert_eq!(
            client.race_url(2024, "NC", RaceType::Governor, None),
            "https://politics.api.cnn.io/results/county-races/2024-GG-NC.json"
        );
    }
}
