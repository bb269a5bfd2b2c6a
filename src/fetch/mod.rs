//! HTTP retrieval with a single delayed retry.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::Result;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a completed HTTP exchange.
#[derive(Debug)]
pub enum FetchOutcome {
    /// 2xx response body.
    Body(Vec<u8>),
    /// Any other status; the body is discarded.
    Status(StatusCode),
}

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<FetchOutcome> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Ok(FetchOutcome::Status(status));
    }
    Ok(FetchOutcome::Body(resp.bytes().await?.to_vec()))
}

/// Fetches `url`, retrying once after `retry_delay` on a non-success status
/// or transport error. The second attempt's result is returned as-is.
#[tracing::instrument(skip(client, retry_delay))]
pub async fn fetch_with_retry<C: HttpClient>(
    client: &C,
    url: &str,
    retry_delay: Duration,
) -> Result<FetchOutcome> {
    match fetch_bytes(client, url).await {
        Ok(FetchOutcome::Body(bytes)) => {
            debug!(bytes = bytes.len(), "Fetched");
            return Ok(FetchOutcome::Body(bytes));
        }
        Ok(FetchOutcome::Status(status)) => {
            warn!(status = status.as_u16(), "Fetch returned non-success status, retrying");
        }
        Err(e) => {
            warn!(error = %e, "Fetch failed, retrying");
        }
    }

    tokio::time::sleep(retry_delay).await;
    fetch_bytes(client, url).await
}
