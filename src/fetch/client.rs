use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes prepared requests against the results API.
///
/// Wrappers (auth, rate limiting) implement this by delegating to an inner
/// client, so the fetch helpers stay independent of transport details.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
