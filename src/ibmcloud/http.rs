use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::{RequestBuilder, Response};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::rotation::IssuerError;

/// reqwest client with a shared outbound rate limit
#[derive(Debug, Clone)]
pub struct RateLimitedHttpClient {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl RateLimitedHttpClient {
    /// Create a client allowing `requests_per_second` requests, with bursts of
    /// the same size. A zero budget is treated as one request per second.
    pub fn new(request_timeout: Duration, requests_per_second: u32) -> Result<Self, IssuerError> {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(per_second);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("credential-rotator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IssuerError::Transport(Box::new(e)))?;

        Ok(Self {
            client,
            rate_limiter,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Wait for rate limit permission, then send
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, IssuerError> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        debug!("Executing credential issuer request with rate limiting");
        request
            .send()
            .await
            .map_err(|e| IssuerError::Transport(Box::new(e)))
    }
}
