// IBM Cloud credential issuer: IAM token exchange plus resource controller keys

pub mod client;
pub mod http;
pub mod iam;
pub mod types;

pub use client::{IbmCloudIssuer, ResourceControllerSession};
pub use http::RateLimitedHttpClient;
pub use iam::IamAuthenticator;

use reqwest::Url;

use crate::rotation::IssuerError;

/// Parse a configured base URL and append `segments` to its path
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url, IssuerError> {
    let mut url = Url::parse(base)
        .map_err(|e| IssuerError::InvalidEndpoint(format!("{base}: {e}")))?;
    if !segments.is_empty() {
        url.path_segments_mut()
            .map_err(|_| IssuerError::InvalidEndpoint(format!("{base} cannot carry a path")))?
            .pop_if_empty()
            .extend(segments);
    }
    Ok(url)
}
