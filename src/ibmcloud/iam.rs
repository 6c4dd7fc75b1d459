use reqwest::Url;
use std::sync::Arc;
use tracing::debug;

use super::http::RateLimitedHttpClient;
use super::types::{error_message, TokenResponse, APIKEY_GRANT_TYPE};
use crate::rotation::IssuerError;

/// Exchanges IBM Cloud API keys for IAM bearer tokens
#[derive(Debug, Clone)]
pub struct IamAuthenticator {
    http: Arc<RateLimitedHttpClient>,
    token_url: Url,
}

impl IamAuthenticator {
    pub fn new(http: Arc<RateLimitedHttpClient>, iam_url: &str) -> Result<Self, IssuerError> {
        let token_url = super::endpoint(iam_url, &["identity", "token"])?;
        Ok(Self { http, token_url })
    }

    pub async fn token(&self, api_key: &str) -> Result<String, IssuerError> {
        if api_key.is_empty() {
            return Err(IssuerError::Authentication("API key is empty".to_string()));
        }

        let request = self
            .http
            .client()
            .post(self.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", APIKEY_GRANT_TYPE), ("apikey", api_key)]);
        let response = self.http.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IssuerError::Authentication(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_message(&body)
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| IssuerError::MalformedResponse(format!("IAM token response: {e}")))?;
        if token.access_token.is_empty() {
            return Err(IssuerError::MalformedResponse(
                "IAM token response has no access_token".to_string(),
            ));
        }

        debug!(expires_in = ?token.expires_in, "Obtained IAM token");
        Ok(token.access_token)
    }
}
