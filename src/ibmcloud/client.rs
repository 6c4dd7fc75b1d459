use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::http::RateLimitedHttpClient;
use super::iam::IamAuthenticator;
use super::types::{error_message, CreateResourceKeyRequest, ResourceKeyResponse};
use crate::config::IssuerConfig;
use crate::rotation::{CredentialIssuer, DeleteOutcome, IssuedCredential, IssuerError, IssuerSession};

/// IBM Cloud resource keys as rotatable credentials
#[derive(Debug, Clone)]
pub struct IbmCloudIssuer {
    http: Arc<RateLimitedHttpClient>,
    iam: IamAuthenticator,
    resource_controller_url: Url,
}

impl IbmCloudIssuer {
    pub fn new(config: &IssuerConfig) -> Result<Self, IssuerError> {
        let http = Arc::new(RateLimitedHttpClient::new(
            Duration::from_secs(config.request_timeout_seconds),
            config.requests_per_second,
        )?);
        let iam = IamAuthenticator::new(http.clone(), &config.iam_url)?;
        let resource_controller_url = super::endpoint(&config.resource_controller_url, &[])?;

        info!(
            iam_url = %config.iam_url,
            resource_controller_url = %resource_controller_url,
            "IBM Cloud issuer configured"
        );
        Ok(Self {
            http,
            iam,
            resource_controller_url,
        })
    }
}

#[async_trait]
impl CredentialIssuer for IbmCloudIssuer {
    async fn authenticate(&self, api_key: &str) -> Result<Box<dyn IssuerSession>, IssuerError> {
        let token = self.iam.token(api_key).await?;
        Ok(Box::new(ResourceControllerSession {
            http: self.http.clone(),
            base_url: self.resource_controller_url.clone(),
            token,
        }))
    }
}

/// Resource controller calls authorised by one IAM token
pub struct ResourceControllerSession {
    http: Arc<RateLimitedHttpClient>,
    base_url: Url,
    token: String,
}

impl ResourceControllerSession {
    fn resource_keys_url(&self, key_id: Option<&str>) -> Result<Url, IssuerError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                IssuerError::InvalidEndpoint(format!("{} cannot carry a path", self.base_url))
            })?;
            segments.pop_if_empty().extend(["v2", "resource_keys"]);
            if let Some(id) = key_id {
                segments.push(id);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl IssuerSession for ResourceControllerSession {
    async fn create_credential(
        &self,
        resource_id: &str,
        name: &str,
        role: &str,
    ) -> Result<IssuedCredential, IssuerError> {
        let url = self.resource_keys_url(None)?;
        let body = CreateResourceKeyRequest {
            name,
            source: resource_id,
            role,
        };
        let request = self
            .http
            .client()
            .post(url)
            .bearer_auth(&self.token)
            .json(&body);
        let response = self.http.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IssuerError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let key: ResourceKeyResponse = response
            .json()
            .await
            .map_err(|e| IssuerError::MalformedResponse(format!("resource key response: {e}")))?;
        if key.id.is_empty() {
            return Err(IssuerError::MalformedResponse(
                "resource key response has no id".to_string(),
            ));
        }
        let api_key = key
            .credentials
            .and_then(|credentials| credentials.apikey)
            .filter(|apikey| !apikey.is_empty())
            .ok_or_else(|| {
                IssuerError::MalformedResponse(format!(
                    "resource key {} has no credentials.apikey",
                    key.id
                ))
            })?;

        debug!(resource_key_id = %key.id, "Resource key created");
        Ok(IssuedCredential {
            name: key.name.unwrap_or_else(|| name.to_string()),
            id: key.id,
            api_key,
        })
    }

    async fn delete_credential(&self, credential_id: &str) -> Result<DeleteOutcome, IssuerError> {
        let url = self.resource_keys_url(Some(credential_id))?;
        let request = self.http.client().delete(url).bearer_auth(&self.token);
        let response = self.http.send(request).await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK | StatusCode::ACCEPTED => {
                debug!(resource_key_id = credential_id, "Resource key deleted");
                Ok(DeleteOutcome::Deleted)
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(DeleteOutcome::AlreadyGone),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(IssuerError::Api {
                    status: status.as_u16(),
                    message: error_message(&body),
                })
            }
        }
    }
}
