// Wire types for the IAM and resource controller APIs

use serde::{Deserialize, Serialize};

pub const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateResourceKeyRequest<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub role: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceKeyResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub credentials: Option<ResourceKeyCredentials>,
}

#[derive(Clone, Deserialize)]
pub struct ResourceKeyCredentials {
    #[serde(default)]
    pub apikey: Option<String>,
}

impl std::fmt::Debug for ResourceKeyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceKeyCredentials")
            .field("apikey", &self.apikey.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Error bodies of both APIs. IAM answers with `errorMessage`, the resource
/// controller with `message` and an `errors` list.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorItem {
    message: Option<String>,
}

/// Best human-readable message from an error response body
pub fn error_message(body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .message
        .or(parsed.error_message)
        .or_else(|| parsed.errors.into_iter().find_map(|item| item.message))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        })
}
