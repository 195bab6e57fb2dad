//! HTTP lookup client for assistance metadata.

use crate::config::ClientConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Config error: {0}")]
    Config(String),
}

/// Metadata directory the engine's lookup requests resolve against.
///
/// The engine stays transport-agnostic; anything that can answer these
/// two questions can drive it, including the in-memory stubs used in
/// tests and the replay binary.
#[async_trait]
pub trait AssistanceDirectory: Send + Sync {
    /// Type key of an assistance instance.
    async fn fetch_assistance_type(&self, a_id: &str) -> Result<String, ApiError>;

    /// Definition data for a type key, cached verbatim by the engine.
    async fn fetch_type_data(&self, type_key: &str) -> Result<serde_json::Value, ApiError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeKeyResponse {
    type_key: String,
}

/// Backend directory over plain REST.
#[derive(Clone)]
pub struct RestDirectory {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl RestDirectory {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        let auth_header = build_auth_headers(&config.auth.token)?;
        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.get(url).headers(self.auth_header.clone());
        let response = request.send().await?;
        self.parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let text = response.text().await?;
            Err(ApiError::InvalidResponse(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )))
        }
    }
}

#[async_trait]
impl AssistanceDirectory for RestDirectory {
    async fn fetch_assistance_type(&self, a_id: &str) -> Result<String, ApiError> {
        let path = format!("/api/v1/assistance/{}/type", a_id);
        let response: TypeKeyResponse = self.get_json(&path).await?;
        Ok(response.type_key)
    }

    async fn fetch_type_data(&self, type_key: &str) -> Result<serde_json::Value, ApiError> {
        let path = format!("/api/v1/assistance/types/{}", type_key);
        self.get_json(&path).await
    }
}

fn build_auth_headers(token: &str) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    let value = format!("Bearer {}", token);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&value).map_err(|e| ApiError::Config(e.to_string()))?,
    );
    Ok(headers)
}
