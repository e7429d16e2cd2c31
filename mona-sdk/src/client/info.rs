//! Informational endpoint client.

use reqwest::Client;
use url::Url;

use super::ClientError;
use crate::objects::{TestResponse, VisibilityResponse};

/// Typed HTTP client for the plain request/response endpoints.
#[derive(Debug, Clone)]
pub struct InfoClient {
    http: Client,
    base_url: Url,
}

impl InfoClient {
    /// Create a new `InfoClient` rooted at `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /api/test`
    pub async fn test(&self) -> Result<TestResponse, ClientError> {
        let url = self.base_url.join("/api/test")?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/visibility`
    pub async fn visibility(&self) -> Result<VisibilityResponse, ClientError> {
        let url = self.base_url.join("/api/visibility")?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /` – the plain-text liveness message.
    pub async fn liveness(&self) -> Result<String, ClientError> {
        let resp = self.http.get(self.base_url.clone()).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Api { status, body });
        }
        Ok(body)
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
