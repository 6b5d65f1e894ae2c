use std::time::Duration;

use async_trait::async_trait;
use inkshop_api_types::{InvalidateRequest, InvalidateResponse, RegistrySnapshot, ResourceType};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::reconciler::RegistrySource;

const INVALIDATE_PATH: &str = "/api/cache/invalidate";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("failed to parse response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// HTTP client for the invalidation route of an inkshop server.
#[derive(Clone, Debug)]
pub struct RegistryClient {
    client: Client,
    endpoint: Url,
}

impl RegistryClient {
    pub fn new(base: &Url, timeout: Duration) -> Result<Self, RemoteError> {
        let endpoint = base.join(INVALIDATE_PATH)?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn user_agent() -> &'static str {
        concat!("inkshop/", env!("CARGO_PKG_VERSION"))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn snapshot(&self) -> Result<RegistrySnapshot, RemoteError> {
        let resp = self.client.get(self.endpoint.clone()).send().await?;
        Self::handle(resp).await
    }

    pub async fn invalidate(
        &self,
        resource: ResourceType,
        secret: &str,
    ) -> Result<InvalidateResponse, RemoteError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&InvalidateRequest::new(resource, secret))
            .send()
            .await?;
        Self::handle(resp).await
    }

    async fn handle<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(RemoteError::Server {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl RegistrySource for RegistryClient {
    async fn fetch_snapshot(&self) -> Result<RegistrySnapshot, RemoteError> {
        self.snapshot().await
    }
}
