//! Client for the webhook backend's control API

use hooklens_common::{endpoints, SessionResponse, SessionStatus, StartSessionRequest};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Control API failures
#[derive(Debug, Error)]
pub enum ControlApiError {
    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend rejected the call ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Client for the backend control surface on the capture port
///
/// All calls carry a bounded timeout so a dead backend cannot park the
/// session controller in a transitional state forever.
#[derive(Clone)]
pub struct ControlClient {
    base_url: String,
    client: Client,
}

impl ControlClient {
    /// Create a client for the backend listening on `port`
    pub fn new(port: u16) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Start a capture session
    pub async fn start(
        &self,
        port: u16,
        enable_tunnel: bool,
    ) -> Result<SessionResponse, ControlApiError> {
        let url = format!("{}{}", self.base_url, endpoints::START);
        let response = self
            .client
            .post(&url)
            .json(&StartSessionRequest { port, enable_tunnel })
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    /// Stop the running capture session
    pub async fn stop(&self) -> Result<(), ControlApiError> {
        let url = format!("{}{}", self.base_url, endpoints::STOP);
        let response = self.client.post(&url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Query the backend session status
    pub async fn status(&self) -> Result<SessionStatus, ControlApiError> {
        let url = format!("{}{}", self.base_url, endpoints::STATUS);
        let response = self.client.get(&url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Enable the public tunnel for the running session
    pub async fn enable_tunnel(&self) -> Result<SessionResponse, ControlApiError> {
        let url = format!("{}{}", self.base_url, endpoints::TUNNEL_ENABLE);
        let response = self.client.post(&url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Disable the public tunnel for the running session
    pub async fn disable_tunnel(&self) -> Result<SessionResponse, ControlApiError> {
        let url = format!("{}{}", self.base_url, endpoints::TUNNEL_DISABLE);
        let response = self.client.post(&url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ControlApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(ControlApiError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
