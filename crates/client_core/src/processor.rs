use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::CONTENT_TYPE,
    multipart::{Form, Part},
    Client,
};
use shared::{
    error::ErrorPayload,
    protocol::{HealthResponse, HEALTH_ROUTE, IMAGE_FIELD, REMOVE_BACKGROUND_ROUTE},
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::ProcessError,
    workflow::{ProcessedImage, SelectedImage},
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait RemoteProcessor: Send + Sync {
    async fn remove_background(&self, image: &SelectedImage) -> Result<ProcessedImage, ProcessError>;

    /// Liveness check. Processors without one report healthy.
    async fn health(&self) -> Result<HealthResponse, ProcessError> {
        Ok(HealthResponse::ok())
    }
}

/// Remote processor reached over `POST /api/remove-background`.
pub struct HttpRemoteProcessor {
    http: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpRemoteProcessor {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid processor url '{base_url}'"))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build processor http client")?;
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn endpoint(&self) -> Result<Url> {
        self.base_url
            .join(REMOVE_BACKGROUND_ROUTE)
            .context("failed to build remove-background url")
    }

    fn classify(&self, err: reqwest::Error) -> ProcessError {
        if err.is_timeout() {
            ProcessError::Timeout(self.timeout)
        } else {
            ProcessError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl RemoteProcessor for HttpRemoteProcessor {
    async fn remove_background(&self, image: &SelectedImage) -> Result<ProcessedImage, ProcessError> {
        let endpoint = self
            .endpoint()
            .map_err(|err| ProcessError::Transport(err.to_string()))?;
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name().to_string())
            .mime_str(image.mime_type())
            .map_err(|err| ProcessError::Transport(err.to_string()))?;
        let form = Form::new().part(IMAGE_FIELD, part);

        debug!(%endpoint, file_name = image.file_name(), "uploading image");
        let response = self
            .http
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.bytes().await {
                Ok(body) => body,
                Err(err) if err.is_timeout() => return Err(ProcessError::Timeout(self.timeout)),
                Err(_) => Default::default(),
            };
            let message = ErrorPayload::message_or_generic(&body);
            warn!(status = status.as_u16(), %message, "processor rejected image");
            return Err(ProcessError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(|err| self.classify(err))?;
        if bytes.is_empty() {
            return Err(ProcessError::EmptyResponse);
        }
        Ok(ProcessedImage::new(bytes, content_type))
    }

    async fn health(&self) -> Result<HealthResponse, ProcessError> {
        let url = self
            .base_url
            .join(HEALTH_ROUTE)
            .map_err(|err| ProcessError::Transport(err.to_string()))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| self.classify(err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProcessError::Rejected {
                status: status.as_u16(),
                message: format!("health check returned {status}"),
            });
        }
        response.json().await.map_err(|err| self.classify(err))
    }
}

#[cfg(test)]
#[path = "tests/processor_tests.rs"]
mod tests;
