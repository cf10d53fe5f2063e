//! HTTP execution seam
//!
//! [`AuthClient`](crate::AuthClient) decides *when* to send; an
//! [`HttpExecutor`] only sends. Tests substitute a scripted executor.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AuthConfig;
use crate::cookies::ClearableCookieJar;
use crate::error::{AuthError, Result};
use crate::request::{ApiResponse, RequestDescriptor};

/// Sends one request and buffers its response
#[async_trait]
pub trait HttpExecutor: Send + Sync + 'static {
    async fn execute(&self, request: &RequestDescriptor) -> Result<ApiResponse>;
}

/// [`HttpExecutor`] backed by a cookie-carrying `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
    config: AuthConfig,
}

impl ReqwestExecutor {
    /// Build a client that stores cookies in `cookies`
    pub fn new(config: AuthConfig, cookies: Arc<ClearableCookieJar>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_provider(cookies)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Reuse an existing client (it should share the same cookie store)
    pub fn from_client(client: reqwest::Client, config: AuthConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: &RequestDescriptor) -> Result<ApiResponse> {
        let url = self.config.url_for(&request.path);
        tracing::debug!(method = %request.method, url = %url, retried = request.retried, "HTTP request");

        let mut builder = self.client.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AuthError::Timeout
            } else {
                AuthError::Http(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        tracing::debug!(status, url = %url, "HTTP response");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
