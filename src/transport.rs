use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;
use crate::request::ChangeStatusRequest;

/// What came back from the one request attempt of a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpResult {
    Response {
        status: u16,
        /// Parsed JSON body; `None` when the body is empty or not JSON.
        body: Option<serde_json::Value>,
    },
    NoResponse {
        reason: String,
    },
}

#[async_trait]
pub trait ChangeStatusSource: Send + Sync {
    /// Perform exactly one request. Never retries.
    async fn fetch(&self, request: &ChangeStatusRequest) -> HttpResult;
}

pub struct HttpChangeStatusSource {
    client: Client,
}

impl HttpChangeStatusSource {
    pub fn new(request_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl ChangeStatusSource for HttpChangeStatusSource {
    async fn fetch(&self, request: &ChangeStatusRequest) -> HttpResult {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "Change status request failed without a response");
                return HttpResult::NoResponse {
                    reason: e.to_string(),
                };
            }
        };

        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes).ok(),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(status = status, error = %e, "Failed to read response body");
                None
            }
        };

        if !(200..300).contains(&status) {
            tracing::debug!(status = status, body = ?body, "Error response");
        }

        HttpResult::Response { status, body }
    }
}
