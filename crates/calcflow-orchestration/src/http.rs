//! `reqwest` clients for the calculation service and the API endpoint.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use calcflow_core::CalcError;

use crate::api::{ApiClient, ApiRequest};
use crate::transport::{CalcService, CalculationRequest, CalculationResponse, ServiceFault};

fn build_client(timeout: Duration) -> Result<Client, CalcError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CalcError::Transport(format!("failed to build HTTP client: {e}")))
}

/// Posts calculation requests as JSON to a single endpoint.
#[derive(Debug, Clone)]
pub struct HttpCalcService {
    client: Client,
    endpoint: String,
}

impl HttpCalcService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CalcError> {
        Ok(Self::with_client(build_client(timeout)?, endpoint))
    }

    #[must_use]
    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CalcService for HttpCalcService {
    fn calculate<'a>(&'a self, request: &'a CalculationRequest) -> BoxFuture<'a, Result<CalculationResponse, ServiceFault>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .json(request)
                .send()
                .await
                .map_err(|e| ServiceFault::new(format!("calculation request failed: {e}")))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ServiceFault::new(format!("failed to read calculation response: {e}")))?;
            debug!(calc_engine = %request.configuration.calc_engine, %status, bytes = body.len(), "calculation response");

            if !status.is_success() {
                return Err(ServiceFault::new(format!("calculation service returned {status}")).with_detail(body));
            }
            serde_json::from_str(&body)
                .map_err(|e| ServiceFault::new(format!("invalid calculation response: {e}")).with_detail(body))
        })
    }
}

/// Posts API commands to `{base_url}/{command}`.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: Client,
    base_url: String,
}

impl HttpApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CalcError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    #[must_use]
    pub fn command_url(&self, command: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), command.trim_start_matches('/'))
    }
}

impl ApiClient for HttpApiClient {
    fn submit<'a>(&'a self, command: &'a str, request: &'a ApiRequest) -> BoxFuture<'a, Result<Value, CalcError>> {
        Box::pin(async move {
            let url = self.command_url(command);
            debug!(%url, "submitting API command");
            let response = self
                .client
                .post(&url)
                .json(request)
                .send()
                .await
                .map_err(|e| CalcError::Transport(format!("{command} request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CalcError::Transport(format!("{command} returned {status}: {body}")));
            }
            let body = response
                .text()
                .await
                .map_err(|e| CalcError::Transport(format!("failed to read {command} response: {e}")))?;
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            Ok(serde_json::from_str(&body)?)
        })
    }
}
