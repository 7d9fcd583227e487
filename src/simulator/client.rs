//! Simulator REST API Client
//!
//! HTTP client for the coffee-machine simulator's stats and control
//! endpoints.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use super::types::SimulatorSnapshot;
use super::SimulatorApi;
use crate::config::SimulatorConfig;

const STATS_PATH: &str = "/api/simulator/stats";
const TRIGGER_PATH: &str = "/api/simulator/trigger";
const RESET_PATH: &str = "/api/simulator/reset";
const HEALTH_PATH: &str = "/api/simulator/health";

/// Simulator REST API client
pub struct SimulatorClient {
    client: Client,
    base_url: String,
}

impl SimulatorClient {
    /// Create a new client with the given configuration
    pub fn new(config: &SimulatorConfig) -> Result<Self, SimulatorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SimulatorError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(map_transport)?;

        read_json(response).await
    }

    /// POST with an empty body, returning whatever JSON the endpoint answers
    async fn post_empty(&self, path: &str) -> Result<Value, SimulatorError> {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(map_transport)?;

        read_json(response).await
    }
}

#[async_trait]
impl SimulatorApi for SimulatorClient {
    async fn fetch_stats(&self) -> Result<SimulatorSnapshot, SimulatorError> {
        self.get_json(STATS_PATH)
            .await
            .map_err(|e| e.context("fetch simulator stats"))
    }

    async fn trigger(&self) -> Result<Value, SimulatorError> {
        let result = self.post_empty(TRIGGER_PATH).await;
        match &result {
            Ok(body) => tracing::info!(response = %body, "Triggered data generation"),
            Err(e) => tracing::error!(error = %e, "Failed to trigger data generation"),
        }
        result
    }

    async fn reset(&self) -> Result<Value, SimulatorError> {
        let result = self.post_empty(RESET_PATH).await;
        match &result {
            Ok(body) => tracing::info!(response = %body, "Reset machine states"),
            Err(e) => tracing::error!(error = %e, "Failed to reset machine states"),
        }
        result
    }

    async fn health(&self) -> Result<Value, SimulatorError> {
        self.get_json(HEALTH_PATH)
            .await
            .map_err(|e| e.context("get simulator health"))
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, SimulatorError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SimulatorError::Status(status.as_u16()));
    }

    response
        .json()
        .await
        .map_err(|e| SimulatorError::Decode(e.to_string()))
}

fn map_transport(e: reqwest::Error) -> SimulatorError {
    if e.is_timeout() {
        SimulatorError::Timeout
    } else if e.is_connect() {
        SimulatorError::Unavailable
    } else {
        SimulatorError::Request(e)
    }
}

// ============================================
// Errors
// ============================================

/// Errors that can occur when talking to the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Simulator unavailable")]
    Unavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to {action}: {source}")]
    Endpoint {
        action: &'static str,
        #[source]
        source: Box<SimulatorError>,
    },
}

impl SimulatorError {
    /// Wrap this error with the operation that failed
    pub fn context(self, action: &'static str) -> Self {
        SimulatorError::Endpoint {
            action,
            source: Box::new(self),
        }
    }

    /// HTTP status code behind this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            SimulatorError::Status(code) => Some(*code),
            SimulatorError::Endpoint { source, .. } => source.status(),
            _ => None,
        }
    }
}
