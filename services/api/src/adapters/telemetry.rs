//! services/api/src/adapters/telemetry.rs
//!
//! This module contains the adapter for the appliance's sensor telemetry
//! endpoint. It implements the `TelemetrySource` port from the `core` crate.

use async_trait::async_trait;
use smoker_core::ports::{PortError, PortResult, TelemetryPayload, TelemetrySource};
use std::time::Duration;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `TelemetrySource` port with a plain HTTP GET.
#[derive(Clone)]
pub struct HttpTelemetryAdapter {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpTelemetryAdapter {
    /// Creates a new `HttpTelemetryAdapter`. Without an endpoint every fetch fails,
    /// which makes the poller simulate its readings.
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

//=========================================================================================
// `TelemetrySource` Trait Implementation
//=========================================================================================

#[async_trait]
impl TelemetrySource for HttpTelemetryAdapter {
    async fn fetch(&self) -> PortResult<TelemetryPayload> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| PortError::Unexpected("Telemetry endpoint not configured".to_string()))?;

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Any non-2xx status counts as the endpoint being unavailable.
        let response = response
            .error_for_status()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        response
            .json::<TelemetryPayload>()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}
