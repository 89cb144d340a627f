//! Delivery client: one record, one bounded HTTP attempt.

use crate::{Record, RelayResult};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Why a delivery attempt did not count as accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// Collector answered with something other than `200 OK`.
    #[error("collector returned HTTP {0}")]
    Status(u16),
    /// No response within the per-attempt timeout.
    #[error("delivery timed out")]
    Timeout,
    /// Could not connect to the collector.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Record could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// Any other transport error.
    #[error("transport error: {0}")]
    Other(String),
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Accepted,
    Failed(DeliveryFailure),
}

impl DeliveryOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DeliveryOutcome::Accepted)
    }
}

/// Hands one record to the collector.
///
/// Implementations make exactly one attempt and never retry; retry policy
/// belongs to the caller.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, record: &Record) -> DeliveryOutcome;
}

#[async_trait]
impl<T: Deliver + ?Sized> Deliver for Arc<T> {
    async fn deliver(&self, record: &Record) -> DeliveryOutcome {
        (**self).deliver(record).await
    }
}

/// Shared handle to a delivery client.
pub type DeliveryHandle = Arc<dyn Deliver>;

/// HTTP delivery configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Collector ingestion endpoint.
    pub endpoint: Url,
    /// Upper bound on a single attempt, connect included.
    pub timeout: Duration,
}

impl DeliveryConfig {
    pub fn new(endpoint: &str, timeout: Duration) -> RelayResult<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            timeout,
        })
    }
}

/// Delivers records with a JSON `POST` to the collector.
#[derive(Debug, Clone)]
pub struct HttpDeliveryClient {
    config: DeliveryConfig,
    client: Client,
}

impl HttpDeliveryClient {
    /// Create a new client.
    pub fn new(config: DeliveryConfig) -> RelayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn endpoint(&self) -> &Url {
        &self.config.endpoint
    }
}

#[async_trait]
impl Deliver for HttpDeliveryClient {
    async fn deliver(&self, record: &Record) -> DeliveryOutcome {
        let body = match record.to_line() {
            Ok(body) => body,
            Err(e) => return DeliveryOutcome::Failed(DeliveryFailure::Serialization(e.to_string())),
        };

        let result = self
            .client
            .post(self.config.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;

        // The response body is never read
        let outcome = match result {
            Ok(response) if response.status() == StatusCode::OK => DeliveryOutcome::Accepted,
            Ok(response) => {
                DeliveryOutcome::Failed(DeliveryFailure::Status(response.status().as_u16()))
            }
            Err(e) if e.is_timeout() => DeliveryOutcome::Failed(DeliveryFailure::Timeout),
            Err(e) if e.is_connect() => {
                DeliveryOutcome::Failed(DeliveryFailure::Connect(e.to_string()))
            }
            Err(e) => DeliveryOutcome::Failed(DeliveryFailure::Other(e.to_string())),
        };

        if let DeliveryOutcome::Failed(failure) = &outcome {
            debug!(
                endpoint = %self.config.endpoint,
                error = %failure,
                "Delivery attempt failed"
            );
        }

        outcome
    }
}
