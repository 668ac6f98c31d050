//! Remote sink ("beam") delivery
//!
//! Optionally ships round-trip blobs and the final usage summary to a
//! remote collector over HTTP. Delivery failures are reported to the
//! operator and never abort monitoring.

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::session::{RoundTrip, UsageSummary};
use crate::utils::error::{MonitorError, MonitorResult};

/// Per-round-trip delivery endpoint
const EXCHANGE_ENDPOINT: &str = "api/exchange";

/// Session-final summary endpoint
const SUMMARY_ENDPOINT: &str = "api/summary";

/// HTTP client for the remote collector
#[derive(Debug, Clone)]
pub struct BeamClient {
    client: Client,
    base_url: String,
    monitored_program: String,
}

impl BeamClient {
    /// Create a client for the given collector base URL
    pub fn new(base_url: &str, monitored_program: impl Into<String>) -> MonitorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            monitored_program: monitored_program.into(),
        })
    }

    /// Collector base URL, without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Summary fields sent over the wire; the per-round-trip breakdown
    /// list stays local
    fn summary_for_transport(&self, summary: &UsageSummary) -> Value {
        json!({
            "conversation_id": summary.conversation_id,
            "monitored_program": self.monitored_program,
            "total_cost": summary.total_cost,
            "total_usage": summary.total_usage,
            "pricing_snapshot": summary.pricing_snapshot,
            "models": summary.models,
        })
    }

    /// Deliver one completed round trip plus the summary so far
    pub async fn send_round_trip(
        &self,
        conversation_id: Uuid,
        round_trip: &RoundTrip,
        summary_so_far: &UsageSummary,
    ) -> MonitorResult<()> {
        let payload = json!({
            "conversation_id": conversation_id,
            "request": round_trip.request,
            "response": round_trip.response,
            "summary": self.summary_for_transport(summary_so_far),
        });
        self.post(EXCHANGE_ENDPOINT, &payload).await
    }

    /// Deliver the session-final usage summary
    pub async fn send_summary(&self, summary: &UsageSummary) -> MonitorResult<()> {
        let payload = json!({
            "summary": self.summary_for_transport(summary),
        });
        self.post(SUMMARY_ENDPOINT, &payload).await
    }

    async fn post(&self, endpoint: &str, payload: &Value) -> MonitorResult<()> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| MonitorError::Beam(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Beam to {} rejected with status {}", url, status);
            return Err(MonitorError::Beam(format!(
                "{} returned status {}",
                url, status
            )));
        }

        debug!("Beamed to {}: {}", url, status);
        Ok(())
    }
}
