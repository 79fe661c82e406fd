//! Remote data gateway
//!
//! Read-only client for the fleet backend. Every call returns an explicit
//! `Result`: transport failures, non-success statuses and backend rejections
//! are errors, while a malformed `data` field is treated as "no data".

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    config::BackendConfig,
    errors::MonitorError,
    models::{Envelope, HistoryRecord, RawHistoryRecord, Vessel, VesselId},
};

/// Query filters for `GET /api/history`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    pub vessel_id: Option<VesselId>,
    pub date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn for_vessel_day(vessel_id: VesselId, date: NaiveDate) -> Self {
        Self {
            vessel_id: Some(vessel_id),
            date: Some(date),
            limit: None,
        }
    }

    pub fn recent(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(vessel_id) = &self.vessel_id {
            pairs.push(("vessel_id", vessel_id.to_string()));
        }
        if let Some(date) = self.date {
            pairs.push(("date", date.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}

/// Source of vessel lists and history records
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch the current vessel list
    async fn fetch_vessels(&self) -> Result<Vec<Vessel>, MonitorError>;

    /// Fetch history records in the order the backend returns them
    async fn fetch_history(&self, filter: &HistoryFilter)
        -> Result<Vec<HistoryRecord>, MonitorError>;

    /// Most recent history across the fleet, newest first
    async fn recent_activity(&self, limit: usize) -> Result<Vec<HistoryRecord>, MonitorError> {
        let mut records = self.fetch_history(&HistoryFilter::recent(limit)).await?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}

/// HTTP implementation of [`TelemetrySource`]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpGateway {
    pub fn new(config: &BackendConfig) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue a GET and unwrap the response envelope
    async fn get_envelope(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<Envelope, MonitorError> {
        let url = self.url(path);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .inspect_err(|e| error!("Request to {} failed: {}", url, classify(e)))?;

        let status = response.status();
        if !status.is_success() {
            error!("Backend returned {} for {}", status, url);
            return Err(MonitorError::BackendStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body: Value = response
            .json()
            .await
            .inspect_err(|e| error!("Reading response from {} failed: {}", url, classify(e)))?;

        let envelope = Envelope::from_value(body);
        if envelope.success == Some(false) {
            let message = envelope
                .message
                .unwrap_or_else(|| "no message".to_string());
            warn!("Backend rejected {}: {}", url, message);
            return Err(MonitorError::BackendRejected(message));
        }
        Ok(envelope)
    }
}

#[async_trait]
impl TelemetrySource for HttpGateway {
    async fn fetch_vessels(&self) -> Result<Vec<Vessel>, MonitorError> {
        let envelope = self
            .get_envelope("/api/vessels", &[("key", self.api_key.clone())])
            .await?;
        Ok(envelope.items())
    }

    async fn fetch_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryRecord>, MonitorError> {
        let envelope = self
            .get_envelope("/api/history", &filter.query_pairs())
            .await?;

        let records = envelope
            .items::<RawHistoryRecord>()
            .into_iter()
            .filter_map(|raw| match HistoryRecord::try_from(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping history record: {}", e);
                    None
                }
            })
            .collect();
        Ok(records)
    }
}

/// Short description of a transport failure for logging
fn classify(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect failed"
    } else if e.is_decode() {
        "decode error"
    } else if e.is_body() {
        "body read error"
    } else if e.is_request() {
        "request error"
    } else {
        "unknown"
    }
}
