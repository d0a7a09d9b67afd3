use std::sync::Arc;
use std::time::SystemTime;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Serialize;
use tokio::time::Duration;

use crate::config::types::Config;
use crate::error::BackendError;
use crate::inference::AnomalyKind;
use crate::telemetry::Reading;

/**
 * How long (milliseconds) a request to the logging backend may take.
 */
pub const REQUEST_TIMEOUT: u64 = 10000;

pub const EVENTS_PATH: &str = "/api/patients";

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyEvent {
    pub timestamp: SystemTime,
    pub kind: AnomalyKind,
    pub message: String,
    pub reading: Reading,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraInfo {
    pub message: String,
    pub heart_rate: f64,
    pub airflow: f64,
    pub confidence_score: f64,
    pub timestamp: String,
}

// The backend stores patients; an anomaly event is carried in its fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub name: String,
    pub age: u32,
    pub caregiver_phone: String,
    pub extra_info: ExtraInfo,
}

impl AnomalyEvent {
    pub fn to_record(&self, caregiver_phone: &str) -> PatientRecord {
        PatientRecord {
            name: self.kind.to_string(),
            age: self.reading.heart_rate.round().max(0.0) as u32,
            caregiver_phone: caregiver_phone.to_string(),
            extra_info: ExtraInfo {
                message: self.message.clone(),
                heart_rate: self.reading.heart_rate,
                airflow: self.reading.airflow,
                confidence_score: self.confidence_score,
                timestamp: humantime::format_rfc3339_millis(self.timestamp).to_string(),
            },
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: &AnomalyEvent) -> Result<(), BackendError>;
}

pub struct HttpEventSink {
    client: Client,
    endpoint: String,
    caregiver_phone: String,
}

impl HttpEventSink {
    pub fn new(base_url: &str, caregiver_phone: &str) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT))
            .build()?;

        Ok(HttpEventSink {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), EVENTS_PATH),
            caregiver_phone: caregiver_phone.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn record(&self, event: &AnomalyEvent) -> Result<(), BackendError> {
        let record = event.to_record(&self.caregiver_phone);
        let response = self.client.post(&self.endpoint).json(&record).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::BackendRejected { status: status.as_u16() });
        }

        info!("[CLOUD SYNC] Stored {} event", event.kind);
        Ok(())
    }
}

/// Used when no backend is configured; events only end up in the log.
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn record(&self, event: &AnomalyEvent) -> Result<(), BackendError> {
        info!(
            "[CLOUD SYNC] {} - {} (HR: {:.0}, Flow: {:.1}, Deviation: {:.2}%)",
            event.kind,
            event.message,
            event.reading.heart_rate,
            event.reading.airflow,
            event.confidence_score,
        );
        Ok(())
    }
}

pub fn sink_from_config(config: &Config) -> Arc<dyn EventSink> {
    match &config.backend.url {
        None => Arc::new(LogEventSink),
        Some(url) => match HttpEventSink::new(url, &config.caregiver.phone) {
            Ok(sink) => {
                info!("Logging anomaly events to {}", sink.endpoint());
                Arc::new(sink)
            },
            Err(err) => {
                warn!("Failed to create backend client, events are only logged locally: {}", err);
                Arc::new(LogEventSink)
            },
        },
    }
}
