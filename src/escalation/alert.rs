use async_trait::async_trait;
use log::warn;

use crate::config::types::Caregiver;
use crate::error::AlertError;
use crate::escalation::location::Location;

pub fn map_link(location: &Location) -> String {
    format!("https://maps.google.com/?q={},{}", location.latitude, location.longitude)
}

pub fn alert_message(location: &Location) -> String {
    format!("EMERGENCY: Anomaly Detected. Location: {}", map_link(location))
}

#[async_trait]
pub trait CaregiverAlert: Send + Sync {
    async fn send_alert(&self, caregiver: &Caregiver, location: Location) -> Result<(), AlertError>;
}

/// Writes the SMS to the log instead of a real gateway.
pub struct LogGateway;

#[async_trait]
impl CaregiverAlert for LogGateway {
    async fn send_alert(&self, caregiver: &Caregiver, location: Location) -> Result<(), AlertError> {
        if caregiver.phone.trim().is_empty() {
            return Err(AlertError::Delivery(format!("no phone number configured for {}", caregiver.name)));
        }
        if !caregiver.notifications.sms {
            warn!("SMS notifications are disabled for {}, sending the emergency alert anyway", caregiver.name);
        }

        warn!("[SMS GATEWAY] Sending alert to {} ({})", caregiver.phone, caregiver.name);
        warn!("[SMS CONTENT] {}", alert_message(&location));
        Ok(())
    }
}
