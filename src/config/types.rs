use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    /// Heart rate above which a low airflow reading counts as a narrow airway.
    pub elevated_heart_rate: f64,
    pub high_heart_rate: f64,
    pub high_airflow: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            elevated_heart_rate: 100.0,
            high_heart_rate: 130.0,
            high_airflow: 70.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EscalationConfig {
    pub location_sharing_enabled: bool,
    /// Seconds between acquiring the location and alerting the caregiver.
    pub delay_secs: u64,
    /// An airflow sample above this value while counting down means the inhaler was used.
    pub corrective_airflow_threshold: f64,
    /// Seconds a terminal phase (sent, cancelled) stays visible before returning to idle.
    pub reset_delay_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        EscalationConfig {
            location_sharing_enabled: false,
            delay_secs: 300,
            corrective_airflow_threshold: 25.0,
            reset_delay_secs: 5,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub push: bool,
    pub sms: bool,
    pub email: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Caregiver {
    pub name: String,
    pub relationship: String,
    pub email: String,
    pub phone: String,
    pub notifications: NotificationPreferences,
}

impl Default for Caregiver {
    fn default() -> Self {
        Caregiver {
            name: String::from("Dr. Evelyn Reed"),
            relationship: String::from("Primary Pulmonologist"),
            email: String::from("e.reed@clinic.com"),
            phone: String::from("+1 (555) 987-6543"),
            notifications: NotificationPreferences { push: true, sms: true, email: false },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    /// Base url of the anomaly log, e.g. `http://localhost:5000`. Events are only logged locally when unset.
    pub url: Option<String>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub escalation: EscalationConfig,
    pub caregiver: Caregiver,
    pub backend: BackendConfig,
    pub location: LocationConfig,
}
