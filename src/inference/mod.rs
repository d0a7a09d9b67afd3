use crate::config::types::Thresholds;
use crate::telemetry::Reading;

pub mod tracker;

// Baseline population statistics, derived offline.
pub const BASELINE_HEART_RATE_MEAN: f64 = 75.0;
pub const BASELINE_HEART_RATE_STD: f64 = 10.0;
pub const BASELINE_AIRFLOW_MEAN: f64 = 20.0;
pub const BASELINE_AIRFLOW_STD: f64 = 5.0;

/**
 * Airflow below this value together with an elevated heart rate matches a constricted airway.
 */
pub const NARROW_AIRWAY_AIRFLOW: f64 = 12.0;

/**
 * The combined deviation which maps to a confidence score of 100.
 */
pub const FULL_CONFIDENCE_DEVIATION: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyStatus {
    Normal,
    AnomalyDetected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyKind {
    NarrowAirway,
    Tachycardia,
    FlowAnomaly,
}

impl AnomalyKind {
    /// Critical anomalies may start a location sharing escalation.
    pub fn is_critical(&self) -> bool {
        matches!(self, AnomalyKind::NarrowAirway | AnomalyKind::Tachycardia)
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            AnomalyKind::NarrowAirway => "Narrow Airway",
            AnomalyKind::Tachycardia => "Tachycardia",
            AnomalyKind::FlowAnomaly => "Flow Anomaly",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub status: AnomalyStatus,
    pub kind: Option<AnomalyKind>,
    pub message: String,
    pub confidence_score: f64,
}

/// Euclidean norm of the per channel z-scores against the baseline.
pub fn deviation(reading: &Reading) -> f64 {
    let heart_rate_z = (reading.heart_rate - BASELINE_HEART_RATE_MEAN) / BASELINE_HEART_RATE_STD;
    let airflow_z = (reading.airflow - BASELINE_AIRFLOW_MEAN) / BASELINE_AIRFLOW_STD;

    heart_rate_z.hypot(airflow_z)
}

/// Deviation normalized to [0, 100].
pub fn confidence_score(reading: &Reading) -> f64 {
    (deviation(reading) / FULL_CONFIDENCE_DEVIATION * 100.0).clamp(0.0, 100.0)
}

/// Scores a reading. The first matching rule wins: narrow airway, tachycardia, flow anomaly.
pub fn infer(reading: &Reading, thresholds: &Thresholds) -> Inference {
    let confidence_score = confidence_score(reading);

    let kind = if reading.heart_rate > thresholds.elevated_heart_rate && reading.airflow < NARROW_AIRWAY_AIRFLOW {
        Some(AnomalyKind::NarrowAirway)
    } else if reading.heart_rate > thresholds.high_heart_rate {
        Some(AnomalyKind::Tachycardia)
    } else if reading.airflow > thresholds.high_airflow {
        Some(AnomalyKind::FlowAnomaly)
    } else {
        None
    };

    let message = match kind {
        Some(AnomalyKind::NarrowAirway) => format!(
            "Airway constriction signature matched (Confidence: {}%). Inhaler required.",
            confidence_score.round()
        ),
        Some(AnomalyKind::Tachycardia) => String::from("Heart Rate deviation > 2σ from baseline."),
        Some(AnomalyKind::FlowAnomaly) => String::from("Inhaler technique outside normal distribution."),
        None => String::new(),
    };

    Inference {
        status: if kind.is_some() { AnomalyStatus::AnomalyDetected } else { AnomalyStatus::Normal },
        kind,
        message,
        confidence_score,
    }
}
