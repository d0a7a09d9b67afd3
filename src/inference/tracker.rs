use std::collections::VecDeque;
use std::time::SystemTime;

use crate::inference::{AnomalyKind, AnomalyStatus, Inference};

pub const MAX_ANOMALY_LOGS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyLogEntry {
    pub timestamp: SystemTime,
    pub kind: AnomalyKind,
    pub message: String,
}

/// Returned by [`AnomalyTracker::observe`] when the status changes from normal to anomalous.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyEdge {
    pub entry: AnomalyLogEntry,
    pub confidence_score: f64,
}

#[derive(Debug, Clone)]
pub struct AnomalyTracker {
    status: AnomalyStatus,
    message: String,
    confidence_score: f64,
    history: VecDeque<AnomalyLogEntry>, // newest first
}

impl Default for AnomalyTracker {
    fn default() -> Self {
        AnomalyTracker {
            status: AnomalyStatus::Normal,
            message: String::new(),
            confidence_score: 0.0,
            history: VecDeque::with_capacity(MAX_ANOMALY_LOGS + 1),
        }
    }
}

impl AnomalyTracker {
    pub fn status(&self) -> AnomalyStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn history(&self) -> impl Iterator<Item = &AnomalyLogEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Updates the tracked status and reports an edge only when leaving the normal status.
    /// Staying anomalous does not report again, not even when the kind changes.
    pub fn observe(&mut self, inference: &Inference, timestamp: SystemTime) -> Option<AnomalyEdge> {
        let previous = self.status;
        self.status = inference.status;
        self.confidence_score = inference.confidence_score;

        match (previous, inference.status, inference.kind) {
            (AnomalyStatus::Normal, AnomalyStatus::AnomalyDetected, Some(kind)) => {
                let entry = AnomalyLogEntry {
                    timestamp,
                    kind,
                    message: inference.message.clone(),
                };

                self.history.push_front(entry.clone());
                self.history.truncate(MAX_ANOMALY_LOGS);
                self.message = inference.message.clone();

                Some(AnomalyEdge { entry, confidence_score: inference.confidence_score })
            },
            (_, AnomalyStatus::Normal, _) => {
                self.message.clear();
                None
            },
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        *self = AnomalyTracker::default();
    }
}
