use std::sync::Arc;
use std::time::SystemTime;
use log::{error, info, warn};
use tokio::spawn;

use crate::audio::{AudioOutput, Tone};
use crate::backend::{AnomalyEvent, EventSink};
use crate::config::types::Thresholds;
use crate::escalation::{EscalationPhase, EscalationState, EscalationTimer};
use crate::inference::tracker::{AnomalyEdge, AnomalyTracker};
use crate::inference::{infer, Inference};
use crate::telemetry::{Reading, Sample, SensorChannel, TelemetryBuffers};

/// Runs every incoming sample through the buffers, the inference function and the anomaly
/// tracker, and reacts to new anomalies.
pub struct Monitor {
    thresholds: Thresholds,
    buffers: TelemetryBuffers,
    tracker: AnomalyTracker,
    last_inference: Inference,
    escalation: EscalationTimer,
    sink: Arc<dyn EventSink>,
    audio: Arc<AudioOutput>,
    last_escalation: EscalationState,
}

impl Monitor {
    pub fn new(thresholds: Thresholds, escalation: EscalationTimer, sink: Arc<dyn EventSink>, audio: Arc<AudioOutput>) -> Self {
        let last_inference = infer(&Reading::default(), &thresholds);

        Monitor {
            thresholds,
            buffers: TelemetryBuffers::default(),
            tracker: AnomalyTracker::default(),
            last_inference,
            escalation,
            sink,
            audio,
            last_escalation: EscalationState::default(),
        }
    }

    pub fn buffers(&self) -> &TelemetryBuffers {
        &self.buffers
    }

    pub fn tracker(&self) -> &AnomalyTracker {
        &self.tracker
    }

    pub fn last_inference(&self) -> &Inference {
        &self.last_inference
    }

    pub fn latest_reading(&self) -> Reading {
        self.buffers.latest_reading()
    }

    /// A sample of one channel; the other channel contributes its latest value.
    pub fn ingest(&mut self, sample: Sample) -> Option<AnomalyEdge> {
        self.buffers.append(sample);
        let reading = self.buffers.latest_reading();
        let edge = self.evaluate(reading, sample.timestamp());

        if sample.channel() == SensorChannel::Airflow {
            self.escalation.observe_airflow(sample.value());
        }
        edge
    }

    /// A reading with both channels at once, as produced by the simulation.
    pub fn ingest_reading(&mut self, reading: Reading, timestamp: SystemTime) -> Option<AnomalyEdge> {
        self.buffers.append(Sample::new(timestamp, SensorChannel::HeartRate, reading.heart_rate));
        self.buffers.append(Sample::new(timestamp, SensorChannel::Airflow, reading.airflow));
        let edge = self.evaluate(reading, timestamp);

        self.escalation.observe_airflow(reading.airflow);
        edge
    }

    fn evaluate(&mut self, reading: Reading, timestamp: SystemTime) -> Option<AnomalyEdge> {
        let inference = infer(&reading, &self.thresholds);
        let edge = self.tracker.observe(&inference, timestamp);
        self.last_inference = inference;

        if let Some(edge) = &edge {
            self.handle_edge(edge, reading);
        }
        edge
    }

    fn handle_edge(&self, edge: &AnomalyEdge, reading: Reading) {
        let kind = edge.entry.kind;
        warn!(
            "Anomaly detected: {} - {} (HR: {:.0}, Flow: {:.1})",
            kind, edge.entry.message, reading.heart_rate, reading.airflow
        );
        self.audio.play(Tone::Alert);

        let event = AnomalyEvent {
            timestamp: edge.entry.timestamp,
            kind,
            message: edge.entry.message.clone(),
            reading,
            confidence_score: edge.confidence_score,
        };
        let sink = self.sink.clone();
        spawn(async move {
            if let Err(err) = sink.record(&event).await {
                error!("Failed to log anomaly event: {}", err);
            }
        });

        if kind.is_critical() {
            self.escalation.arm(kind);
        }
    }

    /// Called with every published escalation state.
    pub fn on_escalation_update(&mut self, state: &EscalationState) {
        if state.phase != self.last_escalation.phase {
            info!("Escalation: {}", state.phase);
        }

        // the countdown publishes once per second
        if state.phase == EscalationPhase::CountingDown && *state != self.last_escalation {
            self.audio.play(Tone::Critical);
        }
        self.last_escalation = *state;
    }

    pub fn reset(&mut self) {
        self.buffers.clear();
        self.tracker.reset();
        self.last_inference = infer(&Reading::default(), &self.thresholds);
    }
}
