use std::sync::Arc;

use crate::audio::AudioOutput;
use crate::backend::{sink_from_config, EventSink};
use crate::config::types::Config;
use crate::escalation::alert::{CaregiverAlert, LogGateway};
use crate::escalation::location::{Geolocator, StaticLocator};
use crate::escalation::EscalationTimer;
use crate::monitor::Monitor;

/// Everything shared by one monitoring run. Built once, disposed at shutdown.
pub struct AppContext {
    pub config: Config,
    pub escalation: EscalationTimer,
    pub sink: Arc<dyn EventSink>,
    pub audio: Arc<AudioOutput>,
}

impl AppContext {
    pub fn new(config: Config, locator: Arc<dyn Geolocator>, alert: Arc<dyn CaregiverAlert>, sink: Arc<dyn EventSink>, audio: AudioOutput) -> Self {
        let escalation = EscalationTimer::new(config.escalation, config.caregiver.clone(), locator, alert);

        AppContext {
            config,
            escalation,
            sink,
            audio: Arc::new(audio),
        }
    }

    pub fn from_config(config: Config) -> Self {
        let locator = Arc::new(StaticLocator::from_config(&config.location));
        let sink = sink_from_config(&config);
        AppContext::new(config, locator, Arc::new(LogGateway), sink, AudioOutput::terminal())
    }

    pub fn monitor(&self) -> Monitor {
        Monitor::new(self.config.thresholds, self.escalation.clone(), self.sink.clone(), self.audio.clone())
    }

    pub fn dispose(&self) {
        self.escalation.dispose();
    }
}
