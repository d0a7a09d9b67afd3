use std::sync::{Arc, Mutex, MutexGuard};
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::types::{Caregiver, EscalationConfig};
use crate::escalation::alert::CaregiverAlert;
use crate::escalation::location::{locate_or_mock, Geolocator, Location};
use crate::inference::AnomalyKind;

pub mod alert;
pub mod location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationPhase {
    Idle,
    PendingLocation,
    CountingDown,
    Sent,
    Cancelled,
    CancelledByDeviceUse,
}

impl EscalationPhase {
    /// Terminal phases return to idle after the reset delay.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscalationPhase::Sent | EscalationPhase::Cancelled | EscalationPhase::CancelledByDeviceUse)
    }
}

impl std::fmt::Display for EscalationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            EscalationPhase::Idle => "Idle",
            EscalationPhase::PendingLocation => "Checking location",
            EscalationPhase::CountingDown => "Use inhaler now",
            EscalationPhase::Sent => "Alert sent",
            EscalationPhase::Cancelled => "Cancelled",
            EscalationPhase::CancelledByDeviceUse => "Inhaler use detected",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscalationState {
    pub phase: EscalationPhase,
    pub remaining_seconds: u64,
    pub location: Option<Location>,
}

impl Default for EscalationState {
    fn default() -> Self {
        EscalationState {
            phase: EscalationPhase::Idle,
            remaining_seconds: 0,
            location: None,
        }
    }
}

#[derive(Default)]
struct Timers {
    locate: Option<JoinHandle<()>>,
    countdown: Option<JoinHandle<()>>,
    reset: Option<JoinHandle<()>>,
}

fn clear(timer: &mut Option<JoinHandle<()>>) {
    // aborting a finished task is a no-op
    if let Some(handle) = timer.take() {
        handle.abort();
    }
}

struct EscalationInner {
    config: Mutex<EscalationConfig>,
    caregiver: Caregiver,
    state: watch::Sender<EscalationState>,
    // lock order: timers, then state
    timers: Mutex<Timers>,
    locator: Arc<dyn Geolocator>,
    alert: Arc<dyn CaregiverAlert>,
    cancel: CancellationToken,
}

/// The location sharing escalation. Cloning yields a handle to the same escalation.
#[derive(Clone)]
pub struct EscalationTimer {
    inner: Arc<EscalationInner>,
}

impl EscalationTimer {
    pub fn new(config: EscalationConfig, caregiver: Caregiver, locator: Arc<dyn Geolocator>, alert: Arc<dyn CaregiverAlert>) -> Self {
        let (state, _) = watch::channel(EscalationState::default());

        EscalationTimer {
            inner: Arc::new(EscalationInner {
                config: Mutex::new(config),
                caregiver,
                state,
                timers: Mutex::new(Timers::default()),
                locator,
                alert,
                cancel: CancellationToken::new(),
            }),
        }
    }

    fn config(&self) -> EscalationConfig {
        *self.inner.config.lock().expect("Failed to lock EscalationTimer config")
    }

    fn timers(&self) -> MutexGuard<'_, Timers> {
        self.inner.timers.lock().expect("Failed to lock EscalationTimer timers")
    }

    // Moves from `from` to the state built by `update`; false if the phase was not `from`.
    fn transition<F: FnOnce(&mut EscalationState)>(&self, from: EscalationPhase, update: F) -> bool {
        self.inner.state.send_if_modified(|state| {
            if state.phase != from {
                return false;
            }
            update(state);
            true
        })
    }

    pub fn state(&self) -> EscalationState {
        *self.inner.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<EscalationState> {
        self.inner.state.subscribe()
    }

    pub fn location_sharing_enabled(&self) -> bool {
        self.config().location_sharing_enabled
    }

    pub fn set_location_sharing_enabled(&self, enabled: bool) {
        self.inner.config.lock().expect("Failed to lock EscalationTimer config").location_sharing_enabled = enabled;
    }

    /// Starts an escalation for a critical anomaly. Ignored while sharing is disabled or while
    /// another escalation is active.
    pub fn arm(&self, kind: AnomalyKind) -> bool {
        if !kind.is_critical() || self.inner.cancel.is_cancelled() {
            return false;
        }
        if !self.location_sharing_enabled() {
            debug!("Location sharing disabled, not escalating {}", kind);
            return false;
        }

        let mut timers = self.timers();
        let started = self.transition(EscalationPhase::Idle, |state| {
            state.phase = EscalationPhase::PendingLocation;
            state.location = None;
        });

        if !started {
            debug!("Escalation already in progress, ignoring {}", kind);
            return false;
        }

        info!("Critical anomaly {}: acquiring location", kind);
        let this = self.clone();
        timers.locate = Some(spawn(async move { this.acquire_location().await }));
        true
    }

    async fn acquire_location(self) {
        let location = tokio::select! {
            _ = self.inner.cancel.cancelled() => return,
            location = locate_or_mock(self.inner.locator.as_ref()) => location,
        };

        let delay = self.config().delay_secs;
        let mut timers = self.timers();
        let counting = self.transition(EscalationPhase::PendingLocation, |state| {
            state.phase = EscalationPhase::CountingDown;
            state.remaining_seconds = delay;
            state.location = Some(location);
        });

        if counting {
            warn!("Alerting caregiver in {}s unless the inhaler is used", delay);
            let this = self.clone();
            timers.countdown = Some(spawn(async move { this.count_down(location, delay).await }));
        }
        timers.locate.take();
    }

    async fn count_down(self, location: Location, delay: u64) {
        let second = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + second, second);
        let deadline = sleep(Duration::from_secs(delay));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = self.inner.cancel.cancelled() => return,
                _ = &mut deadline => break,
                _ = ticker.tick() => {
                    self.inner.state.send_if_modified(|state| {
                        if state.phase != EscalationPhase::CountingDown || state.remaining_seconds == 0 {
                            return false;
                        }
                        state.remaining_seconds -= 1;
                        true
                    });
                },
            }
        }

        let sent = {
            let mut timers = self.timers();
            // this task is the countdown, detach instead of aborting it
            timers.countdown.take();
            self.transition(EscalationPhase::CountingDown, |state| {
                state.phase = EscalationPhase::Sent;
                state.remaining_seconds = 0;
            })
        };

        if !sent {
            return;
        }

        if let Err(err) = self.inner.alert.send_alert(&self.inner.caregiver, location).await {
            error!("Failed to alert caregiver: {}", err);
        }
        self.schedule_reset();
    }

    fn schedule_reset(&self) {
        let reset_delay = Duration::from_secs(self.config().reset_delay_secs);
        let this = self.clone();
        let mut timers = self.timers();
        clear(&mut timers.reset);

        timers.reset = Some(spawn(async move {
            tokio::select! {
                _ = this.inner.cancel.cancelled() => {},
                _ = sleep(reset_delay) => {
                    let _timers = this.timers();
                    this.inner.state.send_if_modified(|state| {
                        if !state.phase.is_terminal() {
                            return false;
                        }
                        *state = EscalationState::default();
                        true
                    });
                },
            }
        }));
    }

    fn stop_countdown(&self, phase: EscalationPhase) -> bool {
        let stopped = {
            let mut timers = self.timers();
            let stopped = self.transition(EscalationPhase::CountingDown, |state| state.phase = phase);
            if stopped {
                clear(&mut timers.countdown);
            }
            stopped
        };

        if stopped {
            info!("Escalation stopped: {}", phase);
            self.schedule_reset();
        }
        stopped
    }

    /// An airflow sample above the corrective threshold while counting down means the patient
    /// used the inhaler; the countdown is cancelled.
    pub fn observe_airflow(&self, airflow: f64) -> bool {
        if airflow <= self.config().corrective_airflow_threshold {
            return false;
        }
        self.stop_countdown(EscalationPhase::CancelledByDeviceUse)
    }

    /// User initiated cancellation; only possible while counting down.
    pub fn cancel(&self) -> bool {
        self.stop_countdown(EscalationPhase::Cancelled)
    }

    pub fn dispose(&self) {
        self.inner.cancel.cancel();
        let mut timers = self.timers();
        clear(&mut timers.locate);
        clear(&mut timers.countdown);
        clear(&mut timers.reset);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use async_trait::async_trait;
    use tokio::time::{sleep, Duration};

    use super::*;
    use crate::error::{AlertError, LocationError};
    use crate::escalation::location::{StaticLocator, MOCK_LOCATION};

    #[derive(Default)]
    struct RecordingAlert {
        sent: Mutex<Vec<(String, Location)>>,
    }

    impl RecordingAlert {
        fn sent(&self) -> Vec<(String, Location)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CaregiverAlert for RecordingAlert {
        async fn send_alert(&self, caregiver: &Caregiver, location: Location) -> Result<(), AlertError> {
            self.sent.lock().unwrap().push((caregiver.phone.clone(), location));
            Ok(())
        }
    }

    struct FailingLocator;

    #[async_trait]
    impl Geolocator for FailingLocator {
        async fn current_position(&self) -> Result<Location, LocationError> {
            Err(LocationError::Unavailable)
        }
    }

    const HOME: Location = Location { latitude: 52.37, longitude: 4.89 };

    fn escalation_with(locator: Arc<dyn Geolocator>) -> (EscalationTimer, Arc<RecordingAlert>) {
        let config = EscalationConfig {
            location_sharing_enabled: true,
            delay_secs: 120,
            ..EscalationConfig::default()
        };
        let alert = Arc::new(RecordingAlert::default());
        let escalation = EscalationTimer::new(config, Caregiver::default(), locator, alert.clone());
        (escalation, alert)
    }

    fn escalation() -> (EscalationTimer, Arc<RecordingAlert>) {
        escalation_with(Arc::new(StaticLocator::new(Some(HOME))))
    }

    async fn wait_for_phase(escalation: &EscalationTimer, phase: EscalationPhase) {
        let mut receiver = escalation.watch();
        receiver.wait_for(|state| state.phase == phase).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_sends_alert_then_resets() {
        let (escalation, alert) = escalation();

        assert!(escalation.arm(AnomalyKind::NarrowAirway));
        assert_eq!(escalation.state().phase, EscalationPhase::PendingLocation);

        wait_for_phase(&escalation, EscalationPhase::CountingDown).await;
        assert_eq!(escalation.state().remaining_seconds, 120);
        assert_eq!(escalation.state().location, Some(HOME));

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(escalation.state().remaining_seconds, 119);

        sleep(Duration::from_secs(119)).await;
        assert_eq!(escalation.state().phase, EscalationPhase::Sent);
        assert_eq!(alert.sent(), vec![(Caregiver::default().phone, HOME)]);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(escalation.state(), EscalationState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_use_cancels_and_clears_timer() {
        let (escalation, alert) = escalation();

        escalation.arm(AnomalyKind::Tachycardia);
        wait_for_phase(&escalation, EscalationPhase::CountingDown).await;
        sleep(Duration::from_millis(10_500)).await;

        assert!(!escalation.observe_airflow(25.0));
        assert_eq!(escalation.state().phase, EscalationPhase::CountingDown);

        assert!(escalation.observe_airflow(30.0));
        assert_eq!(escalation.state().phase, EscalationPhase::CancelledByDeviceUse);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(escalation.state().phase, EscalationPhase::CancelledByDeviceUse);

        // well past the countdown deadline
        sleep(Duration::from_secs(200)).await;
        assert_eq!(escalation.state().phase, EscalationPhase::Idle);
        assert!(alert.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_while_counting_down_is_ignored() {
        let (escalation, _alert) = escalation();

        escalation.arm(AnomalyKind::NarrowAirway);
        wait_for_phase(&escalation, EscalationPhase::CountingDown).await;
        sleep(Duration::from_millis(10_500)).await;
        assert_eq!(escalation.state().remaining_seconds, 110);

        assert!(!escalation.arm(AnomalyKind::Tachycardia));
        assert_eq!(escalation.state().remaining_seconds, 110);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(escalation.state().remaining_seconds, 109);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_cancel_then_new_cycle() {
        let (escalation, alert) = escalation();

        assert!(!escalation.cancel());

        escalation.arm(AnomalyKind::NarrowAirway);
        wait_for_phase(&escalation, EscalationPhase::CountingDown).await;
        assert!(escalation.cancel());
        assert_eq!(escalation.state().phase, EscalationPhase::Cancelled);
        assert!(!escalation.arm(AnomalyKind::NarrowAirway));

        sleep(Duration::from_millis(5_100)).await;
        assert_eq!(escalation.state().phase, EscalationPhase::Idle);

        assert!(escalation.arm(AnomalyKind::NarrowAirway));
        wait_for_phase(&escalation, EscalationPhase::CountingDown).await;
        assert_eq!(escalation.state().remaining_seconds, 120);
        assert!(alert.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_location_uses_mock() {
        let (escalation, alert) = escalation_with(Arc::new(FailingLocator));

        escalation.arm(AnomalyKind::NarrowAirway);
        wait_for_phase(&escalation, EscalationPhase::CountingDown).await;
        assert_eq!(escalation.state().location, Some(MOCK_LOCATION));

        sleep(Duration::from_millis(120_500)).await;
        assert_eq!(alert.sent(), vec![(Caregiver::default().phone, MOCK_LOCATION)]);
    }

    #[tokio::test]
    async fn test_not_armed_without_sharing_or_critical_kind() {
        let (escalation, _alert) = escalation();

        assert!(!escalation.arm(AnomalyKind::FlowAnomaly));

        escalation.set_location_sharing_enabled(false);
        assert!(!escalation.arm(AnomalyKind::NarrowAirway));
        assert_eq!(escalation.state().phase, EscalationPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_countdown() {
        let (escalation, alert) = escalation();

        escalation.arm(AnomalyKind::NarrowAirway);
        wait_for_phase(&escalation, EscalationPhase::CountingDown).await;
        escalation.dispose();

        sleep(Duration::from_secs(300)).await;
        assert_eq!(escalation.state().phase, EscalationPhase::CountingDown);
        assert!(alert.sent().is_empty());
        assert!(!escalation.arm(AnomalyKind::NarrowAirway));
    }
}
