use std::future::pending;
use std::sync::Arc;
use std::time::SystemTime;
use futures::channel::mpsc::Receiver;
use futures::stream::{select_all, BoxStream};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::spawn;
use tokio::time::{interval, sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::cli::Args;
use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::context::AppContext;
use crate::control::OperatorCommand;
use crate::device::btle::BtleHost;
use crate::device::connection::PeripheralSession;
use crate::device::link::{PeripheralHost, SerialSelection};
use crate::device::types::{DeviceEvent, DeviceProfile, DeviceStatus};
use crate::error::{AppRunError, DeviceError};
use crate::monitor::Monitor;
use crate::sim::telemetry_sim::{ReadingGenerator, Simulator};
use crate::sim::types::{SimCommand, SimCondition};
use crate::telemetry::Reading;

/**
 * How often (milliseconds) a session that went back to disconnected is checked before reconnecting.
 */
const RECONNECT_POLL_DELAY: u64 = 1000;

/**
 * How often (milliseconds) the current vitals are written to the log.
 */
const STATUS_REPORT_DELAY: u64 = 5000;

async fn save_defaults(config_io: &ConfigIO) -> Config {
    let config = Config::default();
    // so the defaults can be edited
    if let Err(err) = config_io.save(&config).await {
        warn!("Failed to save config: {}", err);
    }
    config
}

/// A config file that fails to parse is left untouched, so no caregiver details are lost.
async fn load_config(config_io: &ConfigIO) -> Config {
    let blank = match config_io.is_blank().await {
        Ok(blank) => blank,
        Err(err) => {
            warn!("Failed to inspect config file: {:?}", err);
            false
        },
    };

    match config_io.read().await {
        Ok(config) => {
            if blank {
                // this is probably the first start
                info!("Config file is empty, writing defaults");
                return save_defaults(config_io).await;
            }
            config
        },
        Err(err) => {
            if err.is_file_not_found_error() {
                info!("Config file not found, using defaults");
                return save_defaults(config_io).await;
            }

            error!("Failed to load config, using defaults until it is fixed: {}", &err);
            Config::default()
        },
    }
}

/// Connects again whenever the session falls back to disconnected, until `cancel`.
async fn keep_connected(session: Arc<PeripheralSession>, cancel: CancellationToken) {
    let name = session.profile().name;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = session.connect() => result,
        };

        match result {
            Ok(()) => info!("{}: connected to {}", name, session.label().unwrap_or_default()),
            Err(DeviceError::PlatformUnsupported) | Err(DeviceError::Disposed) => {
                info!("{}: giving up", name);
                return;
            },
            Err(err) => debug!("{}: will retry after: {}", name, err),
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(Duration::from_millis(RECONNECT_POLL_DELAY)) => {},
            }

            if session.status() == DeviceStatus::Disconnected {
                break;
            }
        }
    }
}

async fn next_or_pending(readings: &mut Option<Receiver<Reading>>) -> Option<Reading> {
    match readings {
        Some(readings) => readings.next().await,
        None => pending().await,
    }
}

fn report_status(monitor: &Monitor, context: &AppContext, sessions: &[Arc<PeripheralSession>]) {
    let reading = monitor.latest_reading();
    let inference = monitor.last_inference();
    let devices: Vec<String> = sessions
        .iter()
        .map(|session| format!("{} {}", session.profile().name, session.status()))
        .collect();

    info!(
        "HR: {:.0} bpm, Flow: {:.1} L/min, Deviation: {:.0}%, {:?}, Escalation: {}, Devices: [{}]",
        reading.heart_rate,
        reading.airflow,
        inference.confidence_score,
        inference.status,
        context.escalation.state().phase,
        devices.join(", "),
    );
}

async fn open_sessions(args: &Args) -> Vec<Arc<PeripheralSession>> {
    let mut profiles: Vec<DeviceProfile> = Vec::new();
    if args.device.smartwatch() {
        profiles.push(DeviceProfile::smartwatch());
    }
    if args.device.inhaler() {
        profiles.push(DeviceProfile::inhaler());
    }

    // both sessions scan on the same adapters
    let host: Option<Arc<dyn PeripheralHost>> = match BtleHost::new().await {
        Ok(host) => Some(Arc::new(SerialSelection::new(Arc::new(host)))),
        Err(err) => {
            warn!("{}, use --simulate to run without devices", err);
            None
        },
    };

    profiles
        .into_iter()
        .map(|profile| Arc::new(PeripheralSession::new(profile, host.clone())))
        .collect()
}

fn handle_command(command: OperatorCommand, monitor: &mut Monitor, context: &AppContext, simulator: &Simulator, sessions: &[Arc<PeripheralSession>]) {
    match command {
        OperatorCommand::Cancel => {
            if !context.escalation.cancel() {
                info!("No escalation countdown to cancel ({})", context.escalation.state().phase);
            }
        },
        OperatorCommand::Toggle => match simulator.commands() {
            Some(mut commands) => {
                if let Err(err) = commands.try_send(SimCommand::ToggleCondition) {
                    warn!("Failed to send command to the simulation: {:?}", err);
                }
            },
            None => warn!("The simulation is not running, start with --simulate"),
        },
        OperatorCommand::Share(enabled) => {
            context.escalation.set_location_sharing_enabled(enabled);
            info!("Location sharing {}", if enabled { "enabled" } else { "disabled" });
        },
        OperatorCommand::Reset => {
            monitor.reset();
            info!("Telemetry and anomaly log cleared");
        },
        OperatorCommand::Status => report_status(monitor, context, sessions),
    }
}

pub async fn run_monitor(args: Args, config_io: ConfigIO) -> Result<(), AppRunError> {
    let mut config = load_config(&config_io).await;
    if args.share_location {
        config.escalation.location_sharing_enabled = true;
    }

    let context = AppContext::from_config(config);
    let mut monitor = context.monitor();
    if !context.escalation.location_sharing_enabled() {
        info!("Location sharing is disabled, anomalies will not alert the caregiver");
    }

    let app_cancel = CancellationToken::new();
    {
        let app_cancel = app_cancel.clone();
        spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", err);
                return;
            }
            info!("Shutting down");
            app_cancel.cancel();
        });
    }

    let sessions = if args.simulate { Vec::new() } else { open_sessions(&args).await };
    let mut device_events = select_all(sessions.iter().map(|session| {
        let name = session.profile().name;
        session.subscribe().map(move |event| (name, event)).boxed()
    }).collect::<Vec<BoxStream<'static, (&'static str, DeviceEvent)>>>());

    for session in &sessions {
        spawn(keep_connected(session.clone(), app_cancel.child_token()));
    }

    let mut simulator = Simulator::default();
    let mut readings = None;
    if args.simulate {
        let statuses: Vec<DeviceStatus> = sessions.iter().map(|session| session.status()).collect();
        readings = Some(simulator.start(&statuses, app_cancel.child_token(), ReadingGenerator::new())?);

        if let (Some(attack_after), Some(mut commands)) = (args.attack_after, simulator.commands()) {
            let cancel = app_cancel.child_token();
            spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {},
                    _ = sleep(Duration::from_secs(attack_after)) => {
                        if let Err(err) = commands.send(SimCommand::SetCondition(SimCondition::Attack)).await {
                            warn!("Failed to switch the simulation to an attack: {:?}", err);
                        }
                    },
                }
            });
        }
    }

    let mut escalation_states = context.escalation.watch();
    let mut status_report = interval(Duration::from_millis(STATUS_REPORT_DELAY));
    let mut operator_lines = BufReader::new(stdin()).lines();
    let mut operator_open = true;
    info!("Commands: cancel, toggle, share on|off, reset, status");

    'mainloop: loop {
        tokio::select! {
            _ = app_cancel.cancelled() => {
                break 'mainloop;
            },
            Some((name, event)) = device_events.next() => {
                match event {
                    DeviceEvent::StatusChange(status) => info!("{}: {}", name, status),
                    DeviceEvent::Sample(sample) => {
                        monitor.ingest(sample);
                    },
                }
            },
            reading = next_or_pending(&mut readings) => {
                match reading {
                    Some(reading) => {
                        monitor.ingest_reading(reading, SystemTime::now());
                    },
                    None => {
                        warn!("Simulation ended");
                        readings = None;
                    },
                }
            },
            Ok(()) = escalation_states.changed() => {
                let state = *escalation_states.borrow_and_update();
                monitor.on_escalation_update(&state);
            },
            _ = status_report.tick() => {
                report_status(&monitor, &context, &sessions);
            },
            line = operator_lines.next_line(), if operator_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {},
                    Ok(Some(line)) => match line.parse::<OperatorCommand>() {
                        Ok(command) => handle_command(command, &mut monitor, &context, &simulator, &sessions),
                        Err(err) => warn!("{}", err),
                    },
                    Ok(None) => {
                        debug!("stdin closed, no more commands");
                        operator_open = false;
                    },
                    Err(err) => {
                        warn!("Failed to read command: {:?}", err);
                        operator_open = false;
                    },
                }
            },
        }
    }

    app_cancel.cancel();
    for session in &sessions {
        session.dispose().await;
    }
    simulator.stop().await;
    context.dispose();

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::audio::testing::recording_output;
    use crate::backend::LogEventSink;
    use crate::device::testing::{MockHost, MockLink};
    use crate::escalation::alert::LogGateway;
    use crate::escalation::location::StaticLocator;
    use crate::escalation::EscalationPhase;
    use crate::telemetry::{Sample, SensorChannel};

    fn temp_config_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("lungua-monitor-app-test-{}-{}", std::process::id(), name))
            .join("lungua-monitor.json")
    }

    fn write_config(name: &str, content: &str) -> PathBuf {
        let path = temp_config_path(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_malformed_config_is_not_overwritten() {
        let content = r#"{ "thresholds": { "highHeartRate": 120, }, "caregiver": { "phone": "+31 6 1234" } }"#;
        let path = write_config("malformed", content);
        let config_io = ConfigIO::new_sync(Some(path.clone())).unwrap();

        assert_eq!(load_config(&config_io).await, Config::default());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_blank_config_gets_defaults_written() {
        let path = write_config("blank", "");
        let config_io = ConfigIO::new_sync(Some(path.clone())).unwrap();

        assert_eq!(load_config(&config_io).await, Config::default());
        let written: Config = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, Config::default());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_valid_config_is_loaded_as_is() {
        let content = r#"{ "caregiver": { "phone": "+31 6 1234" } }"#;
        let path = write_config("valid", content);
        let config_io = ConfigIO::new_sync(Some(path.clone())).unwrap();

        let config = load_config(&config_io).await;
        assert_eq!(config.caregiver.phone, "+31 6 1234");
        assert_eq!(config.thresholds, Config::default().thresholds);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_connected_reconnects_after_link_loss() {
        let (link, _payloads) = MockLink::new(&DeviceProfile::smartwatch());
        let session = Arc::new(PeripheralSession::new(
            DeviceProfile::smartwatch(),
            Some(Arc::new(MockHost::with_device(link.clone()))),
        ));
        let cancel = CancellationToken::new();
        let task = spawn(keep_connected(session.clone(), cancel.clone()));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(session.status(), DeviceStatus::Connected);
        assert_eq!(link.connect_calls(), 1);

        link.drop_link();
        sleep(Duration::from_millis(3 * RECONNECT_POLL_DELAY)).await;
        assert_eq!(session.status(), DeviceStatus::Connected);
        assert_eq!(link.connect_calls(), 2);

        cancel.cancel();
        task.await.unwrap();
        session.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_connected_retries_after_rejection() {
        let (link, _payloads) = MockLink::new(&DeviceProfile::inhaler());
        let host = Arc::new(MockHost::rejecting());
        let session = Arc::new(PeripheralSession::new(DeviceProfile::inhaler(), Some(host.clone())));
        let cancel = CancellationToken::new();
        let task = spawn(keep_connected(session.clone(), cancel.clone()));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(session.status(), DeviceStatus::Error);

        host.select(link.clone());
        // error reset, then the next poll reconnects
        sleep(Duration::from_secs(5)).await;
        assert_eq!(session.status(), DeviceStatus::Connected);
        assert_eq!(link.connect_calls(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_connected_gives_up_without_platform_support() {
        let session = Arc::new(PeripheralSession::new(DeviceProfile::inhaler(), None));

        keep_connected(session.clone(), CancellationToken::new()).await;
        assert_eq!(session.status(), DeviceStatus::Error);
    }

    #[tokio::test]
    async fn test_commands_reach_escalation_and_monitor() {
        let (audio, _tones) = recording_output();
        let context = AppContext::new(
            Config::default(),
            Arc::new(StaticLocator::new(None)),
            Arc::new(LogGateway),
            Arc::new(LogEventSink),
            audio,
        );
        let mut monitor = context.monitor();
        let simulator = Simulator::default();

        handle_command(OperatorCommand::Share(true), &mut monitor, &context, &simulator, &[]);
        assert!(context.escalation.location_sharing_enabled());

        monitor.ingest(Sample::now(SensorChannel::HeartRate, 140.0));
        assert_eq!(monitor.tracker().history_len(), 1);
        handle_command(OperatorCommand::Reset, &mut monitor, &context, &simulator, &[]);
        assert_eq!(monitor.tracker().history_len(), 0);

        // no countdown yet and no simulation, both only log
        handle_command(OperatorCommand::Cancel, &mut monitor, &context, &simulator, &[]);
        handle_command(OperatorCommand::Toggle, &mut monitor, &context, &simulator, &[]);

        handle_command(OperatorCommand::Share(false), &mut monitor, &context, &simulator, &[]);
        assert!(!context.escalation.location_sharing_enabled());
        context.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_command_stops_countdown() {
        let (audio, _tones) = recording_output();
        let mut config = Config::default();
        config.escalation.location_sharing_enabled = true;
        let context = AppContext::new(
            config,
            Arc::new(StaticLocator::new(None)),
            Arc::new(LogGateway),
            Arc::new(LogEventSink),
            audio,
        );
        let mut monitor = context.monitor();
        let simulator = Simulator::default();

        monitor.ingest_reading(Reading { heart_rate: 135.0, airflow: 8.0 }, SystemTime::now());
        let mut states = context.escalation.watch();
        states.wait_for(|state| state.phase == EscalationPhase::CountingDown).await.unwrap();

        handle_command(OperatorCommand::Cancel, &mut monitor, &context, &simulator, &[]);
        assert_eq!(context.escalation.state().phase, EscalationPhase::Cancelled);
        context.dispose();
    }
}
