use std::f64::consts::PI;
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::types::DeviceStatus;
use crate::error::SimError;
use crate::sim::types::{SimCommand, SimCondition};
use crate::telemetry::Reading;

/**
 * How often (milliseconds) a simulated reading is produced (20Hz).
 */
pub const SIMULATION_INTERVAL: u64 = 50;

/**
 * Respiration rate (Hz) modulating both channels.
 */
const RESPIRATION_FREQUENCY: f64 = 0.25;

/// Breathing-modulated heart rate / airflow readings with noise.
pub struct ReadingGenerator {
    time: f64,
    condition: SimCondition,
    rng: StdRng,
}

impl ReadingGenerator {
    pub fn new() -> Self {
        ReadingGenerator::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        ReadingGenerator::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        ReadingGenerator {
            time: 0.0,
            condition: SimCondition::Normal,
            rng,
        }
    }

    pub fn condition(&self) -> SimCondition {
        self.condition
    }

    pub fn set_condition(&mut self, condition: SimCondition) {
        self.condition = condition;
    }

    // uniform noise in [-amplitude, amplitude)
    fn noise(&mut self, amplitude: f64) -> f64 {
        (self.rng.gen::<f64>() - 0.5) * 2.0 * amplitude
    }

    pub fn next_reading(&mut self) -> Reading {
        self.time += SIMULATION_INTERVAL as f64 / 1000.0;
        let respiration = (self.time * 2.0 * PI * RESPIRATION_FREQUENCY).sin();

        let (heart_rate_base, sinus_arrhythmia, airflow_base, airflow_variability) = match self.condition {
            SimCondition::Normal => (75.0, 5.0, 20.0, 15.0),
            SimCondition::Attack => (135.0, 2.0, 8.0, 2.0),
        };

        let airflow = airflow_base + respiration * airflow_variability + self.noise(1.0);
        let heart_rate = heart_rate_base + respiration * sinus_arrhythmia + self.noise(1.5);

        Reading {
            heart_rate,
            airflow: airflow.max(0.0),
        }
    }
}

impl Default for ReadingGenerator {
    fn default() -> Self {
        ReadingGenerator::new()
    }
}

pub fn telemetry_sim(cancel: CancellationToken, mut generator: ReadingGenerator) -> (Receiver<Reading>, Sender<SimCommand>, JoinHandle<()>) {
    let (mut reading_sender, reading_receiver) = channel::<Reading>(128);
    let (command_sender, mut command_receiver) = channel::<SimCommand>(8);

    let handle = spawn(async move {
        let mut ticker = interval(Duration::from_millis(SIMULATION_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                _ = ticker.tick() => {
                    if reading_sender.send(generator.next_reading()).await.is_err() {
                        // nobody is listening anymore
                        break 'mainloop;
                    }
                },
                Some(command) = command_receiver.next() => {
                    let condition = match command {
                        SimCommand::SetCondition(condition) => condition,
                        SimCommand::ToggleCondition => generator.condition().toggled(),
                    };
                    info!("Simulating {} condition", condition);
                    generator.set_condition(condition);
                },
            }
        }
    });

    (reading_receiver, command_sender, handle)
}

struct RunningSim {
    cancel: CancellationToken,
    commands: Sender<SimCommand>,
    handle: JoinHandle<()>,
}

/// The demo mode. Only runs while no real device is connected.
#[derive(Default)]
pub struct Simulator {
    running: Option<RunningSim>,
}

impl Simulator {
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn start(&mut self, device_statuses: &[DeviceStatus], cancel: CancellationToken, generator: ReadingGenerator) -> Result<Receiver<Reading>, SimError> {
        if self.running.is_some() {
            return Err(SimError::AlreadyRunning);
        }
        if device_statuses.contains(&DeviceStatus::Connected) {
            return Err(SimError::DeviceConnected);
        }

        info!("Starting simulation");
        let (readings, commands, handle) = telemetry_sim(cancel.clone(), generator);
        self.running = Some(RunningSim { cancel, commands, handle });
        Ok(readings)
    }

    pub fn commands(&self) -> Option<Sender<SimCommand>> {
        self.running.as_ref().map(|running| running.commands.clone())
    }

    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if let Err(err) = running.handle.await {
                warn!("Simulation task failed: {:?}", err);
            }
            info!("Simulation stopped");
        }
    }
}
