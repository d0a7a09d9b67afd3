use std::env;
use std::str::FromStr;
use std::time::Duration;
use crate::app::run_monitor;
use crate::cli::Args;
use crate::config::io::ConfigIO;
use crate::error::AppRunError;

pub mod app;
pub mod audio;
pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod control;
pub mod device;
pub mod error;
pub mod escalation;
pub mod inference;
pub mod monitor;
pub mod sim;
pub mod telemetry;

/**
 * How long (milliseconds) background tasks get to finish after the monitor stopped.
 */
const RUNTIME_SHUTDOWN_TIMEOUT: u64 = 1000;

fn log_level() -> log::LevelFilter {
    env::var("LUNGUA_LOG")
        .ok()
        .and_then(|level| log::LevelFilter::from_str(&level).ok())
        .unwrap_or(log::LevelFilter::Info)
}

pub fn init_logging() {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level())
        // btleplug is very chatty at debug
        .level_for("btleplug", log::LevelFilter::Warn)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync(args.config.clone())?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(run_monitor(args, config_io));
    // a pending stdin read would otherwise keep the runtime alive until the next line
    runtime.shutdown_timeout(Duration::from_millis(RUNTIME_SHUTDOWN_TIMEOUT));
    result
}
