use clap::Parser;
use log::{error, info};
use lungua_monitor::cli::Args;
use lungua_monitor::error::{AppRunError, ConfigError};
use lungua_monitor::{init_logging, run};

fn main() -> Result<(), AppRunError> {
    init_logging();
    info!(concat!("Lungua Monitor ", env!("CARGO_PKG_VERSION")));

    let args = Args::parse();

    match run(args) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("This application has already been started");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
