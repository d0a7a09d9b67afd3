use std::path::PathBuf;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceSelection {
    Both,
    Smartwatch,
    Inhaler,
}

impl DeviceSelection {
    pub fn smartwatch(&self) -> bool {
        matches!(self, DeviceSelection::Both | DeviceSelection::Smartwatch)
    }

    pub fn inhaler(&self) -> bool {
        matches!(self, DeviceSelection::Both | DeviceSelection::Inhaler)
    }
}

/// Respiratory monitoring with a heart rate smartwatch and a smart inhaler.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    /// Path of the config file, instead of the default location.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Generate readings instead of connecting to devices.
    #[arg(long)]
    pub simulate: bool,

    /// Switch the simulation to an attack after this many seconds.
    #[arg(long, value_name = "SECONDS", requires = "simulate")]
    pub attack_after: Option<u64>,

    /// Enable location sharing for this run, regardless of the config file.
    #[arg(long)]
    pub share_location: bool,

    /// Which peripherals to connect to.
    #[arg(long, value_enum, default_value_t = DeviceSelection::Both)]
    pub device: DeviceSelection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["lungua-monitor"]);

        assert_eq!(args.config, None);
        assert!(!args.simulate);
        assert_eq!(args.device, DeviceSelection::Both);
        assert!(args.device.smartwatch() && args.device.inhaler());
    }

    #[test]
    fn test_simulation_flags() {
        let args = Args::parse_from(["lungua-monitor", "--simulate", "--attack-after", "10", "--device", "inhaler"]);

        assert!(args.simulate);
        assert_eq!(args.attack_after, Some(10));
        assert!(!args.device.smartwatch());

        assert!(Args::try_parse_from(["lungua-monitor", "--attack-after", "10"]).is_err());
    }
}
