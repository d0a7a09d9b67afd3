use uuid::Uuid;

use crate::device::constants::{HEART_RATE_MEASUREMENT_CHARACTERISTIC, HEART_RATE_SERVICE, INHALER_AIRFLOW_CHARACTERISTIC, INHALER_SERVICE};
use crate::device::decode::{decode_airflow, decode_heart_rate};
use crate::error::DecodeError;
use crate::telemetry::{Sample, SensorChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            DeviceStatus::Disconnected => "Disconnected",
            DeviceStatus::Connecting => "Connecting",
            DeviceStatus::Connected => "Connected",
            DeviceStatus::Error => "Error",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    StatusChange(DeviceStatus),
    Sample(Sample),
}

pub type PayloadParser = fn(&[u8]) -> Result<f64, DecodeError>;

/// Which peripheral to look for and how to read it.
#[derive(Clone, Copy)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub channel: SensorChannel,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub parser: PayloadParser,
}

impl std::fmt::Debug for DeviceProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceProfile")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("service", &self.service)
            .field("characteristic", &self.characteristic)
            .finish_non_exhaustive()
    }
}

impl DeviceProfile {
    pub fn smartwatch() -> Self {
        DeviceProfile {
            name: "Smartwatch",
            channel: SensorChannel::HeartRate,
            service: HEART_RATE_SERVICE,
            characteristic: HEART_RATE_MEASUREMENT_CHARACTERISTIC,
            parser: decode_heart_rate,
        }
    }

    pub fn inhaler() -> Self {
        DeviceProfile {
            name: "Smart Inhaler",
            channel: SensorChannel::Airflow,
            service: INHALER_SERVICE,
            characteristic: INHALER_AIRFLOW_CHARACTERISTIC,
            parser: decode_airflow,
        }
    }
}
