use async_trait::async_trait;
use log::warn;

use crate::config::types::LocationConfig;
use crate::error::LocationError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/**
 * Used when the position can not be determined, so an escalation never stalls on the locator.
 */
pub const MOCK_LOCATION: Location = Location { latitude: 12.9716, longitude: 77.5946 };

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<Location, LocationError>;
}

/// A fixed, configured position. Without one every request is denied.
pub struct StaticLocator {
    position: Option<Location>,
}

impl StaticLocator {
    pub fn new(position: Option<Location>) -> Self {
        StaticLocator { position }
    }

    pub fn from_config(config: &LocationConfig) -> Self {
        let position = match (config.latitude, config.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location { latitude, longitude }),
            _ => None,
        };
        StaticLocator::new(position)
    }
}

#[async_trait]
impl Geolocator for StaticLocator {
    async fn current_position(&self) -> Result<Location, LocationError> {
        self.position.ok_or(LocationError::Denied)
    }
}

pub async fn locate_or_mock(locator: &dyn Geolocator) -> Location {
    match locator.current_position().await {
        Ok(location) => location,
        Err(err) => {
            warn!("Geolocation error, using mock location: {}", err);
            MOCK_LOCATION
        },
    }
}
