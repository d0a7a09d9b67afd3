use std::sync::Arc;
use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{future, StreamExt};
use log::{debug, info, warn};
use tokio::time::{sleep, timeout, Duration};
use uuid::Uuid;

use crate::device::constants::{IS_CONNECTED_DEADLINE, SCAN_POLL_DELAY, SELECTION_DEADLINE};
use crate::device::link::{DeviceFilter, DeviceLink, NotificationStream, PeripheralHost};
use crate::error::DeviceError;

fn is_permission_denied(err: &DeviceError) -> bool {
    matches!(err, DeviceError::LinkError { source: btleplug::Error::PermissionDenied })
}

async fn start_scanning(adapters: &[Adapter], service: Uuid) -> Result<(), DeviceError> {
    let filter = ScanFilter {
        services: vec![service],
    };

    for adapter in adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(filter.clone()).await?;
    }

    Ok(())
}

async fn stop_scanning(adapters: &[Adapter]) {
    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            warn!("Failed to stop scanning: {:?}", err);
        }
    }
}

async fn find_peripheral(adapters: &[Adapter], service: Uuid) -> Option<(Peripheral, Option<String>)> {
    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    debug!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    // Some environments ignore the filter, so make sure to check the service uuid again
                    if properties.services.contains(&service) {
                        info!(
                            "Using peripheral {} {:?} {} {:?}",
                            properties.address,
                            properties.address_type,
                            properties.local_name.clone().unwrap_or(String::from("NONE")),
                            properties.services,
                        );
                        return Some((peripheral, properties.local_name));
                    }
                }
            }
        }
    }

    None
}

/// Device selection through btleplug. There is no chooser dialog: the first advertising
/// peripheral that exposes the requested service is selected.
pub struct BtleHost {
    manager: Manager,
}

impl BtleHost {
    pub async fn new() -> Result<Self, DeviceError> {
        match Manager::new().await {
            Ok(manager) => Ok(BtleHost { manager }),
            Err(err) => {
                warn!("Bluetooth manager unavailable: {:?}", err);
                Err(DeviceError::PlatformUnsupported)
            },
        }
    }
}

#[async_trait]
impl PeripheralHost for BtleHost {
    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn DeviceLink>, DeviceError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(DeviceError::PlatformUnsupported);
        }

        if let Err(err) = start_scanning(&adapters, filter.service).await {
            warn!("Scanning failed {:?}", err);
            stop_scanning(&adapters).await;
            return Err(if is_permission_denied(&err) { DeviceError::DeviceRejected } else { err });
        }

        let search = async {
            loop {
                if let Some(found) = find_peripheral(&adapters, filter.service).await {
                    return found;
                }
                debug!("No peripherals matched");
                sleep(Duration::from_millis(SCAN_POLL_DELAY)).await;
            }
        };

        let found = timeout(Duration::from_millis(SELECTION_DEADLINE), search).await;
        stop_scanning(&adapters).await;

        match found {
            Ok((peripheral, name)) => Ok(Arc::new(BtleLink { peripheral, name })),
            Err(_) => {
                info!("No device was selected within {}ms", SELECTION_DEADLINE);
                Err(DeviceError::DeviceRejected)
            },
        }
    }
}

pub struct BtleLink {
    peripheral: Peripheral,
    name: Option<String>,
}

#[async_trait]
impl DeviceLink for BtleLink {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        info!("Connecting to peripheral...");
        self.peripheral.connect().await?;

        info!("Connected; Discovering services...");
        self.peripheral.discover_services().await?;
        Ok(())
    }

    async fn services(&self) -> Result<Vec<Uuid>, DeviceError> {
        Ok(self.peripheral.services().iter().map(|service| service.uuid).collect())
    }

    async fn subscribe(&self, service: Uuid, characteristic: Uuid) -> Result<Option<NotificationStream>, DeviceError> {
        let found = self.peripheral.services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics.into_iter())
            .find(|c| c.uuid == characteristic);

        let characteristic = match found {
            Some(characteristic) => characteristic,
            None => return Ok(None),
        };

        info!("Subscribing to characteristic {:?} {:?}", service, characteristic.uuid);
        // obtain the stream before subscribing so the first notification is not missed
        let notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&characteristic).await?;

        let uuid = characteristic.uuid;
        let stream = notifications.filter_map(move |notification| {
            future::ready(if notification.uuid == uuid { Some(notification.value) } else { None })
        });

        Ok(Some(Box::pin(stream)))
    }

    async fn is_connected(&self) -> Result<bool, DeviceError> {
        match timeout(Duration::from_millis(IS_CONNECTED_DEADLINE), self.peripheral.is_connected()).await {
            Err(_) => {
                // macOS
                warn!("Checking for connection status took too long");
                Ok(false)
            },
            Ok(result) => Ok(result?),
        }
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
