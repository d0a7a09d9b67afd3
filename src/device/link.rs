use std::pin::Pin;
use std::sync::Arc;
use async_trait::async_trait;
use futures::Stream;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::DeviceError;

/// Raw characteristic values in the order the transport delivered them.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub service: Uuid,
}

/// The host's wireless stack: lets the user pick a peripheral.
#[async_trait]
pub trait PeripheralHost: Send + Sync {
    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn DeviceLink>, DeviceError>;
}

/// A selected peripheral.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    fn name(&self) -> Option<String>;

    async fn connect(&self) -> Result<(), DeviceError>;

    async fn services(&self) -> Result<Vec<Uuid>, DeviceError>;

    /// Returns `None` when `service` does not expose `characteristic`.
    async fn subscribe(&self, service: Uuid, characteristic: Uuid) -> Result<Option<NotificationStream>, DeviceError>;

    async fn is_connected(&self) -> Result<bool, DeviceError>;

    async fn disconnect(&self) -> Result<(), DeviceError>;
}

/// Lets one device selection run at a time. Sessions sharing an adapter would otherwise
/// replace each other's scan filter and stop each other's scan.
pub struct SerialSelection {
    host: Arc<dyn PeripheralHost>,
    selecting: Mutex<()>,
}

impl SerialSelection {
    pub fn new(host: Arc<dyn PeripheralHost>) -> Self {
        SerialSelection {
            host,
            selecting: Mutex::new(()),
        }
    }
}

#[async_trait]
impl PeripheralHost for SerialSelection {
    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn DeviceLink>, DeviceError> {
        let _selecting = self.selecting.lock().await;
        self.host.request_device(filter).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Duration, Instant};

    use super::*;

    #[derive(Default)]
    struct ScanningHost {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl PeripheralHost for ScanningHost {
        async fn request_device(&self, _filter: &DeviceFilter) -> Result<Arc<dyn DeviceLink>, DeviceError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            sleep(Duration::from_millis(100)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Err(DeviceError::DeviceRejected)
        }
    }

    const SMARTWATCH: DeviceFilter = DeviceFilter { service: Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb) };
    const INHALER: DeviceFilter = DeviceFilter { service: Uuid::from_u128(0x19b10000_e8f2_537e_4f6c_d104768a1214) };

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_selections_run_one_at_a_time() {
        let scanning = Arc::new(ScanningHost::default());
        let host = SerialSelection::new(scanning.clone());
        let started = Instant::now();

        let (smartwatch, inhaler) = tokio::join!(host.request_device(&SMARTWATCH), host.request_device(&INHALER));

        assert!(matches!(smartwatch, Err(DeviceError::DeviceRejected)));
        assert!(matches!(inhaler, Err(DeviceError::DeviceRejected)));
        assert_eq!(scanning.max_active.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unserialized_selections_overlap() {
        let scanning = ScanningHost::default();

        let _ = tokio::join!(scanning.request_device(&SMARTWATCH), scanning.request_device(&INHALER));
        assert_eq!(scanning.max_active.load(Ordering::SeqCst), 2);
    }
}
