use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::device::link::{DeviceFilter, DeviceLink, NotificationStream, PeripheralHost};
use crate::device::types::DeviceProfile;
use crate::error::DeviceError;

const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// In-memory peripheral; payloads sent on the returned sender arrive as notifications.
pub struct MockLink {
    name: Option<String>,
    services: Vec<Uuid>,
    characteristic: Option<(Uuid, Uuid)>,
    notifications: Mutex<Option<UnboundedReceiver<Vec<u8>>>>,
    fail_connect: bool,
    connected: AtomicBool,
    liveness_error: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
}

impl MockLink {
    fn build(profile: &DeviceProfile, characteristic: bool, fail_connect: bool) -> (Arc<MockLink>, UnboundedSender<Vec<u8>>) {
        let (sender, receiver) = unbounded::<Vec<u8>>();
        let link = MockLink {
            name: Some(format!("Mock {}", profile.name)),
            services: vec![BATTERY_SERVICE, profile.service],
            characteristic: if characteristic { Some((profile.service, profile.characteristic)) } else { None },
            notifications: Mutex::new(Some(receiver)),
            fail_connect,
            connected: AtomicBool::new(false),
            liveness_error: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
        };
        (Arc::new(link), sender)
    }

    pub fn new(profile: &DeviceProfile) -> (Arc<MockLink>, UnboundedSender<Vec<u8>>) {
        MockLink::build(profile, true, false)
    }

    pub fn failing(profile: &DeviceProfile) -> Arc<MockLink> {
        MockLink::build(profile, true, true).0
    }

    pub fn without_characteristic(profile: &DeviceProfile) -> Arc<MockLink> {
        MockLink::build(profile, false, false).0
    }

    /// The peripheral goes out of range; only the liveness check notices.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// The liveness check itself fails from now on.
    pub fn fail_liveness(&self) {
        self.liveness_error.store(true, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceLink for MockLink {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(DeviceError::Transport(String::from("link dropped during setup")));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn services(&self) -> Result<Vec<Uuid>, DeviceError> {
        Ok(self.services.clone())
    }

    async fn subscribe(&self, service: Uuid, characteristic: Uuid) -> Result<Option<NotificationStream>, DeviceError> {
        if self.characteristic != Some((service, characteristic)) {
            return Ok(None);
        }

        let receiver = self.notifications.lock().unwrap().take();
        Ok(receiver.map(|receiver| Box::pin(receiver) as NotificationStream))
    }

    async fn is_connected(&self) -> Result<bool, DeviceError> {
        if self.liveness_error.load(Ordering::SeqCst) {
            return Err(DeviceError::Transport(String::from("adapter went away")));
        }
        Ok(self.connected.load(Ordering::SeqCst))
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

enum Selection {
    Device(Arc<MockLink>),
    Reject,
    Pending,
}

pub struct MockHost {
    selection: Mutex<Selection>,
}

impl MockHost {
    pub fn with_device(link: Arc<MockLink>) -> Self {
        MockHost { selection: Mutex::new(Selection::Device(link)) }
    }

    pub fn rejecting() -> Self {
        MockHost { selection: Mutex::new(Selection::Reject) }
    }

    /// Device selection never completes.
    pub fn pending() -> Self {
        MockHost { selection: Mutex::new(Selection::Pending) }
    }

    pub fn select(&self, link: Arc<MockLink>) {
        *self.selection.lock().unwrap() = Selection::Device(link);
    }
}

#[async_trait]
impl PeripheralHost for MockHost {
    async fn request_device(&self, _filter: &DeviceFilter) -> Result<Arc<dyn DeviceLink>, DeviceError> {
        let selected = match &*self.selection.lock().unwrap() {
            Selection::Device(link) => Some(Ok(link.clone() as Arc<dyn DeviceLink>)),
            Selection::Reject => Some(Err(DeviceError::DeviceRejected)),
            Selection::Pending => None,
        };

        match selected {
            Some(result) => result,
            None => futures::future::pending().await,
        }
    }
}
