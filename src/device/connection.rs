use std::sync::{Arc, Mutex, MutexGuard};
use futures::StreamExt;
use futures::channel::mpsc::{channel, Receiver, Sender};
use indexmap::IndexSet;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{ERROR_RESET_DELAY, EVENT_CHANNEL_SIZE, LINK_CHECK_DELAY};
use crate::device::link::{DeviceFilter, DeviceLink, NotificationStream, PeripheralHost};
use crate::device::types::{DeviceEvent, DeviceProfile, DeviceStatus};
use crate::error::DeviceError;
use crate::telemetry::Sample;

struct SessionInner {
    status: DeviceStatus,
    label: Option<String>,
    services: IndexSet<Uuid>,
    link: Option<Arc<dyn DeviceLink>>,
    // bumped by every connect, disconnect and dispose; tasks of an older attempt stay silent
    attempt: u64,
    connection_cancel: CancellationToken,
    notifications_task: Option<JoinHandle<()>>,
    subscribers: Vec<Sender<DeviceEvent>>,
}

impl SessionInner {
    fn broadcast(&mut self, event: DeviceEvent) {
        self.subscribers.retain_mut(|subscriber| match subscriber.try_send(event.clone()) {
            Ok(()) => true,
            Err(err) if err.is_disconnected() => false,
            Err(_) => {
                warn!("Subscriber is not keeping up, dropping {:?}", event);
                true
            },
        });
    }

    fn set_status(&mut self, status: DeviceStatus) {
        if self.status != status {
            self.status = status;
            self.broadcast(DeviceEvent::StatusChange(status));
        }
    }

    // Stops the notification task of the current connection and returns the link so the
    // caller can release it outside of the lock.
    fn take_connection(&mut self) -> Option<Arc<dyn DeviceLink>> {
        self.connection_cancel.cancel();
        self.connection_cancel = CancellationToken::new();
        // the task may be the caller, so it is detached rather than aborted
        self.notifications_task.take();
        self.label = None;
        self.services.clear();
        self.link.take()
    }

    fn handle_disconnected(&mut self) -> Option<Arc<dyn DeviceLink>> {
        let link = self.take_connection();
        self.set_status(DeviceStatus::Disconnected);
        link
    }
}

async fn release_link(link: Arc<dyn DeviceLink>) {
    if let Err(err) = link.disconnect().await {
        debug!("Releasing link failed: {:?}", err);
    }
}

/// Connection lifecycle of one peripheral. Decoded samples and status changes are pushed to
/// every receiver returned by [`PeripheralSession::subscribe`].
pub struct PeripheralSession {
    profile: DeviceProfile,
    host: Option<Arc<dyn PeripheralHost>>,
    inner: Arc<Mutex<SessionInner>>,
    cancel: CancellationToken,
}

impl PeripheralSession {
    /// `host` is `None` when the platform has no usable wireless stack.
    pub fn new(profile: DeviceProfile, host: Option<Arc<dyn PeripheralHost>>) -> Self {
        let inner = SessionInner {
            status: DeviceStatus::Disconnected,
            label: None,
            services: IndexSet::new(),
            link: None,
            attempt: 0,
            connection_cancel: CancellationToken::new(),
            notifications_task: None,
            subscribers: Vec::new(),
        };

        PeripheralSession {
            profile,
            host,
            inner: Arc::new(Mutex::new(inner)),
            cancel: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("Failed to lock PeripheralSession inner")
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn status(&self) -> DeviceStatus {
        self.lock().status
    }

    pub fn label(&self) -> Option<String> {
        self.lock().label.clone()
    }

    pub fn services(&self) -> Vec<Uuid> {
        self.lock().services.iter().copied().collect()
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<DeviceEvent> {
        let (sender, receiver) = channel::<DeviceEvent>(EVENT_CHANNEL_SIZE);
        if !self.is_disposed() {
            self.lock().subscribers.push(sender);
        }
        receiver
    }

    pub async fn connect(&self) -> Result<(), DeviceError> {
        let attempt = {
            let mut inner = self.lock();
            if self.cancel.is_cancelled() {
                return Err(DeviceError::Disposed);
            }
            if matches!(inner.status, DeviceStatus::Connecting | DeviceStatus::Connected) {
                return Err(DeviceError::Busy);
            }

            inner.attempt += 1;
            inner.set_status(DeviceStatus::Connecting);
            inner.attempt
        };

        info!("{}: connecting", self.profile.name);
        match self.establish(attempt).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("{}: connecting failed: {}", self.profile.name, err);
                self.fail(attempt, &err).await;
                Err(err)
            },
        }
    }

    async fn establish(&self, attempt: u64) -> Result<(), DeviceError> {
        let host = self.host.as_ref().ok_or(DeviceError::PlatformUnsupported)?;
        let filter = DeviceFilter { service: self.profile.service };

        let link = host.request_device(&filter).await?;
        let current = self.with_current(attempt, |inner| inner.link = Some(link.clone()));
        self.ensure_current(current, &link).await?;

        link.connect().await?;
        let current = self.with_current(attempt, |inner| {
            inner.label = Some(link.name().unwrap_or(String::from("Unknown Device")));
            inner.set_status(DeviceStatus::Connected);
        });
        self.ensure_current(current, &link).await?;

        let services = link.services().await?;
        info!("{}: discovered services {:?}", self.profile.name, services);
        let current = self.with_current(attempt, |inner| inner.services = services.iter().copied().collect());
        self.ensure_current(current, &link).await?;

        let mut subscribed = false;
        for service in services.iter().filter(|service| **service == self.profile.service) {
            if let Some(stream) = link.subscribe(*service, self.profile.characteristic).await? {
                let current = self.with_current(attempt, |inner| {
                    let task = self.spawn_notifications(attempt, inner.connection_cancel.clone(), link.clone(), stream);
                    inner.notifications_task = Some(task);
                });
                self.ensure_current(current, &link).await?;
                subscribed = true;
                break;
            }
        }

        if !subscribed {
            warn!("{}: no matching characteristic {}, no samples will be delivered", self.profile.name, self.profile.characteristic);
        }

        Ok(())
    }

    // Applies `update` only while `attempt` is still the latest attempt.
    fn with_current<F: FnOnce(&mut SessionInner)>(&self, attempt: u64, update: F) -> bool {
        let mut inner = self.lock();
        if inner.attempt != attempt {
            return false;
        }
        update(&mut inner);
        true
    }

    async fn ensure_current(&self, current: bool, link: &Arc<dyn DeviceLink>) -> Result<(), DeviceError> {
        if current {
            return Ok(());
        }
        release_link(link.clone()).await;
        Err(DeviceError::Aborted)
    }

    async fn fail(&self, attempt: u64, err: &DeviceError) {
        let link = {
            let mut inner = self.lock();
            if inner.attempt != attempt {
                // superseded by disconnect or dispose, which already reset the session
                return;
            }
            let link = inner.take_connection();
            inner.set_status(DeviceStatus::Error);
            link
        };

        if let Some(link) = link {
            release_link(link).await;
        }

        if !err.is_transient() {
            return;
        }

        let inner = self.inner.clone();
        let cancel = self.cancel.clone();
        spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {},
                _ = sleep(Duration::from_millis(ERROR_RESET_DELAY)) => {
                    let mut inner = inner.lock().expect("Failed to lock PeripheralSession inner");
                    if inner.attempt == attempt && inner.status == DeviceStatus::Error {
                        inner.set_status(DeviceStatus::Disconnected);
                    }
                },
            }
        });
    }

    fn spawn_notifications(&self, attempt: u64, cancel: CancellationToken, link: Arc<dyn DeviceLink>, mut stream: NotificationStream) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let profile = self.profile;

        spawn(async move {
            let check_delay = Duration::from_millis(LINK_CHECK_DELAY);
            let mut link_check = interval_at(Instant::now() + check_delay, check_delay);
            let mut link_lost = false;

            'mainloop: loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        break 'mainloop;
                    },
                    payload = stream.next() => match payload {
                        None => {
                            warn!("{}: notification stream ended", profile.name);
                            link_lost = true;
                            break 'mainloop;
                        },
                        Some(payload) => match (profile.parser)(&payload) {
                            Err(err) => warn!("{}: failed to decode payload {:?}: {}", profile.name, payload, err),
                            Ok(value) => {
                                let mut inner = inner.lock().expect("Failed to lock PeripheralSession inner");
                                if inner.attempt != attempt || cancel.is_cancelled() {
                                    break 'mainloop;
                                }
                                inner.broadcast(DeviceEvent::Sample(Sample::now(profile.channel, value)));
                            },
                        },
                    },
                    _ = link_check.tick() => match link.is_connected().await {
                        Ok(true) => {},
                        Ok(false) => {
                            warn!("{}: connection lost", profile.name);
                            link_lost = true;
                            break 'mainloop;
                        },
                        Err(err) => {
                            warn!("{}: error checking for connection state: {:?}", profile.name, err);
                            link_lost = true;
                            break 'mainloop;
                        },
                    },
                }
            }

            if link_lost {
                let mut inner = inner.lock().expect("Failed to lock PeripheralSession inner");
                if inner.attempt == attempt {
                    // the link is gone already, dropping the handle releases it
                    inner.handle_disconnected();
                }
            }
        })
    }

    /// Idempotent; also aborts a connection attempt in progress.
    pub async fn disconnect(&self) -> Result<(), DeviceError> {
        let link = {
            let mut inner = self.lock();
            inner.attempt += 1;
            inner.handle_disconnected()
        };

        if let Some(link) = link {
            info!("{}: disconnecting", self.profile.name);
            release_link(link).await;
        }

        Ok(())
    }

    /// No events are delivered after this returns.
    pub async fn dispose(&self) {
        self.cancel.cancel();

        let link = {
            let mut inner = self.lock();
            inner.attempt += 1;
            inner.subscribers.clear();
            inner.handle_disconnected()
        };

        if let Some(link) = link {
            release_link(link).await;
        }
    }
}

impl Drop for PeripheralSession {
    fn drop(&mut self) {
        self.cancel.cancel();

        let link = match self.inner.lock() {
            Ok(mut inner) => {
                inner.attempt += 1;
                inner.subscribers.clear();
                inner.take_connection()
            },
            Err(_) => None,
        };

        if let (Some(link), Ok(handle)) = (link, tokio::runtime::Handle::try_current()) {
            handle.spawn(release_link(link));
        }
    }
}
