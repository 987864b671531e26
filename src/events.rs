//! Event system for error and device-status notifications
//!
//! Decoupled observer hook: the core publishes "error occurred" and "device
//! status changed" events; subscribers (dashboard, external monitors) pull
//! them from a channel. Publishing never blocks and never fails.

use std::sync::{Arc, Mutex, TryLockError};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::diagnostics::{DeviceStatus, DeviceType};
use crate::error::ApplicationError;

/// Per-subscriber channel capacity; a slow subscriber drops events rather
/// than stalling the publisher.
const SUBSCRIBER_QUEUE: usize = 100;

/// Kind of core event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An error was classified and handled
    ErrorOccurred,
    /// A device transitioned to a new status
    DeviceStatusChanged,
}

/// Events published by the failure-handling core
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// An error passed through the handler or the failure trap
    ErrorOccurred(ApplicationError),
    /// A device status transition was recorded
    DeviceStatusChanged {
        device: DeviceType,
        previous: DeviceStatus,
        status: DeviceStatus,
        message: String,
    },
}

impl AppEvent {
    /// Get the kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ErrorOccurred(_) => EventKind::ErrorOccurred,
            Self::DeviceStatusChanged { .. } => EventKind::DeviceStatusChanged,
        }
    }

    /// Get the device this event concerns, if any
    pub fn device(&self) -> Option<DeviceType> {
        match self {
            Self::DeviceStatusChanged { device, .. } => Some(*device),
            _ => None,
        }
    }
}

/// Defines which events a subscriber is interested in
pub enum EventFilter {
    /// Accept all events
    All,
    /// Only specific event kinds
    Kinds(Vec<EventKind>),
    /// Only events for specific devices
    Devices(Vec<DeviceType>),
    /// Custom filter function
    Custom(Box<dyn Fn(&AppEvent) -> bool + Send + Sync + 'static>),
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "EventFilter::All"),
            Self::Kinds(kinds) => write!(f, "EventFilter::Kinds({:?})", kinds),
            Self::Devices(devices) => write!(f, "EventFilter::Devices({:?})", devices),
            Self::Custom(_) => write!(f, "EventFilter::Custom(<function>)"),
        }
    }
}

impl EventFilter {
    /// Filter that includes all events
    pub fn all() -> Self {
        Self::All
    }

    /// Filter for specific event kinds
    pub fn kinds(kinds: Vec<EventKind>) -> Self {
        Self::Kinds(kinds)
    }

    /// Filter for specific devices
    pub fn devices(devices: Vec<DeviceType>) -> Self {
        Self::Devices(devices)
    }

    /// Custom filter with a closure
    pub fn custom<F>(filter_fn: F) -> Self
    where
        F: Fn(&AppEvent) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Box::new(filter_fn))
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &AppEvent) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => kinds.contains(&event.kind()),
            Self::Devices(devices) => match event.device() {
                Some(device) => devices.contains(&device),
                None => false,
            },
            Self::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Subscriber ID type
pub type SubscriberId = u32;

struct Subscriber {
    id: SubscriberId,
    sender: Sender<AppEvent>,
    filter: EventFilter,
}

struct BrokerInner {
    next_id: SubscriberId,
    subscribers: Vec<Subscriber>,
}

/// Distributes core events to filtered subscribers. Cheap to clone; all
/// clones share the subscriber list.
#[derive(Clone)]
pub struct EventBroker {
    inner: Arc<Mutex<BrokerInner>>,
}

impl EventBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BrokerInner {
                next_id: 1,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Subscribe with a filter; events arrive on the returned receiver.
    pub fn subscribe(&self, filter: EventFilter) -> (SubscriberId, Receiver<AppEvent>) {
        let (tx, rx) = bounded(SUBSCRIBER_QUEUE);
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            sender: tx,
            filter,
        });
        (id, rx)
    }

    /// Remove a subscriber
    pub fn unsubscribe(&self, id: SubscriberId) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.retain(|s| s.id != id);
        }
    }

    /// Deliver an event to every matching subscriber. Full queues drop the
    /// event for that subscriber; disconnected subscribers are removed.
    pub fn publish(&self, event: AppEvent) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::deliver(&mut inner, event);
    }

    /// Try-lock publish for the failure trap: never waits on the broker
    /// lock. If another context holds it (including this thread, mid-panic
    /// inside `publish`), the event is dropped.
    pub fn publish_best_effort(&self, event: AppEvent) {
        match self.inner.try_lock() {
            Ok(mut inner) => Self::deliver(&mut inner, event),
            Err(TryLockError::Poisoned(poisoned)) => {
                Self::deliver(&mut poisoned.into_inner(), event)
            }
            Err(TryLockError::WouldBlock) => {}
        }
    }

    fn deliver(inner: &mut BrokerInner, event: AppEvent) {
        let mut disconnected = Vec::new();
        for subscriber in inner.subscribers.iter() {
            if subscriber.filter.matches(&event) {
                if let Err(TrySendError::Disconnected(_)) =
                    subscriber.sender.try_send(event.clone())
                {
                    disconnected.push(subscriber.id);
                }
            }
        }
        if !disconnected.is_empty() {
            inner.subscribers.retain(|s| !disconnected.contains(&s.id));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.subscribers.len())
            .unwrap_or(0)
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}
