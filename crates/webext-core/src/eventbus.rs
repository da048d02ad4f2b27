//! Broadcast bus mirroring delivered extension notifications.
//!
//! Observers registered on the dispatcher are called synchronously and
//! can answer prompts. The bus is for everything else: audit logs,
//! metrics, UI refreshes running on their own tasks. Permission prompts
//! are never published here, only their outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::action::Action;
use crate::extension::{Extension, InstallationFailure};
use crate::permission::{Decision, RequestId};
use crate::session::EngineSession;

/// Notification as seen by bus subscribers.
#[derive(Debug, Clone)]
pub enum ExtensionEvent {
    Installed { extension: Extension },
    Uninstalled { extension: Extension },
    Enabled { extension: Extension },
    Disabled { extension: Extension },
    Ready { extension: Extension },
    PrivateBrowsingChanged { extension: Extension },
    NewTabRequested {
        extension: Extension,
        session: EngineSession,
        active: bool,
        url: String,
    },
    BrowserActionDefined { extension: Extension, action: Action },
    PageActionDefined { extension: Extension, action: Action },
    PopupToggled {
        extension: Extension,
        action: Action,
        shown: bool,
    },
    InstallationFailed { failure: InstallationFailure },
    PermissionResolved {
        request_id: RequestId,
        extension_id: String,
        kind: &'static str,
        decision: Decision,
    },
    ExtensionListUpdated,
    ProcessSpawningDisabled,
}

impl ExtensionEvent {
    /// Stable name for logging and filtering.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Installed { .. } => "Installed",
            Self::Uninstalled { .. } => "Uninstalled",
            Self::Enabled { .. } => "Enabled",
            Self::Disabled { .. } => "Disabled",
            Self::Ready { .. } => "Ready",
            Self::PrivateBrowsingChanged { .. } => "PrivateBrowsingChanged",
            Self::NewTabRequested { .. } => "NewTabRequested",
            Self::BrowserActionDefined { .. } => "BrowserActionDefined",
            Self::PageActionDefined { .. } => "PageActionDefined",
            Self::PopupToggled { .. } => "PopupToggled",
            Self::InstallationFailed { .. } => "InstallationFailed",
            Self::PermissionResolved { .. } => "PermissionResolved",
            Self::ExtensionListUpdated => "ExtensionListUpdated",
            Self::ProcessSpawningDisabled => "ProcessSpawningDisabled",
        }
    }

    /// Extension the event is about, if any.
    pub fn extension_id(&self) -> Option<&str> {
        match self {
            Self::Installed { extension }
            | Self::Uninstalled { extension }
            | Self::Enabled { extension }
            | Self::Disabled { extension }
            | Self::Ready { extension }
            | Self::PrivateBrowsingChanged { extension }
            | Self::NewTabRequested { extension, .. }
            | Self::BrowserActionDefined { extension, .. }
            | Self::PageActionDefined { extension, .. }
            | Self::PopupToggled { extension, .. } => Some(extension.id.as_str()),
            Self::InstallationFailed { failure } => failure.extension.id(),
            Self::PermissionResolved { extension_id, .. } => Some(extension_id.as_str()),
            Self::ExtensionListUpdated | Self::ProcessSpawningDisabled => None,
        }
    }

    pub fn is_lifecycle_event(&self) -> bool {
        matches!(
            self,
            Self::Installed { .. }
                | Self::Uninstalled { .. }
                | Self::Enabled { .. }
                | Self::Disabled { .. }
                | Self::Ready { .. }
        )
    }
}

/// Per-event metadata stamped by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMetadata {
    /// Monotonic publish order.
    pub sequence: u64,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

type Envelope = (ExtensionEvent, EventMetadata);

/// Broadcast event bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event. Returns `true` if at least one subscriber exists.
    pub fn publish(&self, event: ExtensionEvent) -> bool {
        let metadata = EventMetadata {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.tx.send((event, metadata)).is_ok()
    }

    /// Subscribe to all events published from now on.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    pub fn filter(&self) -> FilterBuilder {
        FilterBuilder {
            tx: self.tx.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(crate::config::defaults::EVENT_BUS_CAPACITY)
    }
}

/// Receiver for all events.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<Envelope>,
}

impl EventBusReceiver {
    /// Receive the next event. `None` once the bus is gone.
    ///
    /// A lagging receiver skips what it missed and keeps going.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event bus subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Receiver that only yields events matching a predicate.
pub struct FilteredReceiver<F>
where
    F: Fn(&ExtensionEvent) -> bool + Send,
{
    rx: broadcast::Receiver<Envelope>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&ExtensionEvent) -> bool + Send,
{
    fn new(rx: broadcast::Receiver<Envelope>, filter: F) -> Self {
        Self { rx, filter }
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.try_recv() {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Builder for filtered subscriptions.
pub struct FilterBuilder {
    tx: broadcast::Sender<Envelope>,
}

impl FilterBuilder {
    /// Installed, uninstalled, enabled, disabled and ready only.
    pub fn lifecycle(&self) -> FilteredReceiver<fn(&ExtensionEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), ExtensionEvent::is_lifecycle_event)
    }

    /// Events about one extension.
    pub fn extension_by_id(
        &self,
        extension_id: impl Into<String>,
    ) -> FilteredReceiver<impl Fn(&ExtensionEvent) -> bool + Send + 'static> {
        let target = extension_id.into();
        FilteredReceiver::new(self.tx.subscribe(), move |event: &ExtensionEvent| {
            event.extension_id() == Some(target.as_str())
        })
    }

    pub fn custom<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&ExtensionEvent) -> bool + Send + 'static,
    {
        FilteredReceiver::new(self.tx.subscribe(), filter)
    }
}
