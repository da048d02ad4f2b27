//! Permission negotiation.
//!
//! Install, update and optional-permission requests are one-shot
//! asynchronous decisions. Opening a request yields three things:
//!
//! ```text
//! PermissionNegotiator::open()
//! ├── PermissionRequest   what is being asked, handed to observers
//! ├── DecisionResolver    cloneable; the first resolve() wins
//! └── PendingDecision     future the engine awaits
//! ```
//!
//! The sender half of each decision lives in the negotiator's pending
//! table. Resolving takes it out, so later resolutions (from the same or
//! another observer) are ignored. There is no timeout: a request stays
//! pending until it is resolved, its `PendingDecision` is dropped, or the
//! negotiator shuts down, which denies everything still pending.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::NegotiatorConfig;
use crate::error::{ExtensionError, Result};
use crate::extension::{Extension, PermissionSet};

/// Identifier of a single permission request.
pub type RequestId = Uuid;

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl From<bool> for Decision {
    fn from(allow: bool) -> Self {
        if allow {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

/// What a request is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Candidate that has not been materialized yet.
    Install { extension: Extension },
    /// Installed extension and the update that would replace it.
    Update {
        current: Extension,
        candidate: Extension,
    },
    /// Installed extension asking for more at runtime.
    Optional { extension: Extension },
}

impl RequestKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install { .. } => "install",
            Self::Update { .. } => "update",
            Self::Optional { .. } => "optional",
        }
    }

    /// The extension the request is about. For updates, the installed one.
    pub fn extension(&self) -> &Extension {
        match self {
            Self::Install { extension } | Self::Optional { extension } => extension,
            Self::Update { current, .. } => current,
        }
    }

    /// Install and update requests are exclusive per extension.
    fn is_exclusive(&self) -> bool {
        !matches!(self, Self::Optional { .. })
    }
}

/// A permission request as presented to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    /// Capabilities and origins the host is asked to grant.
    pub requested: PermissionSet,
    pub created_at: DateTime<Utc>,
}

impl PermissionRequest {
    pub fn extension_id(&self) -> &str {
        &self.kind.extension().id
    }
}

// ============================================================================
// Requested permission computation
// ============================================================================

/// Permissions an install candidate needs granted. Empty means no prompt.
pub fn install_permissions(candidate: &Extension) -> PermissionSet {
    candidate.required.clone()
}

/// Permissions an update would add over what the installed extension
/// already holds. Empty means the update cannot escalate.
pub fn update_escalation(current: &Extension, candidate: &Extension) -> PermissionSet {
    candidate.required.difference(&current.effective_permissions())
}

/// Validate an optional-permission request and drop entries already
/// granted. Every entry must be declared optional by the extension.
pub fn optional_request(extension: &Extension, requested: &PermissionSet) -> Result<PermissionSet> {
    let undeclared = requested.difference(&extension.optional);
    if let Some(permission) = undeclared
        .permissions()
        .iter()
        .chain(undeclared.origins().iter())
        .next()
    {
        return Err(ExtensionError::UndeclaredPermission {
            extension: extension.id.clone(),
            permission: permission.clone(),
        });
    }

    Ok(requested.difference(&extension.effective_permissions()))
}

// ============================================================================
// Decision handshake
// ============================================================================

struct DecisionSlot {
    request_id: RequestId,
    extension_id: String,
    exclusive: bool,
    sender: Mutex<Option<oneshot::Sender<Decision>>>,
}

impl DecisionSlot {
    /// Take the sender. Only the first caller gets it.
    fn take(&self) -> Option<oneshot::Sender<Decision>> {
        self.sender.lock().take()
    }
}

struct NegotiatorInner {
    config: NegotiatorConfig,
    pending: Mutex<HashMap<RequestId, Arc<DecisionSlot>>>,
    shut_down: AtomicBool,
}

impl NegotiatorInner {
    fn forget(&self, request_id: &RequestId) {
        self.pending.lock().remove(request_id);
    }
}

/// One-shot resolver handed to observers.
///
/// Clones share the same decision. The first call to [`resolve`] settles
/// it; every later call is ignored, logged, and returns `false`.
///
/// [`resolve`]: DecisionResolver::resolve
#[derive(Clone)]
pub struct DecisionResolver {
    slot: Arc<DecisionSlot>,
    negotiator: Weak<NegotiatorInner>,
}

impl DecisionResolver {
    pub fn request_id(&self) -> RequestId {
        self.slot.request_id
    }

    /// Settle the request. Returns `true` if this call decided it.
    pub fn resolve(&self, allow: bool) -> bool {
        self.resolve_with(Decision::from(allow))
    }

    pub fn allow(&self) -> bool {
        self.resolve_with(Decision::Allow)
    }

    pub fn deny(&self) -> bool {
        self.resolve_with(Decision::Deny)
    }

    /// Whether the decision has been settled (by anyone, or by teardown).
    pub fn is_resolved(&self) -> bool {
        self.slot.sender.lock().is_none()
    }

    fn resolve_with(&self, decision: Decision) -> bool {
        let Some(sender) = self.slot.take() else {
            warn!(
                request_id = %self.slot.request_id,
                extension_id = %self.slot.extension_id,
                ?decision,
                "Permission decision already resolved, ignoring"
            );
            return false;
        };

        if let Some(negotiator) = self.negotiator.upgrade() {
            negotiator.forget(&self.slot.request_id);
        }

        info!(
            request_id = %self.slot.request_id,
            extension_id = %self.slot.extension_id,
            ?decision,
            "Permission decision resolved"
        );

        if sender.send(decision).is_err() {
            debug!(request_id = %self.slot.request_id, "Requester no longer waiting");
        }
        true
    }
}

impl std::fmt::Debug for DecisionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionResolver")
            .field("request_id", &self.slot.request_id)
            .field("extension_id", &self.slot.extension_id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Future the engine awaits while the host decides.
///
/// Yields [`Decision::Deny`] if the negotiator goes away without a
/// decision. Dropping it before completion withdraws the request: it
/// leaves the pending table and later resolutions are ignored.
pub struct PendingDecision {
    rx: oneshot::Receiver<Decision>,
    slot: Arc<DecisionSlot>,
    negotiator: Weak<NegotiatorInner>,
    done: bool,
}

impl PendingDecision {
    pub fn request_id(&self) -> RequestId {
        self.slot.request_id
    }
}

impl Future for PendingDecision {
    type Output = Decision;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(result) => {
                self.done = true;
                Poll::Ready(result.unwrap_or(Decision::Deny))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingDecision {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if self.slot.take().is_some() {
            debug!(
                request_id = %self.slot.request_id,
                extension_id = %self.slot.extension_id,
                "Permission request withdrawn before resolution"
            );
        }
        if let Some(negotiator) = self.negotiator.upgrade() {
            negotiator.forget(&self.slot.request_id);
        }
    }
}

/// A freshly opened request.
pub struct Negotiation {
    pub request: Arc<PermissionRequest>,
    pub resolver: DecisionResolver,
    pub decision: PendingDecision,
}

/// Owns every pending permission decision.
pub struct PermissionNegotiator {
    inner: Arc<NegotiatorInner>,
}

impl PermissionNegotiator {
    pub fn new(config: NegotiatorConfig) -> Self {
        Self {
            inner: Arc::new(NegotiatorInner {
                config,
                pending: Mutex::new(HashMap::new()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Open a request.
    ///
    /// Fails when shutting down, when the pending limit is reached, or
    /// when an install/update request for the same extension is already
    /// pending.
    pub fn open(&self, kind: RequestKind, requested: PermissionSet) -> Result<Negotiation> {
        if self.is_shut_down() {
            return Err(ExtensionError::ShuttingDown);
        }

        let extension_id = kind.extension().id.clone();
        let exclusive = kind.is_exclusive();
        let request = Arc::new(PermissionRequest {
            id: Uuid::new_v4(),
            kind,
            requested,
            created_at: Utc::now(),
        });

        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(DecisionSlot {
            request_id: request.id,
            extension_id: extension_id.clone(),
            exclusive,
            sender: Mutex::new(Some(tx)),
        });

        {
            let mut pending = self.inner.pending.lock();
            // shutdown() flips the flag under this lock before draining.
            if self.is_shut_down() {
                return Err(ExtensionError::ShuttingDown);
            }
            if pending.len() >= self.inner.config.max_pending {
                return Err(ExtensionError::TooManyPending(self.inner.config.max_pending));
            }
            if exclusive
                && pending
                    .values()
                    .any(|s| s.exclusive && s.extension_id == extension_id)
            {
                return Err(ExtensionError::RequestPending(extension_id));
            }
            pending.insert(request.id, slot.clone());
        }

        info!(
            request_id = %request.id,
            extension_id = %extension_id,
            kind = request.kind.name(),
            permissions = ?request.requested.permissions(),
            origins = ?request.requested.origins(),
            "Permission request opened"
        );

        let negotiator = Arc::downgrade(&self.inner);
        Ok(Negotiation {
            request,
            resolver: DecisionResolver {
                slot: slot.clone(),
                negotiator: negotiator.clone(),
            },
            decision: PendingDecision {
                rx,
                slot,
                negotiator,
                done: false,
            },
        })
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.inner.pending.lock().contains_key(request_id)
    }

    /// Pending request ids for one extension.
    pub fn pending_for(&self, extension_id: &str) -> Vec<RequestId> {
        self.inner
            .pending
            .lock()
            .values()
            .filter(|s| s.extension_id == extension_id)
            .map(|s| s.request_id)
            .collect()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Deny every pending request and refuse new ones.
    ///
    /// Returns how many requests were denied. Idempotent.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<Arc<DecisionSlot>> = {
            let mut pending = self.inner.pending.lock();
            self.inner.shut_down.store(true, Ordering::Release);
            pending.drain().map(|(_, s)| s).collect()
        };

        let mut denied = 0;
        for slot in drained {
            if let Some(sender) = slot.take() {
                let _ = sender.send(Decision::Deny);
                denied += 1;
            }
        }

        if denied > 0 {
            warn!(denied, "Negotiator shut down, pending permission requests denied");
        } else {
            debug!("Negotiator shut down with no pending requests");
        }
        denied
    }
}

impl Default for PermissionNegotiator {
    fn default() -> Self {
        Self::new(NegotiatorConfig::default())
    }
}
