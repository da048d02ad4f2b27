//! Engine-facing controller.
//!
//! The engine drives everything through [`ExtensionController::raise`],
//! one event at a time per extension. Events that need host approval
//! (install, update, optional permissions) suspend on a
//! [`PendingDecision`](crate::permission::PendingDecision) until an
//! observer resolves it; everything else is delivered synchronously.
//!
//! ```text
//! engine ──raise()──► ExtensionController
//!                      ├── PermissionNegotiator  (install/update/optional)
//!                      ├── ExtensionStore        (mirror, written here only)
//!                      ├── ActionRegistry        (browser/page actions)
//!                      ├── EventDispatcher ──► observers, EventBus
//!                      └── TabBridge ──► host TabDelegate
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::action::{Action, ActionRegistry, ActionScope};
use crate::config::ControllerConfig;
use crate::dispatcher::{EventDispatcher, ExtensionObserver, NewTabRequest, ObserverId};
use crate::error::{ExtensionError, Result};
use crate::eventbus::{EventBus, ExtensionEvent};
use crate::extension::{
    EnableSource, Extension, ExtensionId, InstallationFailure, LifecycleState, PermissionSet,
};
use crate::permission::{self, Decision, PermissionNegotiator, RequestKind};
use crate::session::EngineSession;
use crate::store::ExtensionStore;
use crate::tabs::{QueryTab, TabBridge, TabDelegate, TabId};

/// Everything the engine can raise.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A candidate wants to be installed. Suspends on an install prompt
    /// when it requires permissions.
    InstallRequested { candidate: Extension },
    /// An installed extension wants to be replaced by `candidate`.
    /// Suspends on an update prompt when the candidate adds permissions.
    UpdateRequested {
        id: ExtensionId,
        candidate: Extension,
    },
    /// An installed extension asks for optional permissions at runtime.
    OptionalPermissionsRequested {
        id: ExtensionId,
        requested: PermissionSet,
    },
    /// Install failed for reasons unrelated to permissions.
    InstallationFailed { failure: InstallationFailure },
    /// An extension installed in an earlier run was loaded at startup.
    Restored { extension: Extension },
    Uninstalled { id: ExtensionId },
    Enabled {
        id: ExtensionId,
        source: EnableSource,
    },
    Disabled {
        id: ExtensionId,
        source: EnableSource,
    },
    Ready { id: ExtensionId },
    PrivateBrowsingChanged { id: ExtensionId, allowed: bool },
    NewTabRequested {
        id: ExtensionId,
        request: NewTabRequest,
    },
    /// Browser or page action declared (scope is on the action).
    ActionDefined { id: ExtensionId, action: Action },
    ActionRemoved {
        id: ExtensionId,
        scope: ActionScope,
    },
    /// Toggle the popup of the action declared at `revision`.
    TogglePopup {
        id: ExtensionId,
        session: EngineSession,
        scope: ActionScope,
        revision: u64,
    },
    ExtensionListUpdated,
    ProcessSpawningDisabled,
}

impl EngineEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::InstallRequested { .. } => "InstallRequested",
            Self::UpdateRequested { .. } => "UpdateRequested",
            Self::OptionalPermissionsRequested { .. } => "OptionalPermissionsRequested",
            Self::InstallationFailed { .. } => "InstallationFailed",
            Self::Restored { .. } => "Restored",
            Self::Uninstalled { .. } => "Uninstalled",
            Self::Enabled { .. } => "Enabled",
            Self::Disabled { .. } => "Disabled",
            Self::Ready { .. } => "Ready",
            Self::PrivateBrowsingChanged { .. } => "PrivateBrowsingChanged",
            Self::NewTabRequested { .. } => "NewTabRequested",
            Self::ActionDefined { .. } => "ActionDefined",
            Self::ActionRemoved { .. } => "ActionRemoved",
            Self::TogglePopup { .. } => "TogglePopup",
            Self::ExtensionListUpdated => "ExtensionListUpdated",
            Self::ProcessSpawningDisabled => "ProcessSpawningDisabled",
        }
    }
}

/// What [`ExtensionController::raise`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Notification delivered to observers.
    Delivered,
    /// Event applied but nothing changed, so nothing was delivered
    /// (e.g. enabling an extension that another source keeps disabled).
    Unchanged,
    Installed(Extension),
    Updated(Extension),
    Decision(Decision),
    ActionDefined(Action),
    /// Session the popup was shown in, `None` if nothing was displayed.
    Popup(Option<EngineSession>),
}

/// Wires negotiator, dispatcher, action registry and tab bridge.
pub struct ExtensionController {
    config: ControllerConfig,
    store: ExtensionStore,
    actions: ActionRegistry,
    negotiator: PermissionNegotiator,
    dispatcher: EventDispatcher,
    tabs: TabBridge,
}

impl ExtensionController {
    pub fn new(config: ControllerConfig) -> Self {
        let bus = EventBus::with_capacity(config.event_bus_capacity);
        Self {
            negotiator: PermissionNegotiator::new(config.negotiator.clone()),
            dispatcher: EventDispatcher::new(bus),
            store: ExtensionStore::new(),
            actions: ActionRegistry::new(),
            tabs: TabBridge::new(),
            config,
        }
    }

    /// Controller configured from `WEBEXT_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(ControllerConfig::from_env())
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn negotiator(&self) -> &PermissionNegotiator {
        &self.negotiator
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn register(&self, observer: ExtensionObserver) -> ObserverId {
        self.dispatcher.register(observer)
    }

    pub fn unregister(&self, id: ObserverId) -> bool {
        self.dispatcher.unregister(id)
    }

    pub fn set_tab_delegate(&self, delegate: Arc<dyn TabDelegate>) {
        self.tabs.set_delegate(delegate);
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub fn extension(&self, id: &str) -> Option<Extension> {
        self.store.get(id)
    }

    pub fn extensions(&self) -> Vec<Extension> {
        self.store.list()
    }

    /// Capability strings currently held by an installed extension.
    pub fn permission_set(&self, id: &str) -> Option<Vec<String>> {
        self.store.get(id).map(|e| e.permission_set())
    }

    /// Snapshot of all host tabs.
    pub async fn query_tabs(&self) -> Vec<QueryTab> {
        self.tabs.query_tabs().await
    }

    /// Tabs visible to one extension: private tabs are hidden unless the
    /// extension is allowed in private browsing. Unknown ids see nothing.
    pub async fn query_tabs_for(&self, id: &str) -> Vec<QueryTab> {
        let Some(extension) = self.store.get(id) else {
            return Vec::new();
        };
        let tabs = self.tabs.query_tabs().await;
        if extension.private_browsing_allowed {
            tabs
        } else {
            tabs.into_iter().filter(|t| !t.incognito).collect()
        }
    }

    pub async fn close_tab(&self, id: TabId) -> bool {
        self.tabs.close_tab(id).await
    }

    // ------------------------------------------------------------------
    // Engine entry point
    // ------------------------------------------------------------------

    /// Apply one engine event.
    pub async fn raise(&self, event: EngineEvent) -> Result<EventOutcome> {
        debug!(event = event.type_name(), "Engine event raised");
        match event {
            EngineEvent::InstallRequested { candidate } => {
                self.install(candidate).await.map(EventOutcome::Installed)
            }
            EngineEvent::UpdateRequested { id, candidate } => {
                self.update(&id, candidate).await.map(EventOutcome::Updated)
            }
            EngineEvent::OptionalPermissionsRequested { id, requested } => self
                .request_optional(&id, requested)
                .await
                .map(EventOutcome::Decision),
            EngineEvent::InstallationFailed { failure } => {
                warn!(
                    extension_id = ?failure.extension.id(),
                    reason = %failure.reason,
                    "Extension installation failed"
                );
                self.dispatcher.installation_failed(&failure);
                Ok(EventOutcome::Delivered)
            }
            EngineEvent::Restored { extension } => self.restore(extension),
            EngineEvent::Uninstalled { id } => self.uninstall(&id),
            EngineEvent::Enabled { id, source } => self.enable(&id, source),
            EngineEvent::Disabled { id, source } => self.disable(&id, source),
            EngineEvent::Ready { id } => {
                let current = self.require(&id)?;
                if !current.disabled_by.is_empty() {
                    debug!(
                        extension_id = %id,
                        disabled_by = ?current.disabled_by,
                        "Ready ignored while disabled"
                    );
                    return Ok(EventOutcome::Unchanged);
                }
                let extension = self
                    .store
                    .update(&id, |e| e.state = LifecycleState::Ready)
                    .ok_or_else(|| ExtensionError::NotFound(id.clone()))?;
                self.dispatcher.ready(&extension);
                Ok(EventOutcome::Delivered)
            }
            EngineEvent::PrivateBrowsingChanged { id, allowed } => {
                let before = self.require(&id)?;
                if before.private_browsing_allowed == allowed {
                    return Ok(EventOutcome::Unchanged);
                }
                let extension = self
                    .store
                    .update(&id, |e| e.private_browsing_allowed = allowed)
                    .ok_or_else(|| ExtensionError::NotFound(id.clone()))?;
                info!(extension_id = %id, allowed, "Private browsing permission changed");
                self.dispatcher.private_browsing_changed(&extension);
                Ok(EventOutcome::Delivered)
            }
            EngineEvent::NewTabRequested { id, request } => {
                let extension = self.require(&id)?;
                self.dispatcher.new_tab(&extension, &request);
                Ok(EventOutcome::Delivered)
            }
            EngineEvent::ActionDefined { id, action } => {
                let extension = self.require(&id)?;
                let stored = self.actions.define(&id, action);
                self.dispatcher.action_defined(&extension, &stored);
                Ok(EventOutcome::ActionDefined(stored))
            }
            EngineEvent::ActionRemoved { id, scope } => {
                self.require(&id)?;
                Ok(match self.actions.remove(&id, scope) {
                    Some(_) => EventOutcome::Delivered,
                    None => EventOutcome::Unchanged,
                })
            }
            EngineEvent::TogglePopup {
                id,
                session,
                scope,
                revision,
            } => Ok(EventOutcome::Popup(
                self.toggle_popup(&id, &session, scope, revision),
            )),
            EngineEvent::ExtensionListUpdated => {
                self.dispatcher.extension_list_updated();
                Ok(EventOutcome::Delivered)
            }
            EngineEvent::ProcessSpawningDisabled => {
                warn!("Extension process spawning disabled");
                self.dispatcher.process_spawning_disabled();
                Ok(EventOutcome::Delivered)
            }
        }
    }

    /// Withdraw previously granted optional permissions. No prompt.
    pub fn revoke_optional(&self, id: &str, revoked: &PermissionSet) -> Result<Extension> {
        let extension = self
            .store
            .update(id, |e| e.granted_optional = e.granted_optional.difference(revoked))
            .ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;
        info!(
            extension_id = %id,
            revoked = ?revoked.permissions(),
            "Optional permissions revoked"
        );
        Ok(extension)
    }

    /// Tear down: deny every pending decision and refuse new requests.
    /// Returns how many pending requests were denied.
    pub fn shutdown(&self) -> usize {
        let denied = self.negotiator.shutdown();
        info!(denied, "Extension controller shut down");
        denied
    }

    // ------------------------------------------------------------------
    // Flows
    // ------------------------------------------------------------------

    fn require(&self, id: &str) -> Result<Extension> {
        self.store
            .get(id)
            .ok_or_else(|| ExtensionError::NotFound(id.to_string()))
    }

    /// Open a request, prompt observers, and wait for the decision.
    async fn negotiate(&self, kind: RequestKind, requested: PermissionSet) -> Result<Decision> {
        let negotiation = self.negotiator.open(kind, requested)?;
        self.dispatcher
            .prompt(&negotiation.request, &negotiation.resolver);
        drop(negotiation.resolver);

        let decision = negotiation.decision.await;
        self.dispatcher.bus().publish(ExtensionEvent::PermissionResolved {
            request_id: negotiation.request.id,
            extension_id: negotiation.request.extension_id().to_string(),
            kind: negotiation.request.kind.name(),
            decision,
        });
        Ok(decision)
    }

    async fn install(&self, candidate: Extension) -> Result<Extension> {
        let id = candidate.id.clone();
        if self.store.contains(&id) {
            return Err(ExtensionError::AlreadyInstalled(id));
        }

        let requested = permission::install_permissions(&candidate);
        if requested.is_empty() {
            debug!(extension_id = %id, "Install requires no permissions, skipping prompt");
        } else {
            let decision = self
                .negotiate(
                    RequestKind::Install {
                        extension: candidate.clone(),
                    },
                    requested,
                )
                .await?;
            if !decision.is_allowed() {
                info!(extension_id = %id, "Install denied");
                return Err(ExtensionError::InstallDenied(id));
            }
        }

        let mut installed = candidate;
        installed.state = LifecycleState::Installed;
        installed.disabled_by.clear();
        installed.granted_optional = PermissionSet::default();
        if !self.store.insert_new(installed.clone()) {
            return Err(ExtensionError::AlreadyInstalled(id));
        }

        info!(
            extension_id = %id,
            version = %installed.metadata.version,
            "Extension installed"
        );
        self.dispatcher.installed(&installed);
        Ok(self.mark_ready_after_install(installed))
    }

    async fn update(&self, id: &str, candidate: Extension) -> Result<Extension> {
        if candidate.id != id {
            return Err(ExtensionError::IdMismatch {
                expected: id.to_string(),
                got: candidate.id,
            });
        }
        let current = self.require(id)?;

        let added = permission::update_escalation(&current, &candidate);
        if added.is_empty() {
            debug!(extension_id = %id, "Update adds no permissions, skipping prompt");
        } else {
            let decision = self
                .negotiate(
                    RequestKind::Update {
                        current: current.clone(),
                        candidate: candidate.clone(),
                    },
                    added,
                )
                .await?;
            if !decision.is_allowed() {
                info!(
                    extension_id = %id,
                    version = %candidate.metadata.version,
                    "Update denied, keeping installed version"
                );
                return Err(ExtensionError::UpdateDenied(id.to_string()));
            }
        }

        let updated = self
            .store
            .update(id, |e| {
                let mut next = candidate;
                next.state = e.state;
                next.disabled_by = std::mem::take(&mut e.disabled_by);
                next.private_browsing_allowed = e.private_browsing_allowed;
                next.granted_optional = e.granted_optional.intersection(&next.optional);
                *e = next;
            })
            .ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;

        info!(
            extension_id = %id,
            from = %current.metadata.version,
            to = %updated.metadata.version,
            "Extension updated"
        );
        self.dispatcher.installed(&updated);
        Ok(self.mark_ready_after_install(updated))
    }

    async fn request_optional(&self, id: &str, requested: PermissionSet) -> Result<Decision> {
        let extension = self.require(id)?;
        let remaining = permission::optional_request(&extension, &requested)?;
        if remaining.is_empty() {
            debug!(extension_id = %id, "Optional permissions already granted");
            return Ok(Decision::Allow);
        }

        let decision = self
            .negotiate(RequestKind::Optional { extension }, remaining.clone())
            .await?;
        if decision.is_allowed() {
            // An update may have shrunk the declaration while the prompt was open.
            let mut granted = PermissionSet::default();
            self.store
                .update(id, |e| {
                    granted = remaining.intersection(&e.optional);
                    e.granted_optional = e.granted_optional.union(&granted);
                })
                .ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;
            if granted.len() < remaining.len() {
                debug!(
                    extension_id = %id,
                    dropped = ?remaining.difference(&granted).permissions(),
                    "Optional permissions no longer declared"
                );
            }
            info!(
                extension_id = %id,
                granted = ?granted.permissions(),
                "Optional permissions granted"
            );
        }
        Ok(decision)
    }

    fn mark_ready_after_install(&self, extension: Extension) -> Extension {
        if !self.config.ready_after_install || !extension.is_enabled() {
            return extension;
        }
        match self
            .store
            .update(&extension.id, |e| e.state = LifecycleState::Ready)
        {
            Some(ready) => {
                self.dispatcher.ready(&ready);
                ready
            }
            None => extension,
        }
    }

    fn restore(&self, mut extension: Extension) -> Result<EventOutcome> {
        let id = extension.id.clone();
        extension.state = if extension.disabled_by.is_empty() {
            LifecycleState::Ready
        } else {
            LifecycleState::Disabled
        };
        if !self.store.insert_new(extension.clone()) {
            return Err(ExtensionError::AlreadyInstalled(id));
        }

        debug!(extension_id = %id, state = %extension.state, "Extension restored");
        if extension.is_enabled() {
            self.dispatcher.ready(&extension);
            Ok(EventOutcome::Delivered)
        } else {
            Ok(EventOutcome::Unchanged)
        }
    }

    fn uninstall(&self, id: &str) -> Result<EventOutcome> {
        let extension = self
            .store
            .remove(id)
            .ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;
        let removed_actions = self.actions.remove_extension(id);

        info!(extension_id = %id, removed_actions, "Extension uninstalled");
        self.dispatcher.uninstalled(&extension);
        Ok(EventOutcome::Delivered)
    }

    fn enable(&self, id: &str, source: EnableSource) -> Result<EventOutcome> {
        let before = self.require(id)?;
        let extension = self
            .store
            .update(id, |e| {
                e.disabled_by.retain(|s| *s != source);
                if e.disabled_by.is_empty() && e.state == LifecycleState::Disabled {
                    e.state = LifecycleState::Enabled;
                }
            })
            .ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;

        if before.is_enabled() || !extension.is_enabled() {
            debug!(
                extension_id = %id,
                ?source,
                remaining = ?extension.disabled_by,
                "Enable did not change state"
            );
            return Ok(EventOutcome::Unchanged);
        }

        info!(extension_id = %id, ?source, "Extension enabled");
        self.dispatcher.enabled(&extension);
        Ok(EventOutcome::Delivered)
    }

    fn disable(&self, id: &str, source: EnableSource) -> Result<EventOutcome> {
        let before = self.require(id)?;
        let extension = self
            .store
            .update(id, |e| {
                if !e.disabled_by.contains(&source) {
                    e.disabled_by.push(source);
                }
                e.state = LifecycleState::Disabled;
            })
            .ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;

        if !before.is_enabled() {
            debug!(extension_id = %id, ?source, "Extension already disabled");
            return Ok(EventOutcome::Unchanged);
        }

        info!(extension_id = %id, ?source, "Extension disabled");
        self.dispatcher.disabled(&extension);
        Ok(EventOutcome::Delivered)
    }

    fn toggle_popup(
        &self,
        id: &str,
        session: &EngineSession,
        scope: ActionScope,
        revision: u64,
    ) -> Option<EngineSession> {
        let extension = self.store.get(id)?;
        let action = self.actions.resolve_toggle(id, scope, revision)?;
        let shown = self.dispatcher.toggle_popup(&extension, session, &action);
        debug!(extension_id = %id, %scope, shown = shown.is_some(), "Popup toggled");
        shown
    }
}

impl Default for ExtensionController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ext(id: &str, permissions: &[&str]) -> Extension {
        Extension::new(id, semver::Version::new(1, 0, 0))
            .with_required(PermissionSet::from_permissions(permissions.iter().copied()))
    }

    fn auto(allow: bool) -> ExtensionObserver {
        ExtensionObserver::named("auto")
            .on_install_prompt(move |_, r| {
                r.resolve(allow);
            })
            .on_update_prompt(move |_, r| {
                r.resolve(allow);
            })
            .on_optional_prompt(move |_, r| {
                r.resolve(allow);
            })
    }

    #[tokio::test]
    async fn test_install_without_permissions_skips_prompt() {
        let controller = ExtensionController::default();
        let prompts = Arc::new(AtomicUsize::new(0));
        let p = prompts.clone();
        controller.register(ExtensionObserver::new().on_install_prompt(move |_, _| {
            p.fetch_add(1, Ordering::SeqCst);
        }));

        let outcome = controller
            .raise(EngineEvent::InstallRequested {
                candidate: ext("ext-1", &[]),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Installed(e) if e.state == LifecycleState::Ready));
        assert_eq!(prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_install_denied_leaves_nothing_installed() {
        let controller = ExtensionController::default();
        controller.register(auto(false));

        let err = controller
            .raise(EngineEvent::InstallRequested {
                candidate: ext("ext-1", &["tabs"]),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExtensionError::InstallDenied(id) if id == "ext-1"));
        assert!(controller.extension("ext-1").is_none());
        assert_eq!(controller.negotiator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_extension_events() {
        let controller = ExtensionController::default();
        let err = controller
            .raise(EngineEvent::Enabled {
                id: "ghost".into(),
                source: EnableSource::User,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExtensionError::NotFound(_)));

        let outcome = controller
            .raise(EngineEvent::TogglePopup {
                id: "ghost".into(),
                session: EngineSession::new(()),
                scope: ActionScope::Browser,
                revision: 1,
            })
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Popup(None));
    }

    #[tokio::test]
    async fn test_disable_sources_stack() {
        let controller = ExtensionController::default();
        controller
            .raise(EngineEvent::Restored {
                extension: ext("ext-1", &["tabs"]),
            })
            .await
            .unwrap();

        let disable = |source| EngineEvent::Disabled {
            id: "ext-1".into(),
            source,
        };
        let enable = |source| EngineEvent::Enabled {
            id: "ext-1".into(),
            source,
        };

        assert_eq!(
            controller.raise(disable(EnableSource::User)).await.unwrap(),
            EventOutcome::Delivered
        );
        assert_eq!(
            controller.raise(disable(EnableSource::App)).await.unwrap(),
            EventOutcome::Unchanged
        );
        assert_eq!(
            controller.raise(enable(EnableSource::User)).await.unwrap(),
            EventOutcome::Unchanged
        );
        assert_eq!(
            controller.extension("ext-1").unwrap().state,
            LifecycleState::Disabled
        );
        assert_eq!(
            controller.raise(enable(EnableSource::App)).await.unwrap(),
            EventOutcome::Delivered
        );
        assert_eq!(
            controller.extension("ext-1").unwrap().state,
            LifecycleState::Enabled
        );
    }

    #[tokio::test]
    async fn test_revoke_optional() {
        let controller = ExtensionController::default();
        controller.register(auto(true));
        controller
            .raise(EngineEvent::Restored {
                extension: ext("ext-1", &["tabs"])
                    .with_optional(PermissionSet::from_permissions(["history", "bookmarks"])),
            })
            .await
            .unwrap();

        controller
            .raise(EngineEvent::OptionalPermissionsRequested {
                id: "ext-1".into(),
                requested: PermissionSet::from_permissions(["history", "bookmarks"]),
            })
            .await
            .unwrap();
        assert_eq!(
            controller.permission_set("ext-1").unwrap(),
            vec!["tabs", "history", "bookmarks"]
        );

        let ext = controller
            .revoke_optional("ext-1", &PermissionSet::from_permissions(["history"]))
            .unwrap();
        assert_eq!(ext.permission_set(), vec!["tabs", "bookmarks"]);
    }

    #[tokio::test]
    async fn test_zero_event_bus_capacity() {
        let controller =
            ExtensionController::new(ControllerConfig::default().with_event_bus_capacity(0));
        let mut rx = controller.dispatcher().bus().subscribe();

        assert_eq!(
            controller.raise(EngineEvent::ExtensionListUpdated).await.unwrap(),
            EventOutcome::Delivered
        );
        let (event, _) = rx.try_recv().unwrap();
        assert_eq!(event.type_name(), "ExtensionListUpdated");
    }
}
