//! Observer registration and notification fan-out.
//!
//! An observer is a set of independently optional handlers. A missing
//! handler is a no-op, indistinguishable from a handler that chose not to
//! act. Every notification reaches every registered observer, in
//! registration order; a handler that panics is logged and skipped
//! without affecting the others.
//!
//! Handlers run synchronously on the task raising the event and must not
//! block. Prompt handlers that need to ask the user move the
//! [`DecisionResolver`] into their own task and resolve it later.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::action::{Action, ActionScope};
use crate::eventbus::{EventBus, EventBusReceiver, ExtensionEvent};
use crate::extension::{Extension, InstallationFailure};
use crate::permission::{DecisionResolver, PermissionRequest, RequestKind};
use crate::session::EngineSession;

type ExtensionHandler = Arc<dyn Fn(&Extension) + Send + Sync>;
type NewTabHandler = Arc<dyn Fn(&Extension, &NewTabRequest) + Send + Sync>;
type ActionHandler = Arc<dyn Fn(&Extension, &Action) + Send + Sync>;
type TogglePopupHandler =
    Arc<dyn Fn(&Extension, &EngineSession, &Action) -> Option<EngineSession> + Send + Sync>;
type FailureHandler = Arc<dyn Fn(&InstallationFailure) + Send + Sync>;
type PromptHandler = Arc<dyn Fn(&PermissionRequest, DecisionResolver) + Send + Sync>;
type SignalHandler = Arc<dyn Fn() + Send + Sync>;

/// Payload of a new-tab request.
#[derive(Debug, Clone)]
pub struct NewTabRequest {
    /// Session the tab should be opened with.
    pub session: EngineSession,
    /// Whether the new tab should become the active one.
    pub active: bool,
    pub url: String,
}

/// Handle returned by [`EventDispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Host-side observer: every handler is optional.
///
/// ```rust,ignore
/// let observer = ExtensionObserver::named("prompt-ui")
///     .on_installed(|ext| println!("installed {}", ext.id))
///     .on_install_prompt(|request, resolver| {
///         let granted = request.requested.permissions().len() < 5;
///         resolver.resolve(granted);
///     });
/// let id = controller.dispatcher().register(observer);
/// ```
#[derive(Clone, Default)]
pub struct ExtensionObserver {
    name: String,
    installed: Option<ExtensionHandler>,
    uninstalled: Option<ExtensionHandler>,
    enabled: Option<ExtensionHandler>,
    disabled: Option<ExtensionHandler>,
    ready: Option<ExtensionHandler>,
    private_browsing_changed: Option<ExtensionHandler>,
    new_tab: Option<NewTabHandler>,
    browser_action: Option<ActionHandler>,
    page_action: Option<ActionHandler>,
    toggle_popup: Option<TogglePopupHandler>,
    installation_failed: Option<FailureHandler>,
    install_prompt: Option<PromptHandler>,
    update_prompt: Option<PromptHandler>,
    optional_prompt: Option<PromptHandler>,
    extension_list_updated: Option<SignalHandler>,
    process_spawning_disabled: Option<SignalHandler>,
}

impl ExtensionObserver {
    /// Observer with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer with a name used in logs.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn on_installed(mut self, f: impl Fn(&Extension) + Send + Sync + 'static) -> Self {
        self.installed = Some(Arc::new(f));
        self
    }

    pub fn on_uninstalled(mut self, f: impl Fn(&Extension) + Send + Sync + 'static) -> Self {
        self.uninstalled = Some(Arc::new(f));
        self
    }

    pub fn on_enabled(mut self, f: impl Fn(&Extension) + Send + Sync + 'static) -> Self {
        self.enabled = Some(Arc::new(f));
        self
    }

    pub fn on_disabled(mut self, f: impl Fn(&Extension) + Send + Sync + 'static) -> Self {
        self.disabled = Some(Arc::new(f));
        self
    }

    pub fn on_ready(mut self, f: impl Fn(&Extension) + Send + Sync + 'static) -> Self {
        self.ready = Some(Arc::new(f));
        self
    }

    pub fn on_private_browsing_changed(
        mut self,
        f: impl Fn(&Extension) + Send + Sync + 'static,
    ) -> Self {
        self.private_browsing_changed = Some(Arc::new(f));
        self
    }

    pub fn on_new_tab(
        mut self,
        f: impl Fn(&Extension, &NewTabRequest) + Send + Sync + 'static,
    ) -> Self {
        self.new_tab = Some(Arc::new(f));
        self
    }

    pub fn on_browser_action(
        mut self,
        f: impl Fn(&Extension, &Action) + Send + Sync + 'static,
    ) -> Self {
        self.browser_action = Some(Arc::new(f));
        self
    }

    pub fn on_page_action(mut self, f: impl Fn(&Extension, &Action) + Send + Sync + 'static) -> Self {
        self.page_action = Some(Arc::new(f));
        self
    }

    /// Return the session the popup was displayed in, or `None`.
    pub fn on_toggle_popup(
        mut self,
        f: impl Fn(&Extension, &EngineSession, &Action) -> Option<EngineSession>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.toggle_popup = Some(Arc::new(f));
        self
    }

    pub fn on_installation_failed(
        mut self,
        f: impl Fn(&InstallationFailure) + Send + Sync + 'static,
    ) -> Self {
        self.installation_failed = Some(Arc::new(f));
        self
    }

    pub fn on_install_prompt(
        mut self,
        f: impl Fn(&PermissionRequest, DecisionResolver) + Send + Sync + 'static,
    ) -> Self {
        self.install_prompt = Some(Arc::new(f));
        self
    }

    pub fn on_update_prompt(
        mut self,
        f: impl Fn(&PermissionRequest, DecisionResolver) + Send + Sync + 'static,
    ) -> Self {
        self.update_prompt = Some(Arc::new(f));
        self
    }

    pub fn on_optional_prompt(
        mut self,
        f: impl Fn(&PermissionRequest, DecisionResolver) + Send + Sync + 'static,
    ) -> Self {
        self.optional_prompt = Some(Arc::new(f));
        self
    }

    pub fn on_extension_list_updated(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.extension_list_updated = Some(Arc::new(f));
        self
    }

    pub fn on_process_spawning_disabled(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.process_spawning_disabled = Some(Arc::new(f));
        self
    }

    fn prompt_handler(&self, kind: &RequestKind) -> Option<&PromptHandler> {
        match kind {
            RequestKind::Install { .. } => self.install_prompt.as_ref(),
            RequestKind::Update { .. } => self.update_prompt.as_ref(),
            RequestKind::Optional { .. } => self.optional_prompt.as_ref(),
        }
    }
}

impl std::fmt::Debug for ExtensionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionObserver")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Fans notifications out to registered observers and the event bus.
pub struct EventDispatcher {
    observers: RwLock<Vec<(ObserverId, Arc<ExtensionObserver>)>>,
    next_id: AtomicU64,
    bus: EventBus,
}

impl EventDispatcher {
    pub fn new(bus: EventBus) -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            bus,
        }
    }

    pub fn register(&self, observer: ExtensionObserver) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(observer = %observer.name, id = id.0, "Observer registered");
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        let removed = observers.len() != before;
        if removed {
            debug!(id = id.0, "Observer unregistered");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> EventBusReceiver {
        self.bus.subscribe()
    }

    /// Observers registered at this instant. The lock is released before
    /// any handler runs so handlers may (un)register observers.
    fn snapshot(&self) -> Vec<Arc<ExtensionObserver>> {
        self.observers.read().iter().map(|(_, o)| o.clone()).collect()
    }

    fn each<F>(&self, event: &'static str, mut call: F)
    where
        F: FnMut(&ExtensionObserver),
    {
        for observer in self.snapshot() {
            guarded(&observer, event, || call(&observer));
        }
    }

    pub fn installed(&self, extension: &Extension) {
        trace!(extension_id = %extension.id, "Delivering installed");
        self.each("installed", |o| {
            if let Some(h) = &o.installed {
                h(extension)
            }
        });
        self.bus.publish(ExtensionEvent::Installed {
            extension: extension.clone(),
        });
    }

    pub fn uninstalled(&self, extension: &Extension) {
        trace!(extension_id = %extension.id, "Delivering uninstalled");
        self.each("uninstalled", |o| {
            if let Some(h) = &o.uninstalled {
                h(extension)
            }
        });
        self.bus.publish(ExtensionEvent::Uninstalled {
            extension: extension.clone(),
        });
    }

    pub fn enabled(&self, extension: &Extension) {
        trace!(extension_id = %extension.id, "Delivering enabled");
        self.each("enabled", |o| {
            if let Some(h) = &o.enabled {
                h(extension)
            }
        });
        self.bus.publish(ExtensionEvent::Enabled {
            extension: extension.clone(),
        });
    }

    pub fn disabled(&self, extension: &Extension) {
        trace!(extension_id = %extension.id, "Delivering disabled");
        self.each("disabled", |o| {
            if let Some(h) = &o.disabled {
                h(extension)
            }
        });
        self.bus.publish(ExtensionEvent::Disabled {
            extension: extension.clone(),
        });
    }

    pub fn ready(&self, extension: &Extension) {
        trace!(extension_id = %extension.id, "Delivering ready");
        self.each("ready", |o| {
            if let Some(h) = &o.ready {
                h(extension)
            }
        });
        self.bus.publish(ExtensionEvent::Ready {
            extension: extension.clone(),
        });
    }

    pub fn private_browsing_changed(&self, extension: &Extension) {
        self.each("private_browsing_changed", |o| {
            if let Some(h) = &o.private_browsing_changed {
                h(extension)
            }
        });
        self.bus.publish(ExtensionEvent::PrivateBrowsingChanged {
            extension: extension.clone(),
        });
    }

    pub fn new_tab(&self, extension: &Extension, request: &NewTabRequest) {
        self.each("new_tab", |o| {
            if let Some(h) = &o.new_tab {
                h(extension, request)
            }
        });
        self.bus.publish(ExtensionEvent::NewTabRequested {
            extension: extension.clone(),
            session: request.session.clone(),
            active: request.active,
            url: request.url.clone(),
        });
    }

    /// Deliver browser-action-defined or page-action-defined by scope.
    pub fn action_defined(&self, extension: &Extension, action: &Action) {
        match action.scope {
            ActionScope::Browser => {
                self.each("browser_action", |o| {
                    if let Some(h) = &o.browser_action {
                        h(extension, action)
                    }
                });
                self.bus.publish(ExtensionEvent::BrowserActionDefined {
                    extension: extension.clone(),
                    action: action.clone(),
                });
            }
            ActionScope::Page => {
                self.each("page_action", |o| {
                    if let Some(h) = &o.page_action {
                        h(extension, action)
                    }
                });
                self.bus.publish(ExtensionEvent::PageActionDefined {
                    extension: extension.clone(),
                    action: action.clone(),
                });
            }
        }
    }

    /// Ask observers to toggle a popup. The first observer returning a
    /// session wins; the remaining observers are still notified.
    pub fn toggle_popup(
        &self,
        extension: &Extension,
        session: &EngineSession,
        action: &Action,
    ) -> Option<EngineSession> {
        let mut shown: Option<EngineSession> = None;
        self.each("toggle_popup", |o| {
            if let Some(h) = &o.toggle_popup {
                let result = h(extension, session, action);
                if shown.is_none() {
                    shown = result;
                }
            }
        });
        self.bus.publish(ExtensionEvent::PopupToggled {
            extension: extension.clone(),
            action: action.clone(),
            shown: shown.is_some(),
        });
        shown
    }

    pub fn installation_failed(&self, failure: &InstallationFailure) {
        self.each("installation_failed", |o| {
            if let Some(h) = &o.installation_failed {
                h(failure)
            }
        });
        self.bus.publish(ExtensionEvent::InstallationFailed {
            failure: failure.clone(),
        });
    }

    pub fn extension_list_updated(&self) {
        self.each("extension_list_updated", |o| {
            if let Some(h) = &o.extension_list_updated {
                h()
            }
        });
        self.bus.publish(ExtensionEvent::ExtensionListUpdated);
    }

    pub fn process_spawning_disabled(&self) {
        self.each("process_spawning_disabled", |o| {
            if let Some(h) = &o.process_spawning_disabled {
                h()
            }
        });
        self.bus.publish(ExtensionEvent::ProcessSpawningDisabled);
    }

    /// Hand a permission request to every observer with a matching prompt
    /// handler. Returns how many observers received it; zero means the
    /// request stays pending until the negotiator shuts down.
    pub fn prompt(&self, request: &PermissionRequest, resolver: &DecisionResolver) -> usize {
        let event = match request.kind {
            RequestKind::Install { .. } => "install_prompt",
            RequestKind::Update { .. } => "update_prompt",
            RequestKind::Optional { .. } => "optional_prompt",
        };

        let mut delivered = 0;
        self.each(event, |o| {
            if let Some(h) = o.prompt_handler(&request.kind) {
                delivered += 1;
                h(request, resolver.clone())
            }
        });

        if delivered == 0 {
            debug!(
                request_id = %request.id,
                extension_id = %request.extension_id(),
                event,
                "No observer handles this prompt, request stays pending"
            );
        }
        delivered
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(EventBus::default())
    }
}

/// Run one handler with panic isolation.
fn guarded<R>(observer: &ExtensionObserver, event: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => Some(result),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(observer = %observer.name, event, panic = %message, "Observer handler panicked");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn ext(id: &str) -> Extension {
        Extension::new(id, semver::Version::new(1, 0, 0))
    }

    #[test]
    fn test_empty_observer_is_noop() {
        let dispatcher = EventDispatcher::default();
        dispatcher.register(ExtensionObserver::new());
        dispatcher.installed(&ext("a"));
        dispatcher.extension_list_updated();
        let session = EngineSession::new(1u32);
        let action = Action::new(ActionScope::Browser).with_popup("p.html");
        assert!(dispatcher.toggle_popup(&ext("a"), &session, &action).is_none());
    }

    #[test]
    fn test_every_observer_receives_event() {
        let dispatcher = EventDispatcher::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let seen = seen.clone();
            dispatcher.register(
                ExtensionObserver::named(name).on_enabled(move |e| seen.lock().push((name, e.id.clone()))),
            );
        }

        dispatcher.enabled(&ext("a"));
        assert_eq!(
            *seen.lock(),
            vec![
                ("first", "a".to_string()),
                ("second", "a".to_string()),
                ("third", "a".to_string())
            ]
        );
    }

    #[test]
    fn test_panicking_observer_does_not_skip_others() {
        let dispatcher = EventDispatcher::default();
        let count = Arc::new(AtomicU64::new(0));

        dispatcher.register(ExtensionObserver::named("bad").on_ready(|_| panic!("boom")));
        let c = count.clone();
        dispatcher.register(ExtensionObserver::named("good").on_ready(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher.ready(&ext("a"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister() {
        let dispatcher = EventDispatcher::default();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let id = dispatcher.register(ExtensionObserver::new().on_disabled(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher.disabled(&ext("a"));
        assert!(dispatcher.unregister(id));
        assert!(!dispatcher.unregister(id));
        dispatcher.disabled(&ext("a"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.observer_count(), 0);
    }

    #[test]
    fn test_toggle_popup_first_session_wins() {
        let dispatcher = EventDispatcher::default();
        let first = EngineSession::new("popup-1");
        let second = EngineSession::new("popup-2");
        let notified = Arc::new(AtomicU64::new(0));

        dispatcher.register(ExtensionObserver::new().on_toggle_popup(|_, _, _| None));
        let f = first.clone();
        dispatcher.register(ExtensionObserver::new().on_toggle_popup(move |_, _, _| Some(f.clone())));
        let s = second.clone();
        let n = notified.clone();
        dispatcher.register(ExtensionObserver::new().on_toggle_popup(move |_, _, _| {
            n.fetch_add(1, Ordering::SeqCst);
            Some(s.clone())
        }));

        let action = Action::new(ActionScope::Page).with_popup("p.html");
        let shown = dispatcher.toggle_popup(&ext("a"), &EngineSession::new(()), &action);
        assert_eq!(shown, Some(first));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_action_defined_routes_by_scope() {
        let dispatcher = EventDispatcher::default();
        let browser = Arc::new(AtomicU64::new(0));
        let page = Arc::new(AtomicU64::new(0));
        let (b, p) = (browser.clone(), page.clone());
        dispatcher.register(
            ExtensionObserver::new()
                .on_browser_action(move |_, _| {
                    b.fetch_add(1, Ordering::SeqCst);
                })
                .on_page_action(move |_, _| {
                    p.fetch_add(1, Ordering::SeqCst);
                }),
        );

        dispatcher.action_defined(&ext("a"), &Action::new(ActionScope::Page));
        assert_eq!(browser.load(Ordering::SeqCst), 0);
        assert_eq!(page.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_events_mirrored_on_bus() {
        let dispatcher = EventDispatcher::default();
        let mut rx = dispatcher.subscribe();

        dispatcher.installed(&ext("a"));
        dispatcher.process_spawning_disabled();

        assert_eq!(rx.recv().await.unwrap().0.type_name(), "Installed");
        assert_eq!(rx.recv().await.unwrap().0.type_name(), "ProcessSpawningDisabled");
    }
}
