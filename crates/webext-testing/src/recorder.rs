//! Recording observer
//!
//! Captures every notification it receives, in order, and answers
//! permission prompts according to a [`DecisionPolicy`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use webext_core::{DecisionResolver, EngineSession, ExtensionObserver, PermissionRequest};

/// How the recorder answers permission prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPolicy {
    AllowAll,
    DenyAll,
    /// Keep the resolver; the test resolves it via [`RecordingObserver::next_prompt`].
    Manual,
}

/// One observed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Installed { id: String, version: String },
    Uninstalled(String),
    Enabled(String),
    Disabled(String),
    Ready(String),
    PrivateBrowsingChanged { id: String, allowed: bool },
    NewTab { id: String, url: String, active: bool },
    BrowserAction { id: String, revision: u64 },
    PageAction { id: String, revision: u64 },
    TogglePopup(String),
    InstallationFailed(Option<String>),
    Prompt {
        kind: &'static str,
        id: String,
        permissions: Vec<String>,
    },
    ExtensionListUpdated,
    ProcessSpawningDisabled,
}

impl Record {
    /// Short name used in assertions over event order.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Installed { .. } => "installed",
            Self::Uninstalled(_) => "uninstalled",
            Self::Enabled(_) => "enabled",
            Self::Disabled(_) => "disabled",
            Self::Ready(_) => "ready",
            Self::PrivateBrowsingChanged { .. } => "private_browsing_changed",
            Self::NewTab { .. } => "new_tab",
            Self::BrowserAction { .. } => "browser_action",
            Self::PageAction { .. } => "page_action",
            Self::TogglePopup(_) => "toggle_popup",
            Self::InstallationFailed(_) => "installation_failed",
            Self::Prompt { kind, .. } => *kind,
            Self::ExtensionListUpdated => "extension_list_updated",
            Self::ProcessSpawningDisabled => "process_spawning_disabled",
        }
    }
}

struct Shared {
    policy: Mutex<DecisionPolicy>,
    records: Mutex<Vec<Record>>,
    prompts: Mutex<Vec<(PermissionRequest, DecisionResolver)>>,
    prompt_arrived: Notify,
}

fn push(shared: &Shared, record: Record) {
    shared.records.lock().push(record);
}

/// Observer that records what it sees.
///
/// Clones share the same record log.
#[derive(Clone)]
pub struct RecordingObserver {
    popup_session: Option<EngineSession>,
    shared: Arc<Shared>,
}

impl RecordingObserver {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self {
            popup_session: None,
            shared: Arc::new(Shared {
                policy: Mutex::new(policy),
                records: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
                prompt_arrived: Notify::new(),
            }),
        }
    }

    /// Change how later prompts are answered.
    pub fn set_policy(&self, policy: DecisionPolicy) {
        *self.shared.policy.lock() = policy;
    }

    /// Answer popup toggles by reporting the popup shown in `session`.
    pub fn with_popup_session(mut self, session: EngineSession) -> Self {
        self.popup_session = Some(session);
        self
    }

    /// Build the observer to register with a controller.
    pub fn observer(&self) -> ExtensionObserver {
        let s = self.shared.clone();
        let observer = ExtensionObserver::named("recorder").on_installed(move |e| {
            push(
                &s,
                Record::Installed {
                    id: e.id.clone(),
                    version: e.metadata.version.to_string(),
                },
            )
        });
        let s = self.shared.clone();
        let observer = observer.on_uninstalled(move |e| push(&s, Record::Uninstalled(e.id.clone())));
        let s = self.shared.clone();
        let observer = observer.on_enabled(move |e| push(&s, Record::Enabled(e.id.clone())));
        let s = self.shared.clone();
        let observer = observer.on_disabled(move |e| push(&s, Record::Disabled(e.id.clone())));
        let s = self.shared.clone();
        let observer = observer.on_ready(move |e| push(&s, Record::Ready(e.id.clone())));
        let s = self.shared.clone();
        let observer = observer.on_private_browsing_changed(move |e| {
            push(
                &s,
                Record::PrivateBrowsingChanged {
                    id: e.id.clone(),
                    allowed: e.private_browsing_allowed,
                },
            )
        });
        let s = self.shared.clone();
        let observer = observer.on_new_tab(move |e, request| {
            push(
                &s,
                Record::NewTab {
                    id: e.id.clone(),
                    url: request.url.clone(),
                    active: request.active,
                },
            )
        });
        let s = self.shared.clone();
        let observer = observer.on_browser_action(move |e, action| {
            push(
                &s,
                Record::BrowserAction {
                    id: e.id.clone(),
                    revision: action.revision,
                },
            )
        });
        let s = self.shared.clone();
        let observer = observer.on_page_action(move |e, action| {
            push(
                &s,
                Record::PageAction {
                    id: e.id.clone(),
                    revision: action.revision,
                },
            )
        });
        let s = self.shared.clone();
        let popup = self.popup_session.clone();
        let observer = observer.on_toggle_popup(move |e, _, _| {
            push(&s, Record::TogglePopup(e.id.clone()));
            popup.clone()
        });
        let s = self.shared.clone();
        let observer = observer.on_installation_failed(move |failure| {
            push(
                &s,
                Record::InstallationFailed(failure.extension.id().map(str::to_string)),
            )
        });
        let s = self.shared.clone();
        let observer = observer.on_extension_list_updated(move || push(&s, Record::ExtensionListUpdated));
        let s = self.shared.clone();
        let observer =
            observer.on_process_spawning_disabled(move || push(&s, Record::ProcessSpawningDisabled));

        observer
            .on_install_prompt(self.prompt_handler())
            .on_update_prompt(self.prompt_handler())
            .on_optional_prompt(self.prompt_handler())
    }

    fn prompt_handler(&self) -> impl Fn(&PermissionRequest, DecisionResolver) + Send + Sync + 'static {
        let shared = self.shared.clone();
        move |request: &PermissionRequest, resolver: DecisionResolver| {
            shared.records.lock().push(Record::Prompt {
                kind: match request.kind.name() {
                    "install" => "install_prompt",
                    "update" => "update_prompt",
                    _ => "optional_prompt",
                },
                id: request.extension_id().to_string(),
                permissions: request.requested.permissions().to_vec(),
            });
            let policy = *shared.policy.lock();
            match policy {
                DecisionPolicy::AllowAll => {
                    resolver.allow();
                }
                DecisionPolicy::DenyAll => {
                    resolver.deny();
                }
                DecisionPolicy::Manual => {
                    shared.prompts.lock().push((request.clone(), resolver));
                    shared.prompt_arrived.notify_one();
                }
            }
        }
    }

    /// Everything recorded so far.
    pub fn records(&self) -> Vec<Record> {
        self.shared.records.lock().clone()
    }

    /// Record names in delivery order.
    pub fn names(&self) -> Vec<&'static str> {
        self.shared.records.lock().iter().map(Record::name).collect()
    }

    /// Records concerning one extension.
    pub fn records_for(&self, id: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| match r {
                Record::Installed { id: rid, .. }
                | Record::PrivateBrowsingChanged { id: rid, .. }
                | Record::NewTab { id: rid, .. }
                | Record::BrowserAction { id: rid, .. }
                | Record::PageAction { id: rid, .. }
                | Record::Prompt { id: rid, .. } => rid == id,
                Record::Uninstalled(rid)
                | Record::Enabled(rid)
                | Record::Disabled(rid)
                | Record::Ready(rid)
                | Record::TogglePopup(rid) => rid == id,
                Record::InstallationFailed(rid) => rid.as_deref() == Some(id),
                Record::ExtensionListUpdated | Record::ProcessSpawningDisabled => false,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.shared.records.lock().clear();
    }

    /// Wait for the next captured prompt under [`DecisionPolicy::Manual`].
    pub async fn next_prompt(
        &self,
        timeout: Duration,
    ) -> anyhow::Result<(PermissionRequest, DecisionResolver)> {
        let wait = async {
            loop {
                let notified = self.shared.prompt_arrived.notified();
                {
                    let mut prompts = self.shared.prompts.lock();
                    if !prompts.is_empty() {
                        return prompts.remove(0);
                    }
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| anyhow::anyhow!("no permission prompt within {:?}", timeout))
    }

    /// Prompts captured but not yet taken.
    pub fn captured_prompts(&self) -> usize {
        self.shared.prompts.lock().len()
    }
}
