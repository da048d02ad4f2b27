//! Browser and page action registry.
//!
//! Each extension has at most one browser action and one page action.
//! A declaration replaces the previous one wholesale and receives a new
//! revision; toggle requests name the revision they were issued against
//! so a redeclared or removed action resolves to "no popup" instead of
//! acting on stale data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extension::ExtensionId;

/// Where an action lives in the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionScope {
    /// Toolbar button shown for every page.
    Browser,
    /// Button tied to the current page.
    Page,
}

impl std::fmt::Display for ActionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Browser => write!(f, "browser"),
            Self::Page => write!(f, "page"),
        }
    }
}

/// Popup shown when the action is clicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupDescriptor {
    /// Extension-relative or absolute popup URL.
    pub url: String,
}

/// UI action declared by an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Owning extension. Set by the registry on declaration.
    pub extension_id: ExtensionId,
    pub scope: ActionScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_text: Option<String>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popup: Option<PopupDescriptor>,
    /// Assigned by the registry; `0` until declared.
    #[serde(default)]
    pub revision: u64,
}

impl Action {
    pub fn new(scope: ActionScope) -> Self {
        Self {
            extension_id: ExtensionId::new(),
            scope,
            title: None,
            badge_text: None,
            enabled: true,
            popup: None,
            revision: 0,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_badge(mut self, text: impl Into<String>) -> Self {
        self.badge_text = Some(text.into());
        self
    }

    pub fn with_popup(mut self, url: impl Into<String>) -> Self {
        self.popup = Some(PopupDescriptor { url: url.into() });
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Last-write-wins store of declared actions.
pub struct ActionRegistry {
    actions: RwLock<HashMap<(ExtensionId, ActionScope), Action>>,
    next_revision: AtomicU64,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: RwLock::new(HashMap::new()),
            next_revision: AtomicU64::new(1),
        }
    }

    /// Store a declaration, replacing any previous one for the same
    /// extension and scope. Returns the stored action with its revision.
    pub fn define(&self, extension_id: &str, mut action: Action) -> Action {
        action.extension_id = extension_id.to_string();
        let previous = {
            // Revisions must follow insertion order, so take one under the lock.
            let mut actions = self.actions.write();
            action.revision = self.next_revision.fetch_add(1, Ordering::Relaxed);
            actions.insert((action.extension_id.clone(), action.scope), action.clone())
        };

        debug!(
            extension_id,
            scope = %action.scope,
            revision = action.revision,
            replaced = previous.is_some(),
            "Action declared"
        );
        action
    }

    /// Current declaration, if any.
    pub fn get(&self, extension_id: &str, scope: ActionScope) -> Option<Action> {
        self.actions
            .read()
            .get(&(extension_id.to_string(), scope))
            .cloned()
    }

    /// Remove one declaration.
    pub fn remove(&self, extension_id: &str, scope: ActionScope) -> Option<Action> {
        self.actions.write().remove(&(extension_id.to_string(), scope))
    }

    /// Remove every declaration of an extension. Returns how many were removed.
    pub fn remove_extension(&self, extension_id: &str) -> usize {
        let mut actions = self.actions.write();
        let before = actions.len();
        actions.retain(|(id, _), _| id != extension_id);
        before - actions.len()
    }

    /// Resolve a popup toggle against the current declaration.
    ///
    /// Returns the action only when it still exists at `revision` and has
    /// a popup. Anything else means nothing should be displayed.
    pub fn resolve_toggle(
        &self,
        extension_id: &str,
        scope: ActionScope,
        revision: u64,
    ) -> Option<Action> {
        let Some(current) = self.get(extension_id, scope) else {
            debug!(extension_id, %scope, "Toggle for undeclared action");
            return None;
        };

        if current.revision != revision {
            debug!(
                extension_id,
                %scope,
                requested = revision,
                current = current.revision,
                "Toggle for stale action revision"
            );
            return None;
        }

        if current.popup.is_none() {
            debug!(extension_id, %scope, "Toggle for action without popup");
            return None;
        }

        Some(current)
    }

    /// All declarations of an extension, browser action first.
    pub fn actions_for(&self, extension_id: &str) -> Vec<Action> {
        [ActionScope::Browser, ActionScope::Page]
            .into_iter()
            .filter_map(|scope| self.get(extension_id, scope))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.actions.read().len()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
