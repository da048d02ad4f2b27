//! In-memory mirror of the extensions the engine has installed.
//!
//! Only the controller writes to it, and only after a permission decision
//! resolved or a lifecycle event completed. Readers always get clones.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::extension::{Extension, ExtensionId};

#[derive(Default)]
pub struct ExtensionStore {
    extensions: RwLock<HashMap<ExtensionId, Extension>>,
}

impl ExtensionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Extension> {
        self.extensions.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.extensions.read().contains_key(id)
    }

    /// All extensions, sorted by id for stable output.
    pub fn list(&self) -> Vec<Extension> {
        let mut list: Vec<Extension> = self.extensions.read().values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn count(&self) -> usize {
        self.extensions.read().len()
    }

    /// Insert only if absent. Returns `false` when the id is taken.
    pub(crate) fn insert_new(&self, extension: Extension) -> bool {
        let mut extensions = self.extensions.write();
        if extensions.contains_key(&extension.id) {
            return false;
        }
        extensions.insert(extension.id.clone(), extension);
        true
    }

    pub(crate) fn remove(&self, id: &str) -> Option<Extension> {
        self.extensions.write().remove(id)
    }

    /// Mutate in place and return the new snapshot. `None` if unknown.
    pub(crate) fn update<F>(&self, id: &str, f: F) -> Option<Extension>
    where
        F: FnOnce(&mut Extension),
    {
        let mut extensions = self.extensions.write();
        let extension = extensions.get_mut(id)?;
        f(extension);
        Some(extension.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::LifecycleState;

    fn ext(id: &str) -> Extension {
        Extension::new(id, semver::Version::new(1, 0, 0))
    }

    #[test]
    fn test_insert_get_remove() {
        let store = ExtensionStore::new();
        assert!(store.insert_new(ext("b")));
        assert!(store.insert_new(ext("a")));
        assert!(!store.insert_new(ext("a")));
        assert!(store.insert_new(ext("c")));

        assert_eq!(store.count(), 3);
        let ids: Vec<String> = store.list().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        assert!(store.remove("a").is_some());
        assert!(!store.contains("a"));
    }

    #[test]
    fn test_update_returns_snapshot() {
        let store = ExtensionStore::new();
        store.insert_new(ext("a"));

        let updated = store
            .update("a", |e| e.state = LifecycleState::Disabled)
            .unwrap();
        assert_eq!(updated.state, LifecycleState::Disabled);
        assert_eq!(store.get("a").unwrap().state, LifecycleState::Disabled);
        assert!(store.update("missing", |_| {}).is_none());
    }
}
