//! In-memory tab host
//!
//! A [`TabDelegate`] backed by a vector of tabs, for exercising the tab
//! bridge without a real window manager.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use webext_core::{ExtensionError, QueryTab, TabDelegate, TabId};

/// Tab host holding its tabs in memory.
#[derive(Default)]
pub struct InMemoryTabHost {
    tabs: RwLock<Vec<QueryTab>>,
    failing: AtomicBool,
}

impl InMemoryTabHost {
    /// Create an empty host
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host with the given tabs
    pub fn with_tabs(tabs: Vec<QueryTab>) -> Self {
        Self {
            tabs: RwLock::new(tabs),
            failing: AtomicBool::new(false),
        }
    }

    pub async fn add_tab(&self, tab: QueryTab) {
        self.tabs.write().await.push(tab);
    }

    pub async fn tab_count(&self) -> usize {
        self.tabs.read().await.len()
    }

    pub async fn contains(&self, id: TabId) -> bool {
        self.tabs.read().await.iter().any(|t| t.id == id)
    }

    /// Make every call fail, as if the window manager went away.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> webext_core::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExtensionError::Tab("tab host unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TabDelegate for InMemoryTabHost {
    async fn query_tabs(&self) -> webext_core::Result<Vec<QueryTab>> {
        self.check()?;
        Ok(self.tabs.read().await.clone())
    }

    async fn close_tab(&self, id: TabId) -> webext_core::Result<bool> {
        self.check()?;
        let mut tabs = self.tabs.write().await;
        let before = tabs.len();
        tabs.retain(|t| t.id != id);
        let closed = tabs.len() != before;
        if closed {
            tracing::debug!(tab_id = id, "Tab closed");
        }
        Ok(closed)
    }
}
