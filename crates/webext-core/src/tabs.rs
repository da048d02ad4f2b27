//! Tab bridge: lets extensions enumerate and close host tabs.
//!
//! The host plugs in a [`TabDelegate`]. Without one, queries return no
//! tabs and closes report failure. Delegate errors never reach the
//! extension; they are logged and reported the same way as "nothing
//! there".

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Host tab identifier.
pub type TabId = u64;

/// Point-in-time projection of a host tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTab {
    pub id: TabId,
    pub window_id: u64,
    /// Position within its window.
    pub index: usize,
    pub active: bool,
    pub highlighted: bool,
    /// Tab is requesting the user's attention (e.g. a modal prompt).
    pub attention: bool,
    pub audible: bool,
    pub muted: bool,
    /// Private browsing tab.
    pub incognito: bool,
    pub last_accessed: DateTime<Utc>,
    /// Page is reader-mode compatible.
    pub is_article: bool,
    pub is_in_reader_mode: bool,
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
}

impl QueryTab {
    /// Inactive, silent, non-private tab accessed now.
    pub fn new(id: TabId, window_id: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            window_id,
            index: 0,
            active: false,
            highlighted: false,
            attention: false,
            audible: false,
            muted: false,
            incognito: false,
            last_accessed: Utc::now(),
            is_article: false,
            is_in_reader_mode: false,
            url: url.into(),
            title: String::new(),
            fav_icon_url: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn active(mut self) -> Self {
        self.active = true;
        self.highlighted = true;
        self
    }

    pub fn incognito(mut self) -> Self {
        self.incognito = true;
        self
    }
}

/// Host implementation of tab enumeration and closing.
///
/// Both methods default to the "not implemented" answers.
#[async_trait]
pub trait TabDelegate: Send + Sync {
    /// Snapshot of the host's tabs.
    async fn query_tabs(&self) -> Result<Vec<QueryTab>> {
        Ok(Vec::new())
    }

    /// Close a tab. `Ok(false)` when the tab does not exist.
    async fn close_tab(&self, _id: TabId) -> Result<bool> {
        Ok(false)
    }
}

/// Wraps the optional host delegate.
#[derive(Default)]
pub struct TabBridge {
    delegate: RwLock<Option<Arc<dyn TabDelegate>>>,
}

impl TabBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_delegate(&self, delegate: Arc<dyn TabDelegate>) {
        *self.delegate.write() = Some(delegate);
    }

    pub fn clear_delegate(&self) {
        self.delegate.write().take();
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.read().is_some()
    }

    fn current(&self) -> Option<Arc<dyn TabDelegate>> {
        self.delegate.read().clone()
    }

    /// All host tabs right now. Empty without a delegate or on error.
    pub async fn query_tabs(&self) -> Vec<QueryTab> {
        let Some(delegate) = self.current() else {
            return Vec::new();
        };
        match delegate.query_tabs().await {
            Ok(tabs) => {
                debug!(count = tabs.len(), "Tabs queried");
                tabs
            }
            Err(e) => {
                warn!(error = %e, "Tab query failed");
                Vec::new()
            }
        }
    }

    /// Close a tab. `false` without a delegate, for unknown or already
    /// closed tabs, and on delegate error.
    pub async fn close_tab(&self, id: TabId) -> bool {
        let Some(delegate) = self.current() else {
            return false;
        };
        match delegate.close_tab(id).await {
            Ok(closed) => {
                debug!(tab_id = id, closed, "Tab close requested");
                closed
            }
            Err(e) => {
                warn!(tab_id = id, error = %e, "Tab close failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtensionError;

    struct Unimplemented;

    #[async_trait]
    impl TabDelegate for Unimplemented {}

    struct Failing;

    #[async_trait]
    impl TabDelegate for Failing {
        async fn query_tabs(&self) -> Result<Vec<QueryTab>> {
            Err(ExtensionError::Tab("window manager gone".into()))
        }

        async fn close_tab(&self, _id: TabId) -> Result<bool> {
            Err(ExtensionError::Tab("window manager gone".into()))
        }
    }

    #[tokio::test]
    async fn test_no_delegate() {
        let bridge = TabBridge::new();
        assert!(bridge.query_tabs().await.is_empty());
        assert!(!bridge.close_tab(1).await);
    }

    #[tokio::test]
    async fn test_default_methods() {
        let bridge = TabBridge::new();
        bridge.set_delegate(Arc::new(Unimplemented));
        assert!(bridge.has_delegate());
        assert!(bridge.query_tabs().await.is_empty());
        assert!(!bridge.close_tab(1).await);
    }

    #[tokio::test]
    async fn test_errors_are_not_raised() {
        let bridge = TabBridge::new();
        bridge.set_delegate(Arc::new(Failing));
        assert!(bridge.query_tabs().await.is_empty());
        assert!(!bridge.close_tab(7).await);

        bridge.clear_delegate();
        assert!(!bridge.has_delegate());
    }

    #[test]
    fn test_query_tab_serializes_camel_case() {
        let tab = QueryTab::new(3, 1, "https://example.org").active();
        let json = serde_json::to_value(&tab).unwrap();
        assert_eq!(json["windowId"], 1);
        assert_eq!(json["isInReaderMode"], false);
        assert_eq!(json["highlighted"], true);
        assert!(json.get("favIconUrl").is_none());
    }
}
