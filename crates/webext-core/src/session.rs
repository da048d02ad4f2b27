//! Opaque engine session handle.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Handle to a browsing context owned by the host's session subsystem.
///
/// The core only threads it through events ("open a tab using this
/// session", "display this popup in that session"). Cloning is cheap and
/// two handles compare equal only when they wrap the same session object.
#[derive(Clone)]
pub struct EngineSession {
    inner: Arc<dyn Any + Send + Sync>,
}

impl EngineSession {
    /// Wrap a host session object.
    pub fn new<T: Any + Send + Sync>(session: T) -> Self {
        Self {
            inner: Arc::new(session),
        }
    }

    /// Wrap an already shared host session object without re-allocating.
    pub fn from_arc<T: Any + Send + Sync>(session: Arc<T>) -> Self {
        Self { inner: session }
    }

    /// Recover the host type. Returns `None` for a different type.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Identity comparison.
    pub fn same_as(&self, other: &EngineSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for EngineSession {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for EngineSession {}

impl fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineSession({:p})", Arc::as_ptr(&self.inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct HostSession {
        id: u32,
    }

    #[test]
    fn test_identity_equality() {
        let a = EngineSession::new(HostSession { id: 1 });
        let b = EngineSession::new(HostSession { id: 1 });
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_downcast() {
        let session = EngineSession::new(HostSession { id: 7 });
        assert_eq!(session.downcast_ref::<HostSession>(), Some(&HostSession { id: 7 }));
        assert!(session.downcast_ref::<String>().is_none());
    }
}
