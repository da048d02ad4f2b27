//! Host-side delegation layer for a web-extension engine.
//!
//! The engine raises lifecycle, permission and UI events; this crate
//! negotiates permissions with the host, fans notifications out to
//! registered observers and bridges tab queries back to the host.

pub mod action;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod eventbus;
pub mod extension;
pub mod logging;
pub mod permission;
pub mod session;
pub mod store;
pub mod tabs;

pub use action::{Action, ActionRegistry, ActionScope, PopupDescriptor};
pub use config::{ControllerConfig, NegotiatorConfig};
pub use controller::{EngineEvent, EventOutcome, ExtensionController};
pub use dispatcher::{EventDispatcher, ExtensionObserver, NewTabRequest, ObserverId};
pub use error::{ExtensionError, Result};
pub use eventbus::{
    EventBus, EventBusReceiver, EventMetadata, ExtensionEvent, FilterBuilder, FilteredReceiver,
};
pub use extension::{
    EnableSource, Extension, ExtensionId, ExtensionMetadata, ExtensionRef, FailureCategory,
    FailureReason, InstallationFailure, LifecycleState, PermissionSet,
};
pub use permission::{
    Decision, DecisionResolver, Negotiation, PendingDecision, PermissionNegotiator,
    PermissionRequest, RequestId, RequestKind,
};
pub use session::EngineSession;
pub use store::ExtensionStore;
pub use tabs::{QueryTab, TabBridge, TabDelegate, TabId};

/// Re-exports commonly used types.
pub mod prelude {
    // Configuration
    pub use crate::config::{defaults, env_vars, ControllerConfig, NegotiatorConfig};

    // Error handling
    pub use crate::error::{ExtensionError, Result};

    // Extensions
    pub use crate::extension::{
        EnableSource, Extension, ExtensionRef, FailureReason, InstallationFailure,
        LifecycleState, PermissionSet,
    };

    // Controller and observers
    pub use crate::controller::{EngineEvent, EventOutcome, ExtensionController};
    pub use crate::dispatcher::{ExtensionObserver, NewTabRequest, ObserverId};
    pub use crate::permission::{Decision, DecisionResolver, PermissionRequest, RequestKind};

    // UI
    pub use crate::action::{Action, ActionScope};
    pub use crate::session::EngineSession;
    pub use crate::tabs::{QueryTab, TabDelegate, TabId};

    // Event bus
    pub use crate::eventbus::{EventBus, ExtensionEvent};
}
