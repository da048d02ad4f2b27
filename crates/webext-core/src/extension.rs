//! Extension identity and metadata.
//!
//! An [`Extension`] is a snapshot: the engine owns the real extension and
//! the controller keeps a mirror that only changes in response to a
//! resolved permission decision or a completed lifecycle event. Observers
//! always receive a copy taken for the duration of one event.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable extension identifier (e.g. `"ext-1"` or `"addon@example.com"`).
pub type ExtensionId = String;

// ============================================================================
// Permission Set
// ============================================================================

/// Ordered set of capability strings and host-origin patterns.
///
/// Order is first-seen; duplicates are dropped on construction because
/// they carry no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPermissionSet")]
pub struct PermissionSet {
    permissions: Vec<String>,
    origins: Vec<String>,
}

#[derive(Deserialize)]
struct RawPermissionSet {
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    origins: Vec<String>,
}

impl From<RawPermissionSet> for PermissionSet {
    fn from(raw: RawPermissionSet) -> Self {
        Self::new(raw.permissions, raw.origins)
    }
}

impl PermissionSet {
    /// Build a set from capabilities and origins.
    pub fn new<P, O>(permissions: P, origins: O) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            permissions: dedup(permissions),
            origins: dedup(origins),
        }
    }

    /// Build a set of capabilities only.
    pub fn from_permissions<P>(permissions: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self::new(permissions, Vec::<String>::new())
    }

    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty() && self.origins.is_empty()
    }

    /// Total number of capabilities and origins.
    pub fn len(&self) -> usize {
        self.permissions.len() + self.origins.len()
    }

    pub fn contains_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn contains_origin(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    /// Entries of `self` that are not in `other`, in `self`'s order.
    pub fn difference(&self, other: &PermissionSet) -> PermissionSet {
        PermissionSet {
            permissions: self
                .permissions
                .iter()
                .filter(|p| !other.contains_permission(p))
                .cloned()
                .collect(),
            origins: self
                .origins
                .iter()
                .filter(|o| !other.contains_origin(o))
                .cloned()
                .collect(),
        }
    }

    /// `self` followed by whatever `other` adds.
    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        let added = other.difference(self);
        PermissionSet {
            permissions: self
                .permissions
                .iter()
                .chain(added.permissions.iter())
                .cloned()
                .collect(),
            origins: self.origins.iter().chain(added.origins.iter()).cloned().collect(),
        }
    }

    /// Entries of `self` that also appear in `other`, in `self`'s order.
    pub fn intersection(&self, other: &PermissionSet) -> PermissionSet {
        PermissionSet {
            permissions: self
                .permissions
                .iter()
                .filter(|p| other.contains_permission(p))
                .cloned()
                .collect(),
            origins: self
                .origins
                .iter()
                .filter(|o| other.contains_origin(o))
                .cloned()
                .collect(),
        }
    }

    /// True when every entry of `self` also appears in `other`.
    pub fn is_subset(&self, other: &PermissionSet) -> bool {
        self.difference(other).is_empty()
    }
}

fn dedup<I>(items: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.into();
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle flag of an extension as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Not materialized yet (install or update candidate).
    #[default]
    Candidate,
    Installed,
    Enabled,
    Disabled,
    Ready,
}

impl LifecycleState {
    /// Whether the extension is installed in any form.
    pub fn is_installed(&self) -> bool {
        !matches!(self, Self::Candidate)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Candidate => write!(f, "Candidate"),
            Self::Installed => write!(f, "Installed"),
            Self::Enabled => write!(f, "Enabled"),
            Self::Disabled => write!(f, "Disabled"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// Who enabled or disabled an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnableSource {
    /// The user toggled it.
    User,
    /// The host application toggled it.
    App,
}

// ============================================================================
// Extension
// ============================================================================

/// Descriptive metadata shown in prompts and management UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    /// Display name
    pub name: String,
    /// Extension version
    pub version: semver::Version,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage_url: Option<String>,
}

/// Snapshot of an installed or candidate extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub id: ExtensionId,
    pub metadata: ExtensionMetadata,
    /// Permissions required at install time.
    pub required: PermissionSet,
    /// Permissions the extension may request at runtime.
    pub optional: PermissionSet,
    /// Optional permissions the host has granted so far.
    #[serde(default)]
    pub granted_optional: PermissionSet,
    #[serde(default)]
    pub state: LifecycleState,
    /// Non-empty exactly when the extension is disabled.
    #[serde(default)]
    pub disabled_by: Vec<EnableSource>,
    #[serde(default)]
    pub private_browsing_allowed: bool,
    /// Shipped with the host rather than installed by the user.
    #[serde(default)]
    pub builtin: bool,
}

impl Extension {
    /// Create a candidate with no permissions.
    pub fn new(id: impl Into<ExtensionId>, version: semver::Version) -> Self {
        let id = id.into();
        Self {
            metadata: ExtensionMetadata {
                name: id.clone(),
                version,
                description: None,
                creator: None,
                homepage_url: None,
            },
            id,
            required: PermissionSet::default(),
            optional: PermissionSet::default(),
            granted_optional: PermissionSet::default(),
            state: LifecycleState::Candidate,
            disabled_by: Vec::new(),
            private_browsing_allowed: false,
            builtin: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn with_required(mut self, required: PermissionSet) -> Self {
        self.required = required;
        self
    }

    pub fn with_optional(mut self, optional: PermissionSet) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_private_browsing(mut self, allowed: bool) -> Self {
        self.private_browsing_allowed = allowed;
        self
    }

    pub fn as_builtin(mut self) -> Self {
        self.builtin = true;
        self
    }

    /// Ordered capability strings currently held: required first, then
    /// granted optional ones.
    pub fn permission_set(&self) -> Vec<String> {
        self.effective_permissions().permissions().to_vec()
    }

    /// Required plus granted optional permissions.
    pub fn effective_permissions(&self) -> PermissionSet {
        self.required.union(&self.granted_optional)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::Installed | LifecycleState::Enabled | LifecycleState::Ready
        )
    }
}

// ============================================================================
// Installation Failure
// ============================================================================

/// Extension reference in a failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "extension")]
pub enum ExtensionRef {
    /// The candidate was materialized far enough to describe it.
    Known(Extension),
    /// The failure happened before any metadata was available.
    Unknown,
}

impl ExtensionRef {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Known(ext) => Some(&ext.id),
            Self::Unknown => None,
        }
    }

    pub fn as_known(&self) -> Option<&Extension> {
        match self {
            Self::Known(ext) => Some(ext),
            Self::Unknown => None,
        }
    }
}

impl From<Option<Extension>> for ExtensionRef {
    fn from(ext: Option<Extension>) -> Self {
        ext.map(Self::Known).unwrap_or(Self::Unknown)
    }
}

/// Why an install attempt failed, independent of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    #[error("network failure while downloading")]
    NetworkFailure,
    #[error("package is corrupt or could not be parsed")]
    CorruptFile,
    #[error("package hash does not match")]
    IncorrectHash,
    #[error("package file could not be accessed")]
    FileAccess,
    #[error("package is not signed")]
    SignatureRequired,
    #[error("extension is blocklisted")]
    Blocklisted,
    #[error("extension is incompatible with this engine")]
    Incompatible,
    #[error("unsupported extension type")]
    UnsupportedType,
    #[error("extension id does not match the expected id")]
    IncorrectId,
    #[error("only administrators may install this extension")]
    AdminInstallOnly,
    #[error("rejected by the runtime: {0}")]
    RuntimeRejected(String),
}

/// Coarse failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Download,
    Parse,
    Runtime,
}

impl FailureReason {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::NetworkFailure | Self::IncorrectHash | Self::FileAccess => {
                FailureCategory::Download
            }
            Self::CorruptFile | Self::UnsupportedType | Self::IncorrectId => FailureCategory::Parse,
            Self::SignatureRequired
            | Self::Blocklisted
            | Self::Incompatible
            | Self::AdminInstallOnly
            | Self::RuntimeRejected(_) => FailureCategory::Runtime,
        }
    }
}

/// A failed install attempt. Constructed once per attempt and never
/// retried by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationFailure {
    pub extension: ExtensionRef,
    pub reason: FailureReason,
}

impl InstallationFailure {
    pub fn new(extension: impl Into<ExtensionRef>, reason: FailureReason) -> Self {
        Self {
            extension: extension.into(),
            reason,
        }
    }
}

impl From<Extension> for ExtensionRef {
    fn from(ext: Extension) -> Self {
        Self::Known(ext)
    }
}
