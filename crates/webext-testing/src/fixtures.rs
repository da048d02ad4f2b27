//! Extension and tab fixtures

use webext_core::{Extension, PermissionSet, QueryTab};

/// Version 1.0.0 extension requiring `permissions`.
pub fn extension(id: &str, permissions: &[&str]) -> Extension {
    Extension::new(id, semver::Version::new(1, 0, 0))
        .with_name(id)
        .with_required(PermissionSet::from_permissions(permissions.iter().copied()))
}

/// Extension at an explicit version, e.g. `"2.0.0"`.
pub fn versioned(id: &str, version: &str, permissions: &[&str]) -> anyhow::Result<Extension> {
    let version = semver::Version::parse(version)?;
    Ok(Extension::new(id, version)
        .with_name(id)
        .with_required(PermissionSet::from_permissions(permissions.iter().copied())))
}

/// Extension that also declares optional capabilities.
pub fn with_optional(id: &str, required: &[&str], optional: &[&str]) -> Extension {
    extension(id, required).with_optional(PermissionSet::from_permissions(optional.iter().copied()))
}

/// Two windows, one private tab, the first tab active.
pub fn sample_tabs() -> Vec<QueryTab> {
    vec![
        QueryTab::new(1, 1, "https://example.org/")
            .with_title("Example")
            .active(),
        QueryTab::new(2, 1, "https://news.example.org/")
            .with_title("News")
            .with_index(1),
        QueryTab::new(3, 2, "https://private.example.org/")
            .with_title("Private")
            .incognito(),
    ]
}
