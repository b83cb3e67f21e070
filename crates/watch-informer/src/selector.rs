//! Watch selectors and session keys.

use std::fmt;

/// Identifies what a session watches: a resource type within a group and
/// version, optionally restricted to one namespace.
///
/// An empty namespace means all namespaces. An empty group is the core API
/// group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchSelector {
    group: String,
    version: String,
    resource: String,
    namespace: String,
}

impl WatchSelector {
    /// Build a selector from raw request fields.
    ///
    /// The resource name is trimmed and lower-cased and any leading `/` is
    /// stripped from the group. The resource name is not pluralized here; that is the
    /// resolver's job.
    pub fn normalized(
        group: impl AsRef<str>,
        version: impl AsRef<str>,
        resource: impl AsRef<str>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            group: group.as_ref().trim_start_matches('/').to_string(),
            version: version.as_ref().trim().to_string(),
            resource: resource.as_ref().trim().to_lowercase(),
            namespace: namespace.into(),
        }
    }

    /// Replace the resource name with the authoritative plural name.
    pub fn with_resource(self, resource: impl AsRef<str>) -> Self {
        Self {
            resource: resource.as_ref().to_lowercase(),
            ..self
        }
    }

    /// The API group, empty for the core group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The API version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The lower-case resource name.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The namespace, empty for all namespaces.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether the selector spans all namespaces.
    pub fn is_cluster_wide(&self) -> bool {
        self.namespace.is_empty()
    }

    /// The key this selector is registered and logged under.
    pub fn session_key(&self) -> SessionKey {
        SessionKey::from(self)
    }
}

/// Mechanical pluralization used when discovery is unavailable: append `s`
/// unless the name already ends in one. An empty name stays empty.
pub fn pluralize(resource: &str) -> String {
    let resource = resource.to_lowercase();
    if resource.is_empty() || resource.ends_with('s') {
        resource
    } else {
        format!("{resource}s")
    }
}

/// Human-readable key for a session.
///
/// Two sessions with identical selectors share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&WatchSelector> for SessionKey {
    fn from(selector: &WatchSelector) -> Self {
        let group = if selector.group.is_empty() {
            "''"
        } else {
            &selector.group
        };
        let namespace = if selector.namespace.is_empty() {
            "*"
        } else {
            &selector.namespace
        };
        Self(format!(
            "Group: {group}, Version: {}, Resource: {}, Namespace: {namespace}",
            selector.version, selector.resource
        ))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
