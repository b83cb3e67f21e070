//! Resource name resolution against cluster discovery.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kube::Client;
use thiserror::Error;

use crate::selector::pluralize;

/// Errors from resolving a resource name.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No resource in the group/version matches the name
    #[error("resource not found: {0}")]
    NotFound(String),
    /// The discovery endpoint could not be queried
    #[error("failed to fetch resource list for {group_version}: {source}")]
    Discovery {
        /// The `group/version` that was queried
        group_version: String,
        /// The underlying client error
        #[source]
        source: kube::Error,
    },
}

/// Maps a user-supplied resource name to the authoritative plural name.
///
/// Implementations match singular or plural names case-insensitively.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// Resolve `name` within `group`/`version`.
    async fn resolve(&self, group: &str, version: &str, name: &str)
    -> Result<String, ResolveError>;
}

/// Format a group and version the way the discovery API expects.
pub fn group_version(group: &str, version: &str) -> String {
    if group.is_empty() {
        version.to_string()
    } else {
        format!("{group}/{version}")
    }
}

/// Resolves names through the cluster's discovery endpoints.
#[derive(Clone)]
pub struct DiscoveryResolver {
    client: Client,
}

impl std::fmt::Debug for DiscoveryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryResolver").finish_non_exhaustive()
    }
}

impl DiscoveryResolver {
    /// Create a resolver backed by `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceResolver for DiscoveryResolver {
    async fn resolve(
        &self,
        group: &str,
        version: &str,
        name: &str,
    ) -> Result<String, ResolveError> {
        let gv = group_version(group, version);
        let list = if group.is_empty() {
            self.client.list_core_api_resources(version).await
        } else {
            self.client.list_api_group_resources(&gv).await
        }
        .map_err(|source| ResolveError::Discovery {
            group_version: gv.clone(),
            source,
        })?;

        tracing::debug!(
            "Discovered {} resources for {}",
            list.resources.len(),
            gv
        );
        match_resource(&list, name).ok_or_else(|| ResolveError::NotFound(name.to_string()))
    }
}

/// Find the plural name of the resource in `list` that `name` refers to.
///
/// Subresources (`pods/log`) never match. When the server reports no
/// singular name the lower-cased kind stands in for it.
fn match_resource(list: &APIResourceList, name: &str) -> Option<String> {
    let name = name.to_lowercase();
    list.resources
        .iter()
        .filter(|r| !r.name.contains('/'))
        .find(|r| names_of(r).any(|candidate| candidate == name))
        .map(|r| r.name.clone())
}

fn names_of(resource: &APIResource) -> impl Iterator<Item = String> + '_ {
    let singular = if resource.singular_name.is_empty() {
        resource.kind.to_lowercase()
    } else {
        resource.singular_name.to_lowercase()
    };
    [resource.name.to_lowercase(), singular].into_iter()
}

/// Resolves names by mechanical pluralization, without contacting the
/// cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicResolver;

#[async_trait]
impl ResourceResolver for HeuristicResolver {
    async fn resolve(
        &self,
        _group: &str,
        _version: &str,
        name: &str,
    ) -> Result<String, ResolveError> {
        if name.is_empty() {
            return Err(ResolveError::NotFound(name.to_string()));
        }
        Ok(pluralize(name))
    }
}
