//! Shared Kubernetes helpers for apiVersion/kind handling
//!
//! Workloads arrive as arbitrary resources, so their group/version/kind has
//! to be recovered from the serialized `apiVersion`/`kind` fields rather than
//! from a compile-time type.

use kube::api::GroupVersionKind;

/// Parse an apiVersion string into (group, version)
///
/// Core resources have no group: `v1` parses to `("", "v1")`.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    if let Some((group, version)) = api_version.split_once('/') {
        (group.to_string(), version.to_string())
    } else {
        (String::new(), api_version.to_string())
    }
}

/// Build a GroupVersionKind from an apiVersion string and kind
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = parse_api_version(api_version);
    GroupVersionKind::gvk(&group, &version, kind)
}

/// Name of the ClusterWorkloadResourceMapping describing a resource
///
/// Mappings are named `<plural>.<group>`; core resources use the bare plural.
pub fn workload_mapping_name(plural: &str, group: &str) -> String {
    if group.is_empty() {
        plural.to_string()
    } else {
        format!("{}.{}", plural, group)
    }
}

/// Cache key identifying a resource kind independent of its version
pub fn group_kind_key(group: &str, kind: &str) -> String {
    if group.is_empty() {
        kind.to_string()
    } else {
        format!("{}.{}", kind, group)
    }
}
