//! Workload mapping cache
//!
//! Bridges the async [`Resolver`] and the synchronous projector: mappings
//! are loaded ahead of a projection and then served from memory through
//! [`MappingSource`]. Kinds without a registered mapping are cached too, so
//! PodSpec-able workloads don't cost an API call per reconcile.

use dashmap::DashMap;
use kube::api::GroupVersionKind;
use servicebinding_common::crd::ClusterWorkloadResourceMappingSpec;
use servicebinding_common::kube_utils::group_kind_key;
use servicebinding_common::Result;
use servicebinding_projector::MappingSource;
use tracing::{debug, instrument};

use crate::resolver::Resolver;

/// Mappings keyed by workload group and kind
///
/// Shared across reconcilers via `Arc<MappingCache>`. `DashMap` keeps
/// lookups for one kind from blocking loads of another.
#[derive(Debug, Default)]
pub struct MappingCache {
    entries: DashMap<String, Option<ClusterWorkloadResourceMappingSpec>>,
}

impl MappingCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure the mapping for `gvk` is cached, fetching it if needed
    #[instrument(skip(self, resolver), fields(kind = %gvk.kind, group = %gvk.group))]
    pub async fn load(
        &self,
        resolver: &dyn Resolver,
        gvk: &GroupVersionKind,
    ) -> Result<Option<ClusterWorkloadResourceMappingSpec>> {
        let key = group_kind_key(&gvk.group, &gvk.kind);
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.value().clone());
        }

        let spec = resolver.lookup_workload_mapping(gvk).await?;
        debug!(registered = spec.is_some(), "cached workload mapping");
        self.entries.insert(key, spec.clone());
        Ok(spec)
    }

    /// Forget the mapping for `gvk`'s group and kind
    ///
    /// Call when a `ClusterWorkloadResourceMapping` changes.
    pub fn invalidate(&self, gvk: &GroupVersionKind) {
        self.entries.remove(&group_kind_key(&gvk.group, &gvk.kind));
    }

    /// Forget every cached mapping
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached kinds, including unregistered ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MappingSource for MappingCache {
    fn lookup(&self, gvk: &GroupVersionKind) -> Option<ClusterWorkloadResourceMappingSpec> {
        self.entries
            .get(&group_kind_key(&gvk.group, &gvk.kind))
            .and_then(|entry| entry.value().clone())
    }
}
