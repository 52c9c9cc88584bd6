//! Mapping resolution
//!
//! Finds the template describing where a workload kind keeps its containers,
//! volumes and pod annotations. Registered `ClusterWorkloadResourceMapping`s
//! are consulted through a [`MappingSource`]; anything unregistered is
//! treated as PodSpec-able.

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::api::GroupVersionKind;
use servicebinding_common::crd::{
    ClusterWorkloadResourceMappingSpec, ClusterWorkloadResourceMappingTemplate, WILDCARD_VERSION,
};
use servicebinding_common::kube_utils::group_kind_key;
use tracing::debug;

use crate::error::ProjectionError;
use crate::path::Path;

/// One version entry of a workload mapping
pub type MappingTemplate = ClusterWorkloadResourceMappingTemplate;

// =============================================================================
// Sources
// =============================================================================

/// Synchronous access to registered workload mappings
pub trait MappingSource: Send + Sync {
    /// Mapping registered for the workload's group and kind, if any
    fn lookup(&self, gvk: &GroupVersionKind) -> Option<ClusterWorkloadResourceMappingSpec>;
}

impl<T: MappingSource + ?Sized> MappingSource for Arc<T> {
    fn lookup(&self, gvk: &GroupVersionKind) -> Option<ClusterWorkloadResourceMappingSpec> {
        (**self).lookup(gvk)
    }
}

/// In-memory mappings keyed by group and kind
#[derive(Debug, Clone, Default)]
pub struct StaticMappings {
    mappings: BTreeMap<String, ClusterWorkloadResourceMappingSpec>,
}

impl StaticMappings {
    /// Empty set: every workload resolves to the PodSpec-able default
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping for `group`/`kind`, replacing any previous one
    pub fn insert(&mut self, group: &str, kind: &str, spec: ClusterWorkloadResourceMappingSpec) {
        self.mappings.insert(group_kind_key(group, kind), spec);
    }

    /// Builder form of [`StaticMappings::insert`]
    pub fn with(mut self, group: &str, kind: &str, spec: ClusterWorkloadResourceMappingSpec) -> Self {
        self.insert(group, kind, spec);
        self
    }

    /// Drop the mapping for `group`/`kind`
    pub fn remove(&mut self, group: &str, kind: &str) -> Option<ClusterWorkloadResourceMappingSpec> {
        self.mappings.remove(&group_kind_key(group, kind))
    }
}

impl MappingSource for StaticMappings {
    fn lookup(&self, gvk: &GroupVersionKind) -> Option<ClusterWorkloadResourceMappingSpec> {
        self.mappings.get(&group_kind_key(&gvk.group, &gvk.kind)).cloned()
    }
}

// =============================================================================
// Compiled templates
// =============================================================================

/// Parsed paths of one container entry
#[derive(Debug, Clone)]
pub struct ContainerPaths {
    /// Fragment selector (unrestricted)
    pub path: Path,
    /// Container name, relative to a fragment
    pub name: Option<Path>,
    /// Env list, relative to a fragment
    pub env: Path,
    /// Volume mounts list, relative to a fragment
    pub volume_mounts: Path,
}

/// A defaulted template with every path parsed in its dialect
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    /// The template the paths were parsed from
    pub template: MappingTemplate,
    /// Pod-template annotations
    pub annotations: Path,
    /// Container entries, in template order
    pub containers: Vec<ContainerPaths>,
    /// Pod volumes
    pub volumes: Path,
}

fn restricted(field: String, expr: &str) -> Result<Path, ProjectionError> {
    Path::parse_restricted(expr).map_err(|e| ProjectionError::path(field, e))
}

impl CompiledTemplate {
    /// Default and parse `template`
    pub fn compile(mut template: MappingTemplate) -> Result<Self, ProjectionError> {
        template.apply_defaults();

        let annotations = restricted("annotations".to_string(), &template.annotations)?;
        let volumes = restricted("volumes".to_string(), &template.volumes)?;

        let mut containers = Vec::with_capacity(template.containers.len());
        for (i, entry) in template.containers.iter().enumerate() {
            let path = Path::parse(&entry.path)
                .map_err(|e| ProjectionError::path(format!("containers[{}].path", i), e))?;
            let name = entry
                .name
                .as_deref()
                .map(|expr| restricted(format!("containers[{}].name", i), expr))
                .transpose()?;
            containers.push(ContainerPaths {
                path,
                name,
                env: restricted(format!("containers[{}].env", i), &entry.env)?,
                volume_mounts: restricted(
                    format!("containers[{}].volumeMounts", i),
                    &entry.volume_mounts,
                )?,
            });
        }

        Ok(Self {
            template,
            annotations,
            containers,
            volumes,
        })
    }
}

/// Template-level operations that need the path engine
pub trait TemplateExt: Sized {
    /// Template for PodSpec-able resources, valid for every version
    fn default_podspecable() -> Self;

    /// Check that every path parses in its dialect (after defaulting)
    fn validate(&self) -> Result<(), ProjectionError>;
}

impl TemplateExt for MappingTemplate {
    fn default_podspecable() -> Self {
        MappingTemplate::podspecable(WILDCARD_VERSION)
    }

    fn validate(&self) -> Result<(), ProjectionError> {
        CompiledTemplate::compile(self.clone()).map(|_| ())
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Selects the mapping template for a workload's group/version/kind
///
/// Selection order: exact version, then `*`, then the PodSpec-able default.
#[derive(Debug, Clone)]
pub struct MappingResolver<S> {
    source: S,
}

impl<S: MappingSource> MappingResolver<S> {
    /// Resolver backed by `source`
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// The underlying mapping source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Defaulted, validated template for `gvk`
    pub fn lookup(&self, gvk: &GroupVersionKind) -> Result<MappingTemplate, ProjectionError> {
        self.resolve(gvk).map(|compiled| compiled.template)
    }

    /// Template for `gvk` with its paths parsed, ready for a workload view
    ///
    /// Defaulting and validation happen as part of compiling, so each path
    /// is parsed once per call.
    pub fn resolve(&self, gvk: &GroupVersionKind) -> Result<CompiledTemplate, ProjectionError> {
        let registered = self
            .source
            .lookup(gvk)
            .and_then(|spec| spec.template_for(&gvk.version).cloned());

        let template = match registered {
            Some(template) => {
                debug!(
                    kind = %gvk.kind,
                    group = %gvk.group,
                    version = %template.version,
                    "using registered workload mapping"
                );
                template
            }
            None => MappingTemplate::default_podspecable(),
        };

        CompiledTemplate::compile(template)
    }
}
