//! Projector: applies or removes one ServiceBinding on one workload
//!
//! Every projection first removes the binding's previous footprint and then
//! adds the current one, so repeated calls with a changed binding (rotated
//! secret, edited env mappings, new type) converge without diffing. Entries
//! owned by bindings are sorted afterwards, which makes the result
//! independent of the order bindings were applied in.
//!
//! The caller's workload is only replaced once the whole mutation succeeded.

use k8s_openapi::api::core::v1::{
    DownwardAPIProjection, DownwardAPIVolumeFile, EnvVar, EnvVarSource, ObjectFieldSelector,
    ProjectedVolumeSource, SecretKeySelector, SecretProjection, Volume, VolumeMount,
    VolumeProjection,
};
use kube::api::GroupVersionKind;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use servicebinding_common::crd::{EnvMapping, ServiceBinding};
use servicebinding_common::kube_utils::gvk_from_api_version;
use servicebinding_common::{
    DEFAULT_SERVICE_BINDING_ROOT, PROVIDER_ENTRY, SERVICE_BINDING_ROOT_ENV, TYPE_ENTRY,
};
use tracing::{debug, info, instrument};

use crate::error::ProjectionError;
use crate::footprint::{
    annotation_field_path, mapping_annotation, provider_annotation, secret_annotation,
    type_annotation, volume_name, FootprintRegistry,
};
use crate::mapping::{CompiledTemplate, MappingResolver, MappingSource, MappingTemplate};
use crate::view::{ContainerView, WorkloadView};

// =============================================================================
// Configuration
// =============================================================================

/// Projector settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectorConfig {
    /// `SERVICE_BINDING_ROOT` given to containers that do not set it
    pub default_binding_root: String,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            default_binding_root: DEFAULT_SERVICE_BINDING_ROOT.to_string(),
        }
    }
}

// =============================================================================
// Projector
// =============================================================================

/// Projects bindings into workloads of any kind
#[derive(Debug, Clone)]
pub struct Projector<S> {
    resolver: MappingResolver<S>,
    config: ProjectorConfig,
}

/// apiVersion/kind of a workload document
pub fn workload_gvk(doc: &Value) -> Result<GroupVersionKind, ProjectionError> {
    let api_version = doc.get("apiVersion").and_then(Value::as_str).filter(|s| !s.is_empty());
    let kind = doc.get("kind").and_then(Value::as_str).filter(|s| !s.is_empty());
    match (api_version, kind) {
        (Some(api_version), Some(kind)) => Ok(gvk_from_api_version(api_version, kind)),
        _ => Err(ProjectionError::MissingTypeMeta),
    }
}

fn binding_uid(binding: &ServiceBinding) -> Result<&str, ProjectionError> {
    binding
        .binding_uid()
        .ok_or_else(|| ProjectionError::MissingBindingUid {
            binding: binding.name_any(),
        })
}

impl<S: MappingSource> Projector<S> {
    /// Projector with the default configuration
    pub fn new(source: S) -> Self {
        Self::with_config(source, ProjectorConfig::default())
    }

    /// Projector with explicit configuration
    pub fn with_config(source: S, config: ProjectorConfig) -> Self {
        Self {
            resolver: MappingResolver::new(source),
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ProjectorConfig {
        &self.config
    }

    /// Mapping resolver used for live lookups
    pub fn resolver(&self) -> &MappingResolver<S> {
        &self.resolver
    }

    /// Apply `binding` to `workload`
    ///
    /// On error `workload` is left unmodified.
    #[instrument(
        skip(self, binding, workload),
        fields(binding = %binding.name_any(), uid = ?binding.binding_uid())
    )]
    pub fn project<K>(&self, binding: &ServiceBinding, workload: &mut K) -> Result<(), ProjectionError>
    where
        K: Serialize + DeserializeOwned,
    {
        let doc = serde_json::to_value(&*workload)?;
        let projected = self.project_document(binding, doc)?;
        *workload = serde_json::from_value(projected)?;
        Ok(())
    }

    /// Remove `binding` from `workload`
    ///
    /// On error `workload` is left unmodified.
    #[instrument(
        skip(self, binding, workload),
        fields(binding = %binding.name_any(), uid = ?binding.binding_uid())
    )]
    pub fn unproject<K>(&self, binding: &ServiceBinding, workload: &mut K) -> Result<(), ProjectionError>
    where
        K: Serialize + DeserializeOwned,
    {
        let doc = serde_json::to_value(&*workload)?;
        let unprojected = self.unproject_document(binding, doc)?;
        *workload = serde_json::from_value(unprojected)?;
        Ok(())
    }

    /// [`Projector::project`] on a generic workload document
    pub fn project_document(&self, binding: &ServiceBinding, doc: Value) -> Result<Value, ProjectionError> {
        let uid = binding_uid(binding)?;
        let gvk = workload_gvk(&doc)?;
        let template = self.resolver.resolve(&gvk)?;
        let recorded_mapping = serde_json::to_string(&template.template)?;
        let mut view = WorkloadView::build(doc, template)?;

        remove_footprint(&mut view, uid);

        let Some(secret) = binding.bound_secret_name() else {
            debug!(kind = %gvk.kind, "binding has no secret yet, removed previous projection only");
            return view.write_back();
        };

        view.workload_annotations
            .insert(mapping_annotation(uid), recorded_mapping);
        view.annotations.insert(secret_annotation(uid), secret.to_string());
        if let Some(type_) = binding.binding_type() {
            view.annotations.insert(type_annotation(uid), type_.to_string());
        }
        if let Some(provider) = binding.binding_provider() {
            view.annotations.insert(provider_annotation(uid), provider.to_string());
        }

        view.volumes.push(projected_volume(uid, secret, binding));

        let binding_name = binding.binding_name();
        let mut projected = 0usize;
        for container in view.containers.iter_mut() {
            let eligible = container
                .name
                .as_deref()
                .map_or(true, |name| binding.allows_container(name));
            if !eligible {
                continue;
            }

            let root = ensure_binding_root(container, &self.config.default_binding_root);
            container.volume_mounts.push(VolumeMount {
                name: volume_name(uid),
                mount_path: format!("{}/{}", root.trim_end_matches('/'), binding_name),
                read_only: Some(true),
                ..Default::default()
            });
            for mapping in &binding.spec.env {
                container.env.push(binding_env_var(uid, secret, mapping, binding));
            }
            projected += 1;
        }

        let registry = FootprintRegistry::from_annotations(&view.annotations);
        registry.sort_volumes(&mut view.volumes);
        for container in view.containers.iter_mut() {
            registry.sort_volume_mounts(&mut container.volume_mounts);
            registry.sort_env(&mut container.env);
        }

        info!(
            kind = %gvk.kind,
            secret = %secret,
            containers = projected,
            bindings = registry.len(),
            "projected binding into workload"
        );
        view.write_back()
    }

    /// [`Projector::unproject`] on a generic workload document
    ///
    /// The workload is navigated with the mapping recorded when the binding
    /// was projected, so removal works even if the registered mapping has
    /// changed or been deleted since.
    pub fn unproject_document(&self, binding: &ServiceBinding, doc: Value) -> Result<Value, ProjectionError> {
        let uid = binding_uid(binding)?;
        let template = match recorded_template(&doc, uid) {
            Some(template) => template,
            None => self.resolver.resolve(&workload_gvk(&doc)?)?,
        };

        let mut view = WorkloadView::build(doc, template)?;
        remove_footprint(&mut view, uid);
        debug!("removed binding from workload");
        view.write_back()
    }
}

/// Mapping template recorded on the workload for `uid`, if usable
fn recorded_template(doc: &Value, uid: &str) -> Option<CompiledTemplate> {
    let raw = doc
        .get("metadata")?
        .get("annotations")?
        .get(mapping_annotation(uid))?
        .as_str()?;

    let parsed = serde_json::from_str::<MappingTemplate>(raw)
        .map_err(|e| e.to_string())
        .and_then(|template| CompiledTemplate::compile(template).map_err(|e| e.to_string()));
    match parsed {
        Ok(template) => Some(template),
        Err(error) => {
            debug!(%error, "ignoring unusable recorded mapping");
            None
        }
    }
}

/// Remove every trace of binding `uid` from the view
///
/// `SERVICE_BINDING_ROOT` stays, since applications may read it while
/// temporarily unbound.
fn remove_footprint(view: &mut WorkloadView, uid: &str) {
    let registry = FootprintRegistry::from_annotations(&view.annotations);
    let footprint = registry.get(uid).cloned().unwrap_or_default();

    view.workload_annotations.remove(&mapping_annotation(uid));
    view.annotations.remove(&secret_annotation(uid));
    view.annotations.remove(&type_annotation(uid));
    view.annotations.remove(&provider_annotation(uid));

    let volume = volume_name(uid);
    view.volumes.retain(|v| v.name != volume);
    for container in view.containers.iter_mut() {
        container.volume_mounts.retain(|m| m.name != volume);
        container.env.retain(|e| !footprint.owns_env(uid, e));
    }
}

/// Effective `SERVICE_BINDING_ROOT` of a container, added when missing
fn ensure_binding_root(container: &mut ContainerView, default_root: &str) -> String {
    if let Some(existing) = container.env_var(SERVICE_BINDING_ROOT_ENV) {
        return existing
            .value
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default_root.to_string());
    }

    container.env.push(EnvVar {
        name: SERVICE_BINDING_ROOT_ENV.to_string(),
        value: Some(default_root.to_string()),
        ..Default::default()
    });
    default_root.to_string()
}

/// Projected volume carrying the secret plus type/provider entries
fn projected_volume(uid: &str, secret: &str, binding: &ServiceBinding) -> Volume {
    let mut items = Vec::new();
    if binding.binding_type().is_some() {
        items.push(annotation_file(TYPE_ENTRY, &type_annotation(uid)));
    }
    if binding.binding_provider().is_some() {
        items.push(annotation_file(PROVIDER_ENTRY, &provider_annotation(uid)));
    }

    let mut sources = vec![VolumeProjection {
        secret: Some(SecretProjection {
            name: secret.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }];
    if !items.is_empty() {
        sources.push(VolumeProjection {
            downward_api: Some(DownwardAPIProjection { items: Some(items) }),
            ..Default::default()
        });
    }

    Volume {
        name: volume_name(uid),
        projected: Some(ProjectedVolumeSource {
            sources: Some(sources),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn annotation_file(path: &str, annotation: &str) -> DownwardAPIVolumeFile {
    DownwardAPIVolumeFile {
        path: path.to_string(),
        field_ref: Some(ObjectFieldSelector {
            field_path: annotation_field_path(annotation),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Env var for one mapping: a secret key, or the type/provider annotation
fn binding_env_var(uid: &str, secret: &str, mapping: &EnvMapping, binding: &ServiceBinding) -> EnvVar {
    let annotation = match mapping.key.as_str() {
        TYPE_ENTRY if binding.binding_type().is_some() => Some(type_annotation(uid)),
        PROVIDER_ENTRY if binding.binding_provider().is_some() => Some(provider_annotation(uid)),
        _ => None,
    };

    let source = match annotation {
        Some(annotation) => EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: annotation_field_path(&annotation),
                ..Default::default()
            }),
            ..Default::default()
        },
        None => EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: mapping.key.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
    };

    EnvVar {
        name: mapping.name.clone(),
        value_from: Some(source),
        ..Default::default()
    }
}
