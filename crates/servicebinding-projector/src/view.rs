//! Workload view
//!
//! A shape-independent view of the parts of a workload that bindings touch:
//! annotations, container env and mounts, and pod volumes. The view is read
//! from the workload's generic JSON form through a compiled mapping template
//! and written back through the same template.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ProjectionError;
use crate::mapping::{CompiledTemplate, ContainerPaths};
use crate::path::{get_at, get_mut_at, Location, Path, PathError};

const WORKLOAD_ANNOTATIONS_PATH: &str = ".metadata.annotations";

/// One container-like fragment of a workload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerView {
    /// Container name, when the mapping names containers
    pub name: Option<String>,
    /// Environment variables
    pub env: Vec<EnvVar>,
    /// Volume mounts
    pub volume_mounts: Vec<VolumeMount>,
}

impl ContainerView {
    /// Environment variable named `name`
    pub fn env_var(&self, name: &str) -> Option<&EnvVar> {
        self.env.iter().find(|e| e.name == name)
    }
}

/// Binding-relevant state of one workload
#[derive(Debug, Clone)]
pub struct WorkloadView {
    doc: Value,
    template: CompiledTemplate,
    fragment_counts: Vec<usize>,
    // Set when pod annotations live at `.metadata.annotations`: the map as
    // read, against which both annotation maps' edits are merged
    shared_annotations: Option<BTreeMap<String, String>>,

    /// Workload `metadata.annotations`
    pub workload_annotations: BTreeMap<String, String>,
    /// Pod-template annotations
    pub annotations: BTreeMap<String, String>,
    /// Containers in mapping-entry order, then document order
    pub containers: Vec<ContainerView>,
    /// Pod volumes
    pub volumes: Vec<Volume>,
}

fn read<T: DeserializeOwned + Default>(
    doc: &Value,
    path: &Path,
) -> Result<T, ProjectionError> {
    match path.get(doc) {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(T::default()),
    }
}

fn write<T: Serialize>(
    doc: &mut Value,
    path: &Path,
    field: &str,
    value: &T,
) -> Result<(), ProjectionError> {
    let value = serde_json::to_value(value)?;
    path.set(doc, value)
        .map_err(|e| ProjectionError::path(field, e))
}

/// Fragments selected by a container entry that can hold fields
///
/// Anything else the path selects is not a container and is skipped.
fn fragments(doc: &Value, entry: &ContainerPaths) -> Vec<Location> {
    entry
        .path
        .locate(doc)
        .into_iter()
        .filter(|location| get_at(doc, location).is_some_and(Value::is_object))
        .collect()
}

impl WorkloadView {
    /// Serialize `workload` and read its view through `template`
    pub fn from_workload<K: Serialize>(
        workload: &K,
        template: CompiledTemplate,
    ) -> Result<Self, ProjectionError> {
        Self::build(serde_json::to_value(workload)?, template)
    }

    /// Read the view of a generic workload document
    pub fn build(doc: Value, template: CompiledTemplate) -> Result<Self, ProjectionError> {
        let workload_path = workload_annotations_path()?;
        let workload_annotations: BTreeMap<String, String> = read(&doc, &workload_path)?;
        let annotations = read(&doc, &template.annotations)?;
        let shared_annotations = (template.annotations.segments() == workload_path.segments())
            .then(|| workload_annotations.clone());

        let mut containers = Vec::new();
        let mut fragment_counts = Vec::with_capacity(template.containers.len());
        for entry in &template.containers {
            let locations = fragments(&doc, entry);
            if locations.is_empty() {
                debug!(path = %entry.path, "container path matched no fragments");
            }
            fragment_counts.push(locations.len());

            for location in &locations {
                let Some(fragment) = get_at(&doc, location) else {
                    continue;
                };
                let name = entry
                    .name
                    .as_ref()
                    .and_then(|path| path.get(fragment))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                containers.push(ContainerView {
                    name,
                    env: read(fragment, &entry.env)?,
                    volume_mounts: read(fragment, &entry.volume_mounts)?,
                });
            }
        }

        let volumes = read(&doc, &template.volumes)?;

        Ok(Self {
            doc,
            template,
            fragment_counts,
            shared_annotations,
            workload_annotations,
            annotations,
            containers,
            volumes,
        })
    }

    /// The template this view navigates with
    pub fn template(&self) -> &CompiledTemplate {
        &self.template
    }

    /// Write the view into its document and return the document
    ///
    /// Every managed collection is written, so absent lists and maps come
    /// back as empty ones. When the pod annotations are the workload's own
    /// annotations, edits made through either map are merged into one.
    pub fn write_back(self) -> Result<Value, ProjectionError> {
        let Self {
            mut doc,
            template,
            fragment_counts,
            shared_annotations,
            workload_annotations,
            annotations,
            containers,
            volumes,
        } = self;

        let workload_annotations = match shared_annotations {
            Some(original) => {
                let mut merged = original.clone();
                apply_edits(&mut merged, &original, &workload_annotations);
                apply_edits(&mut merged, &original, &annotations);
                write(&mut doc, &template.annotations, "annotations", &merged)?;
                None
            }
            None => {
                write(&mut doc, &template.annotations, "annotations", &annotations)?;
                Some(workload_annotations)
            }
        };

        let mut views = containers.into_iter();
        for (i, (entry, expected)) in template.containers.iter().zip(fragment_counts).enumerate() {
            let locations = fragments(&doc, entry);
            if locations.len() != expected {
                return Err(ProjectionError::FragmentMismatch {
                    path: entry.path.to_string(),
                    expected,
                    found: locations.len(),
                });
            }

            for location in &locations {
                let view = views.next().ok_or_else(|| ProjectionError::FragmentMismatch {
                    path: entry.path.to_string(),
                    expected,
                    found: locations.len(),
                })?;
                let fragment = get_mut_at(&mut doc, location).ok_or_else(|| {
                    ProjectionError::FragmentMismatch {
                        path: entry.path.to_string(),
                        expected,
                        found: 0,
                    }
                })?;

                if let (Some(path), Some(name)) = (&entry.name, &view.name) {
                    write(fragment, path, &format!("containers[{}].name", i), name)?;
                }
                write(fragment, &entry.env, &format!("containers[{}].env", i), &view.env)?;
                write(
                    fragment,
                    &entry.volume_mounts,
                    &format!("containers[{}].volumeMounts", i),
                    &view.volume_mounts,
                )?;
            }
        }

        let leftover = views.count();
        if leftover > 0 {
            let found = fragments_total(&template, &doc);
            return Err(ProjectionError::FragmentMismatch {
                path: "containers".to_string(),
                expected: found + leftover,
                found,
            });
        }

        write(&mut doc, &template.volumes, "volumes", &volumes)?;
        if let Some(workload_annotations) = workload_annotations {
            write(
                &mut doc,
                &workload_annotations_path()?,
                "metadata.annotations",
                &workload_annotations,
            )?;
        }

        Ok(doc)
    }

    /// Write the view back and convert it into the caller's type
    pub fn apply_to<K: DeserializeOwned>(self, workload: &mut K) -> Result<(), ProjectionError> {
        let doc = self.write_back()?;
        *workload = serde_json::from_value(doc)?;
        Ok(())
    }
}

/// Replay on `target` what changed between `original` and `edited`
fn apply_edits(
    target: &mut BTreeMap<String, String>,
    original: &BTreeMap<String, String>,
    edited: &BTreeMap<String, String>,
) {
    for key in original.keys().filter(|k| !edited.contains_key(*k)) {
        target.remove(key);
    }
    for (key, value) in edited {
        if original.get(key) != Some(value) {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn fragments_total(template: &CompiledTemplate, doc: &Value) -> usize {
    template
        .containers
        .iter()
        .map(|entry| fragments(doc, entry).len())
        .sum()
}

fn workload_annotations_path() -> Result<Path, ProjectionError> {
    Path::parse_restricted(WORKLOAD_ANNOTATIONS_PATH)
        .map_err(|e: PathError| ProjectionError::path("metadata.annotations", e))
}
