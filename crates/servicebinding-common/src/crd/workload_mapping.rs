//! ClusterWorkloadResourceMapping CRD (`servicebinding.io/v1`)
//!
//! Describes where, inside a workload resource that is not a plain
//! PodSpec-shaped resource, the containers, volumes and pod annotations
//! live. One mapping exists per resource, named `<plural>.<group>`, with one
//! template per schema version (or `*` for all versions).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Version entry that matches every schema version of the workload
pub const WILDCARD_VERSION: &str = "*";

/// Default path to the pod template annotations
pub const DEFAULT_ANNOTATIONS_PATH: &str = ".spec.template.metadata.annotations";
/// Default path to the pod init containers
pub const DEFAULT_INIT_CONTAINERS_PATH: &str = ".spec.template.spec.initContainers[*]";
/// Default path to the pod containers
pub const DEFAULT_CONTAINERS_PATH: &str = ".spec.template.spec.containers[*]";
/// Default path to a container's name
pub const DEFAULT_CONTAINER_NAME_PATH: &str = ".name";
/// Default path to a container's environment
pub const DEFAULT_ENV_PATH: &str = ".env";
/// Default path to a container's volume mounts
pub const DEFAULT_VOLUME_MOUNTS_PATH: &str = ".volumeMounts";
/// Default path to the pod volumes
pub const DEFAULT_VOLUMES_PATH: &str = ".spec.template.spec.volumes";

/// Spec for a ClusterWorkloadResourceMapping
///
/// Example (CronJob):
/// ```yaml
/// apiVersion: servicebinding.io/v1
/// kind: ClusterWorkloadResourceMapping
/// metadata:
///   name: cronjobs.batch
/// spec:
///   versions:
///     - version: "*"
///       annotations: .spec.jobTemplate.spec.template.metadata.annotations
///       containers:
///         - path: .spec.jobTemplate.spec.template.spec.containers[*]
///           name: .name
///       volumes: .spec.jobTemplate.spec.template.spec.volumes
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicebinding.io",
    version = "v1",
    kind = "ClusterWorkloadResourceMapping",
    plural = "clusterworkloadresourcemappings"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterWorkloadResourceMappingSpec {
    /// Templates keyed by the workload's schema version
    #[serde(default)]
    pub versions: Vec<ClusterWorkloadResourceMappingTemplate>,
}

impl ClusterWorkloadResourceMappingSpec {
    /// Select the template for a schema version
    ///
    /// An exact version match wins over the `*` wildcard. Returns `None`
    /// when neither exists.
    pub fn template_for(&self, version: &str) -> Option<&ClusterWorkloadResourceMappingTemplate> {
        self.versions
            .iter()
            .find(|t| t.version == version)
            .or_else(|| self.versions.iter().find(|t| t.version == WILDCARD_VERSION))
    }
}

/// Where the binding-relevant fields of one workload version live
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterWorkloadResourceMappingTemplate {
    /// Schema version this template applies to, or `*`
    pub version: String,

    /// Restricted path to the pod template annotations
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub annotations: String,

    /// Container-like fragments of the workload
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ClusterWorkloadResourceMappingContainer>,

    /// Restricted path to the pod volumes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub volumes: String,
}

/// Where one kind of container-like fragment lives
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterWorkloadResourceMappingContainer {
    /// Path selecting zero or more container fragments (may use wildcards)
    pub path: String,

    /// Restricted path to the container name, relative to the fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Restricted path to the env list, relative to the fragment
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub env: String,

    /// Restricted path to the volume mounts list, relative to the fragment
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub volume_mounts: String,
}

impl ClusterWorkloadResourceMappingContainer {
    /// Container fragment at `path`, matched by its `.name`
    pub fn named(path: impl Into<String>) -> Self {
        let mut container = Self {
            path: path.into(),
            name: Some(DEFAULT_CONTAINER_NAME_PATH.to_string()),
            ..Default::default()
        };
        container.apply_defaults();
        container
    }

    /// Fill in missing sub-paths with their conventional values
    pub fn apply_defaults(&mut self) {
        if self.env.is_empty() {
            self.env = DEFAULT_ENV_PATH.to_string();
        }
        if self.volume_mounts.is_empty() {
            self.volume_mounts = DEFAULT_VOLUME_MOUNTS_PATH.to_string();
        }
        if self.name.as_deref() == Some("") {
            self.name = None;
        }
    }
}

impl ClusterWorkloadResourceMappingTemplate {
    /// Template for PodSpec-able resources (Deployment, StatefulSet, Job, ...)
    pub fn podspecable(version: impl Into<String>) -> Self {
        let mut template = Self {
            version: version.into(),
            ..Default::default()
        };
        template.apply_defaults();
        template
    }

    /// Fill in missing paths with the PodSpec-able conventions
    pub fn apply_defaults(&mut self) {
        if self.annotations.is_empty() {
            self.annotations = DEFAULT_ANNOTATIONS_PATH.to_string();
        }
        if self.containers.is_empty() {
            self.containers = vec![
                ClusterWorkloadResourceMappingContainer::named(DEFAULT_INIT_CONTAINERS_PATH),
                ClusterWorkloadResourceMappingContainer::named(DEFAULT_CONTAINERS_PATH),
            ];
        }
        for container in &mut self.containers {
            container.apply_defaults();
        }
        if self.volumes.is_empty() {
            self.volumes = DEFAULT_VOLUMES_PATH.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRONJOB_MAPPING_YAML: &str = r#"
apiVersion: servicebinding.io/v1
kind: ClusterWorkloadResourceMapping
metadata:
  name: cronjobs.batch
spec:
  versions:
    - version: "*"
      annotations: .spec.jobTemplate.spec.template.metadata.annotations
      containers:
        - path: .spec.jobTemplate.spec.template.spec.containers[*]
          name: .name
        - path: .spec.jobTemplate.spec.template.spec.initContainers[*]
          name: .name
      volumes: .spec.jobTemplate.spec.template.spec.volumes
    - version: v1beta1
      containers:
        - path: .spec.containers[*]
"#;

    #[test]
    fn parses_mapping_yaml() {
        let mapping: ClusterWorkloadResourceMapping =
            serde_yaml::from_str(CRONJOB_MAPPING_YAML).unwrap();
        assert_eq!(mapping.spec.versions.len(), 2);
        assert_eq!(mapping.spec.versions[0].containers.len(), 2);
        assert_eq!(mapping.spec.versions[1].containers[0].name, None);
    }

    #[test]
    fn exact_version_wins_over_wildcard() {
        let mapping: ClusterWorkloadResourceMapping =
            serde_yaml::from_str(CRONJOB_MAPPING_YAML).unwrap();

        let exact = mapping.spec.template_for("v1beta1").unwrap();
        assert_eq!(exact.version, "v1beta1");

        let wildcard = mapping.spec.template_for("v1").unwrap();
        assert_eq!(wildcard.version, WILDCARD_VERSION);
    }

    #[test]
    fn no_template_without_match_or_wildcard() {
        let spec = ClusterWorkloadResourceMappingSpec {
            versions: vec![ClusterWorkloadResourceMappingTemplate {
                version: "v2".to_string(),
                ..Default::default()
            }],
        };
        assert!(spec.template_for("v1").is_none());
    }

    #[test]
    fn defaults_fill_missing_paths() {
        let mut template = ClusterWorkloadResourceMappingTemplate {
            version: "v1beta1".to_string(),
            containers: vec![ClusterWorkloadResourceMappingContainer {
                path: ".spec.containers[*]".to_string(),
                name: Some(String::new()),
                ..Default::default()
            }],
            ..Default::default()
        };
        template.apply_defaults();

        assert_eq!(template.annotations, DEFAULT_ANNOTATIONS_PATH);
        assert_eq!(template.volumes, DEFAULT_VOLUMES_PATH);
        assert_eq!(template.containers.len(), 1);
        assert_eq!(template.containers[0].env, DEFAULT_ENV_PATH);
        assert_eq!(template.containers[0].volume_mounts, DEFAULT_VOLUME_MOUNTS_PATH);
        assert_eq!(template.containers[0].name, None);
    }

    #[test]
    fn podspecable_template_covers_init_and_regular_containers() {
        let template = ClusterWorkloadResourceMappingTemplate::podspecable(WILDCARD_VERSION);
        let paths: Vec<&str> = template.containers.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec![DEFAULT_INIT_CONTAINERS_PATH, DEFAULT_CONTAINERS_PATH]);
        assert!(template
            .containers
            .iter()
            .all(|c| c.name.as_deref() == Some(DEFAULT_CONTAINER_NAME_PATH)));
    }

    #[test]
    fn template_wire_format() {
        let template = ClusterWorkloadResourceMappingTemplate::podspecable(WILDCARD_VERSION);
        let json = serde_json::to_value(&template).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "version": "*",
                "annotations": ".spec.template.metadata.annotations",
                "containers": [
                    {
                        "path": ".spec.template.spec.initContainers[*]",
                        "name": ".name",
                        "env": ".env",
                        "volumeMounts": ".volumeMounts"
                    },
                    {
                        "path": ".spec.template.spec.containers[*]",
                        "name": ".name",
                        "env": ".env",
                        "volumeMounts": ".volumeMounts"
                    }
                ],
                "volumes": ".spec.template.spec.volumes"
            })
        );
    }
}
