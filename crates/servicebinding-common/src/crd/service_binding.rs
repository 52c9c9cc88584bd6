//! ServiceBinding CRD (`servicebinding.io/v1`)
//!
//! A ServiceBinding names a service that exposes credentials through a
//! Secret and a workload that should receive them. The reconciler resolves
//! the secret into `status.binding.name`; the projector only ever reads the
//! spec and that resolved name.

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{upsert_condition, Condition, ConditionStatus, LabelSelector};

/// Condition type reporting overall readiness of the binding
pub const CONDITION_READY: &str = "Ready";
/// Condition type reporting that the service exposes a bindable secret
pub const CONDITION_SERVICE_AVAILABLE: &str = "ServiceAvailable";
/// Condition type reporting that the workload received the projection
pub const CONDITION_WORKLOAD_PROJECTED: &str = "WorkloadProjected";

/// Spec for a ServiceBinding
///
/// Example:
/// ```yaml
/// apiVersion: servicebinding.io/v1
/// kind: ServiceBinding
/// metadata:
///   name: account-db
/// spec:
///   type: postgresql
///   service:
///     apiVersion: v1
///     kind: Secret
///     name: account-db-credentials
///   workload:
///     apiVersion: apps/v1
///     kind: Deployment
///     name: account-service
///   env:
///     - name: DB_USER
///       key: username
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicebinding.io",
    version = "v1",
    kind = "ServiceBinding",
    plural = "servicebindings",
    namespaced,
    status = "ServiceBindingStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingSpec {
    /// Name of the binding, used as the mount directory (defaults to metadata.name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Binding type, projected as the `type` entry
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Binding provider, projected as the `provider` entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Workload(s) receiving the binding
    pub workload: ServiceBindingWorkloadReference,

    /// Service exposing the credentials
    pub service: ServiceBindingServiceReference,

    /// Environment variables derived from binding entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvMapping>,
}

/// Reference to the workload(s) a binding projects into
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingWorkloadReference {
    /// API version of the workload resource
    pub api_version: String,

    /// Kind of the workload resource
    pub kind: String,

    /// Exact workload name (mutually exclusive with `selector`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Label selector for workloads (mutually exclusive with `name`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    /// Container names eligible for projection; empty means all containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<String>,
}

/// Reference to the service exposing the binding secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingServiceReference {
    /// API version of the service resource
    pub api_version: String,

    /// Kind of the service resource
    pub kind: String,

    /// Service name
    pub name: String,
}

impl ServiceBindingServiceReference {
    /// A service that is itself a core `Secret`
    pub fn is_direct_secret(&self) -> bool {
        self.api_version == "v1" && self.kind == "Secret"
    }
}

/// Maps one binding entry onto an environment variable
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EnvMapping {
    /// Environment variable name
    pub name: String,

    /// Key within the bound secret (`type`/`provider` refer to the binding fields)
    pub key: String,
}

/// Reference to the resolved binding secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ServiceBindingSecretReference {
    /// Secret name
    pub name: String,
}

/// ServiceBinding status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingStatus {
    /// Generation most recently observed by the reconciler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Secret resolved from the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<ServiceBindingSecretReference>,
}

impl ServiceBinding {
    /// UID identifying this binding's footprint on workloads
    pub fn binding_uid(&self) -> Option<&str> {
        self.metadata.uid.as_deref().filter(|u| !u.is_empty())
    }

    /// Binding name used for the mount directory
    pub fn binding_name(&self) -> String {
        self.spec
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    /// Binding type, if set to a non-empty value
    pub fn binding_type(&self) -> Option<&str> {
        self.spec.type_.as_deref().filter(|t| !t.is_empty())
    }

    /// Binding provider, if set to a non-empty value
    pub fn binding_provider(&self) -> Option<&str> {
        self.spec.provider.as_deref().filter(|p| !p.is_empty())
    }

    /// Name of the resolved secret; `None` while the binding is unbound
    pub fn bound_secret_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.binding.as_ref())
            .map(|b| b.name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// Set the resolved secret name
    pub fn set_bound_secret_name(&mut self, name: impl Into<String>) {
        self.status.get_or_insert_with(Default::default).binding =
            Some(ServiceBindingSecretReference { name: name.into() });
    }

    /// Whether a container name is on the workload allow-list
    ///
    /// An empty allow-list admits every container.
    pub fn allows_container(&self, name: &str) -> bool {
        self.spec.workload.containers.is_empty()
            || self.spec.workload.containers.iter().any(|c| c == name)
    }

    /// Record a status condition against the current generation
    pub fn set_condition(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) {
        let generation = self.metadata.generation;
        let status_block = self.status.get_or_insert_with(Default::default);
        status_block.observed_generation = generation;
        upsert_condition(
            &mut status_block.conditions,
            Condition::new(type_, status, reason, message).with_generation(generation),
        );
    }
}
