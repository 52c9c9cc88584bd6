//! Custom Resource Definitions for ServiceBinding
//!
//! This module contains the `servicebinding.io` CRDs consumed by the
//! projector and its collaborators.

mod service_binding;
mod types;
mod workload_mapping;

pub use service_binding::{
    EnvMapping, ServiceBinding, ServiceBindingSecretReference, ServiceBindingServiceReference,
    ServiceBindingSpec, ServiceBindingStatus, ServiceBindingWorkloadReference, CONDITION_READY,
    CONDITION_SERVICE_AVAILABLE, CONDITION_WORKLOAD_PROJECTED,
};
pub use types::{
    upsert_condition, Condition, ConditionStatus, LabelSelector, LabelSelectorOperator, LabelSelectorRequirement,
};
pub use workload_mapping::{
    ClusterWorkloadResourceMapping, ClusterWorkloadResourceMappingContainer,
    ClusterWorkloadResourceMappingSpec, ClusterWorkloadResourceMappingTemplate,
    DEFAULT_ANNOTATIONS_PATH, DEFAULT_CONTAINERS_PATH, DEFAULT_CONTAINER_NAME_PATH,
    DEFAULT_ENV_PATH, DEFAULT_INIT_CONTAINERS_PATH, DEFAULT_VOLUMES_PATH,
    DEFAULT_VOLUME_MOUNTS_PATH, WILDCARD_VERSION,
};
