//! Kubernetes lookups the projector depends on
//!
//! The projector never talks to the API server. Everything it needs from
//! the cluster (workload mappings, the secret a service exposes, the
//! workloads a binding targets) is fetched through [`Resolver`], which is a
//! trait so reconciler logic can be tested against a mock.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, GroupVersionKind, ListParams};
use kube::discovery::{pinned_kind, ApiResource};
use kube::Client;
use servicebinding_common::crd::{
    ClusterWorkloadResourceMapping, ClusterWorkloadResourceMappingSpec,
    ServiceBindingServiceReference, ServiceBindingWorkloadReference,
};
use servicebinding_common::kube_utils::{gvk_from_api_version, workload_mapping_name};
use servicebinding_common::{Error, Result};
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

/// Cluster lookups used while reconciling a ServiceBinding
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Mapping registered for a workload kind
    ///
    /// Returns `None` when no `ClusterWorkloadResourceMapping` exists, in
    /// which case the workload is treated as PodSpec-able.
    async fn lookup_workload_mapping(
        &self,
        gvk: &GroupVersionKind,
    ) -> Result<Option<ClusterWorkloadResourceMappingSpec>>;

    /// Name of the secret a service exposes
    ///
    /// A direct `v1/Secret` reference is its own answer. Any other service
    /// is read as a Provisioned Service: `None` until it reports
    /// `.status.binding.name`.
    async fn lookup_binding_secret(
        &self,
        namespace: &str,
        service: &ServiceBindingServiceReference,
    ) -> Result<Option<String>>;

    /// Workloads a binding targets, by name or by label selector
    async fn lookup_workloads(
        &self,
        namespace: &str,
        workload: &ServiceBindingWorkloadReference,
    ) -> Result<Vec<DynamicObject>>;
}

/// How a workload reference selects workloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadQuery {
    /// Exactly one workload by name
    Name(String),
    /// Every workload matching a label selector string
    Selector(String),
}

impl WorkloadQuery {
    /// Validate a workload reference: exactly one of name and selector
    pub fn from_reference(
        namespace: &str,
        workload: &ServiceBindingWorkloadReference,
    ) -> Result<Self> {
        let name = workload.name.as_deref().filter(|n| !n.is_empty());
        match (name, &workload.selector) {
            (Some(name), None) => Ok(Self::Name(name.to_string())),
            (None, Some(selector)) => Ok(Self::Selector(selector.to_selector_string())),
            (Some(_), Some(_)) => Err(Error::validation_for_field(
                format!("{}/{}", namespace, workload.kind),
                "spec.workload",
                "name and selector are mutually exclusive",
            )),
            (None, None) => Err(Error::validation_for_field(
                format!("{}/{}", namespace, workload.kind),
                "spec.workload",
                "one of name or selector is required",
            )),
        }
    }
}

/// Secret name reported by a Provisioned Service
pub fn provisioned_secret_name(service: &DynamicObject) -> Option<String> {
    service
        .data
        .pointer("/status/binding/name")
        .and_then(|v| v.as_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// [`Resolver`] backed by a live cluster
#[derive(Clone)]
pub struct KubeResolver {
    client: Client,
}

impl KubeResolver {
    /// Resolver using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn api_resource(&self, gvk: &GroupVersionKind) -> Result<ApiResource> {
        let (resource, _capabilities) = pinned_kind(&self.client, gvk).await?;
        Ok(resource)
    }
}

#[async_trait]
impl Resolver for KubeResolver {
    #[instrument(skip(self), fields(kind = %gvk.kind, group = %gvk.group))]
    async fn lookup_workload_mapping(
        &self,
        gvk: &GroupVersionKind,
    ) -> Result<Option<ClusterWorkloadResourceMappingSpec>> {
        let resource = self.api_resource(gvk).await?;
        let name = workload_mapping_name(&resource.plural, &gvk.group);

        let api: Api<ClusterWorkloadResourceMapping> = Api::all(self.client.clone());
        match api.get_opt(&name).await? {
            Some(mapping) => Ok(Some(mapping.spec)),
            None => {
                debug!(mapping = %name, "no workload mapping registered");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, service), fields(service = %service.name, kind = %service.kind))]
    async fn lookup_binding_secret(
        &self,
        namespace: &str,
        service: &ServiceBindingServiceReference,
    ) -> Result<Option<String>> {
        if service.is_direct_secret() {
            return Ok(Some(service.name.clone()));
        }

        let gvk = gvk_from_api_version(&service.api_version, &service.kind);
        let resource = self.api_resource(&gvk).await?;
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &resource);
        let object = api.get(&service.name).await?;

        let secret = provisioned_secret_name(&object);
        if secret.is_none() {
            debug!("provisioned service has not reported a binding secret yet");
        }
        Ok(secret)
    }

    #[instrument(skip(self, workload), fields(kind = %workload.kind))]
    async fn lookup_workloads(
        &self,
        namespace: &str,
        workload: &ServiceBindingWorkloadReference,
    ) -> Result<Vec<DynamicObject>> {
        let query = WorkloadQuery::from_reference(namespace, workload)?;

        let gvk = gvk_from_api_version(&workload.api_version, &workload.kind);
        let resource = self.api_resource(&gvk).await?;
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &resource);

        let workloads: Vec<DynamicObject> = match query {
            WorkloadQuery::Name(name) => api.get_opt(&name).await?.into_iter().collect(),
            WorkloadQuery::Selector(selector) => {
                api.list(&ListParams::default().labels(&selector)).await?.items
            }
        };
        debug!(count = workloads.len(), "resolved workloads");
        Ok(workloads)
    }
}
