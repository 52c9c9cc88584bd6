//! Cluster-side collaborators of the ServiceBinding projector
//!
//! [`Resolver`] fetches workload mappings, binding secrets and workloads
//! from the API server; [`MappingCache`] keeps the fetched mappings so the
//! synchronous projector can read them.

#![deny(missing_docs)]

pub mod cache;
pub mod resolver;

pub use cache::MappingCache;
pub use resolver::{provisioned_secret_name, KubeResolver, Resolver, WorkloadQuery};
