//! Common types for the ServiceBinding projector: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of the ServiceBinding CRDs
pub const SERVICE_BINDING_GROUP: &str = "servicebinding.io";

/// Prefix of every annotation the projector writes
pub const PROJECTOR_ANNOTATION_PREFIX: &str = "projector.servicebinding.io/";

/// Prefix of the projected volume (and its mounts) for each binding
pub const VOLUME_PREFIX: &str = "servicebinding-";

/// Environment variable pointing applications at the bindings directory
pub const SERVICE_BINDING_ROOT_ENV: &str = "SERVICE_BINDING_ROOT";

/// Bindings directory used when a container does not set `SERVICE_BINDING_ROOT`
pub const DEFAULT_SERVICE_BINDING_ROOT: &str = "/bindings";

/// Binding entry key that refers to `spec.type` instead of a secret key
pub const TYPE_ENTRY: &str = "type";

/// Binding entry key that refers to `spec.provider` instead of a secret key
pub const PROVIDER_ENTRY: &str = "provider";
