//! ServiceBinding projection engine
//!
//! Injects a binding's credentials into any workload that embeds
//! PodSpec-shaped containers, and removes them again, without knowing the
//! workload's type in advance:
//!
//! - [`path`]: JSONPath-style navigation over generic JSON documents
//! - [`mapping`]: where a workload kind keeps containers, volumes and annotations
//! - [`view`]: shape-independent read/write view of one workload
//! - [`footprint`]: per-binding naming, ownership and ordering rules
//! - [`projector`]: the project/unproject algorithm
//!
//! The engine is synchronous and performs no I/O; looking up bindings,
//! secrets, workloads and mappings is the caller's job.

#![deny(missing_docs)]

pub mod error;
pub mod footprint;
pub mod mapping;
pub mod path;
pub mod projector;
pub mod view;

pub use error::ProjectionError;
pub use footprint::{Footprint, FootprintRegistry};
pub use mapping::{
    CompiledTemplate, MappingResolver, MappingSource, MappingTemplate, StaticMappings, TemplateExt,
};
pub use path::{Path, PathError};
pub use projector::{Projector, ProjectorConfig};
pub use view::{ContainerView, WorkloadView};
