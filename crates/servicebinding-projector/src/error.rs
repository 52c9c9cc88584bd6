//! Projection error types
//!
//! Every variant aborts the call before the caller's workload is touched.
//! A binding without a resolved secret is not an error: projection then
//! only removes the binding's previous footprint.

use servicebinding_common::Error;
use thiserror::Error as ThisError;

use crate::path::PathError;

/// Errors that can occur while projecting or unprojecting a binding
#[derive(Debug, ThisError)]
pub enum ProjectionError {
    /// A mapping path failed to parse or could not be applied
    #[error("mapping field '{field}': {source}")]
    Path {
        /// Mapping field the path came from (e.g., "containers[1].env")
        field: String,
        /// Underlying path error
        #[source]
        source: PathError,
    },

    /// The workload could not be converted to or from its generic form
    #[error("workload conversion failed: {source}")]
    Conversion {
        /// Underlying serde error
        #[from]
        source: serde_json::Error,
    },

    /// Write-back matched a different number of container fragments than
    /// the view was built from
    #[error("container path '{path}' matched {found} fragments on write-back, expected {expected}")]
    FragmentMismatch {
        /// Container path that was re-evaluated
        path: String,
        /// Fragments seen when the view was built
        expected: usize,
        /// Fragments seen on write-back
        found: usize,
    },

    /// The workload document has no apiVersion or kind
    #[error("workload has no apiVersion/kind")]
    MissingTypeMeta,

    /// The binding has no UID to key its footprint by
    #[error("binding '{binding}' has no uid")]
    MissingBindingUid {
        /// Binding name
        binding: String,
    },
}

impl ProjectionError {
    /// Attach the mapping field a path error came from
    pub fn path(field: impl Into<String>, source: PathError) -> Self {
        Self::Path {
            field: field.into(),
            source,
        }
    }
}

impl From<ProjectionError> for Error {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::Path { ref field, .. } => {
                Error::validation_for_field("ClusterWorkloadResourceMapping", field.clone(), err.to_string())
            }
            ProjectionError::Conversion { source } => Error::serialization(source.to_string()),
            ProjectionError::FragmentMismatch { .. } => {
                Error::internal_with_context("projector", err.to_string())
            }
            ProjectionError::MissingTypeMeta => Error::validation_for("workload", err.to_string()),
            ProjectionError::MissingBindingUid { ref binding } => {
                Error::validation_for_field(binding.clone(), "metadata.uid", err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_error_names_the_mapping_field() {
        let source = PathError::Restricted {
            path: ".spec.containers[*]".to_string(),
            segment: "[*]".to_string(),
        };
        let err = ProjectionError::path("volumes", source);
        let msg = err.to_string();
        assert!(msg.contains("volumes"));
        assert!(msg.contains("[*]"));
    }

    #[test]
    fn mismatch_display_includes_counts() {
        let err = ProjectionError::FragmentMismatch {
            path: ".spec.containers[*]".to_string(),
            expected: 2,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "container path '.spec.containers[*]' matched 1 fragments on write-back, expected 2"
        );
    }

    #[test]
    fn converts_into_common_error() {
        let err: Error = ProjectionError::path(
            "annotations",
            PathError::Syntax {
                path: ".a[".to_string(),
                position: 3,
                message: "expected ']'".to_string(),
            },
        )
        .into();
        match err {
            Error::Validation { field, .. } => assert_eq!(field.as_deref(), Some("annotations")),
            other => panic!("expected validation error, got {:?}", other),
        }

        let err: Error = ProjectionError::MissingTypeMeta.into();
        assert!(!err.is_retryable());

        let err: Error = ProjectionError::FragmentMismatch {
            path: ".x[*]".to_string(),
            expected: 1,
            found: 0,
        }
        .into();
        assert!(matches!(err, Error::Internal { .. }));
    }

    #[test]
    fn conversion_error_from_serde() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ProjectionError = source.into();
        assert!(err.to_string().starts_with("workload conversion failed"));
    }
}
