use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for dataset inspection and segmentation inference.
///
/// Each variant carries the context of its failure domain (manifests, lookups,
/// images, model sessions) so callers can match on the kind of failure rather
/// than parse messages.
#[derive(Error, Debug)]
pub enum AgriVisionError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Missing {what}: {path:?} does not exist")]
    MissingResource { what: String, path: PathBuf },

    #[error("{what} {key:?} was not found in the dataset")]
    NotFound { what: String, key: String },

    #[error("Identifier {id:?} appears in both the {first} and {second} manifests")]
    DuplicateIdentifier {
        id: String,
        first: String,
        second: String,
    },

    #[error("Image {id:?} does not share the category set of the first sampled image")]
    InconsistentCategories { id: String },

    #[error("Invalid {kind} shortcut keyword {value:?}")]
    InvalidShortcut { kind: String, value: String },

    #[error("Manifest error: failed to parse {path:?}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AgriVisionError>;

impl AgriVisionError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(what: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            key: key.into(),
        }
    }

    pub(crate) fn missing(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingResource {
            what: what.into(),
            path: path.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Call sites that know the path and operation should build
/// `AgriVisionError::FileSystem` directly; this is the fallback.
impl From<std::io::Error> for AgriVisionError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for AgriVisionError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ONNX Runtime errors to model errors.
impl From<ort::Error> for AgriVisionError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors come out of tensor reshaping around inference, so they are
/// reported as model errors.
impl From<ndarray::ShapeError> for AgriVisionError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_value() {
        let err = AgriVisionError::not_found("image", "ABC123");
        assert_eq!(err.to_string(), "image \"ABC123\" was not found in the dataset");

        let err = AgriVisionError::InvalidShortcut {
            kind: "auxiliary object".to_string(),
            value: "unknown".to_string(),
        };
        assert!(err.to_string().contains("\"unknown\""));
    }

    #[test]
    fn test_io_error_conversion() {
        let err: AgriVisionError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, AgriVisionError::FileSystem { .. }));
    }
}
