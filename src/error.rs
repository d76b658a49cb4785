//! Error types for tiling and subvolume processing

use thiserror::Error;

/// Main error type for processing operations
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Processor '{0}' does not implement process()")]
    NotImplemented(String),

    #[error("No processor named '{name}' in '{namespace}'")]
    UnknownProcessor { name: String, namespace: String },

    #[error("Invalid processor arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error(
        "Assigned overlap {assigned:?} is smaller than the processor minimum {required:?}"
    )]
    InsufficientOverlap { assigned: [i64; 3], required: [i64; 3] },

    #[error("Geometry mismatch: {0}")]
    GeometryMismatch(String),

    #[error("Degenerate crop: context front {front:?} + back {back:?} exceeds box size {size:?}")]
    DegenerateCrop {
        front: [i64; 3],
        back: [i64; 3],
        size: [i64; 3],
    },

    #[error("Invalid bounding box: {0}")]
    InvalidBox(String),

    #[error("Data type mismatch: expected {expected}, got {actual}")]
    DataTypeMismatch {
        expected: crate::types::DataType,
        actual: crate::types::DataType,
    },

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Specialized Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

impl From<bincode::Error> for ProcessingError {
    fn from(err: bincode::Error) -> Self {
        ProcessingError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ProcessingError {
    fn from(err: serde_json::Error) -> Self {
        ProcessingError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ProcessingError {
    fn from(err: tokio::task::JoinError) -> Self {
        ProcessingError::Worker(err.to_string())
    }
}

impl ProcessingError {
    /// Whether this error stems from configuration rather than tile data
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProcessingError::UnknownProcessor { .. }
                | ProcessingError::InvalidArguments { .. }
                | ProcessingError::InsufficientOverlap { .. }
                | ProcessingError::DegenerateCrop { .. }
                | ProcessingError::Configuration(_)
        )
    }
}
