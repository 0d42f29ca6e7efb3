use crate::DocId;

pub type MetaResult<T> = std::result::Result<T, MetaIndexError>;

#[derive(Debug, thiserror::Error)]
pub enum MetaIndexError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Tuple has {actual} values but the structure declares {expected} keys")]
    ArityMismatch { expected: usize, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Key {0} is not declared by this structure")]
    KeyNotFound(String),
    #[error("Document id {id} is out of range for a structure of {size} documents")]
    OutOfRange { id: DocId, size: usize },
    #[error("Reverse lookup is not supported for key {0}")]
    UnsupportedOperation(String),
    #[error("Builder for structure {0} is closed")]
    BuilderClosed(String),
    #[error("Meta index {0} is closed")]
    ReaderClosed(String),
    #[error("Document id space exhausted while appending to key {0}")]
    DocumentLimit(String),
    #[error("Corrupt artifact: {0}")]
    Corrupt(String),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Failed to encode or decode resolution: {0}")]
    Resolution(#[from] serde_json::Error),
    #[error("Invalid property {key}: {reason}")]
    Properties { key: String, reason: String },
    #[error("Structure {0} does not exist or cannot be discovered.")]
    StructureNotFound(String),
    #[error("Failed to build reverse index worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
