use thiserror::Error;

/// Unified error type for the lockstep writer.
///
/// Every protocol variant describes a broken invariant shared by the whole
/// group. None of them are retried: a member that hits one must bring the
/// group down with it.
#[derive(Debug, Error)]
pub enum LockstepError {
    /// An entry number was presented past the growth threshold or went backwards
    #[error("Entry {entry} is out of order (previous: {previous:?}, next growth threshold: {threshold})")]
    OutOfOrderEntry {
        entry: u64,
        previous: Option<u64>,
        threshold: u64,
    },

    /// A registered array does not have the length the growth clock expects
    #[error("Array {path} has length {actual}, expected {expected}")]
    LengthMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("Path already registered: {path}")]
    DuplicatePath { path: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid shape: {reason}")]
    InvalidShape { reason: String },

    #[error("Record shape {actual:?} does not match element shape {expected:?} of {path}")]
    ShapeMismatch {
        path: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Record dtype {actual} does not match dtype {expected} of {path}")]
    DTypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Index {index} out of bounds for {path} (length {len})")]
    OutOfBounds { path: String, index: u64, len: u64 },

    /// A late array could not be back-filled to the current growth threshold
    #[error("Array {path} created after growth could not be back-filled to {threshold}")]
    CreateAfterGrowth {
        path: String,
        threshold: u64,
        #[source]
        source: Box<LockstepError>,
    },

    #[error("Registry is sealed, cannot {operation}")]
    Closed { operation: String },

    /// Growth requested before any array exists
    #[error("Registry has no arrays yet, cannot {operation}")]
    NotWritable { operation: String },

    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    #[error("Unknown array: {path}")]
    UnknownArray { path: String },

    /// Members submitted different arguments to the same collective call
    #[error("Collective mismatch at member {member}: expected {expected}, got {actual}")]
    CollectiveMismatch {
        member: usize,
        expected: String,
        actual: String,
    },

    #[error("Group aborted: {reason}")]
    GroupAborted { reason: String },

    /// Failure inside the array store
    #[error("Backend operation {operation} failed: {message}")]
    Backend { operation: String, message: String },

    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: sled::Error,
    },

    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LockstepError {
    pub fn invalid_path<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_shape<R: Into<String>>(reason: R) -> Self {
        Self::InvalidShape {
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn closed<S: Into<String>>(operation: S) -> Self {
        Self::Closed {
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn backend<O: Into<String>, M: Into<String>>(operation: O, message: M) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn database<S: Into<String>>(operation: S, source: sled::Error) -> Self {
        Self::Database {
            operation: operation.into(),
            source,
        }
    }

    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error was induced by another member failing first
    pub fn is_induced(&self) -> bool {
        matches!(self, Self::GroupAborted { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::OutOfOrderEntry { .. } | Self::LengthMismatch { .. } => "growth",
            Self::DuplicatePath { .. }
            | Self::InvalidPath { .. }
            | Self::InvalidShape { .. }
            | Self::UnknownArray { .. } => "registry",
            Self::ShapeMismatch { .. } | Self::DTypeMismatch { .. } | Self::OutOfBounds { .. } => {
                "write"
            }
            Self::CreateAfterGrowth { .. } => "backfill",
            Self::Closed { .. } | Self::NotWritable { .. } => "lifecycle",
            Self::InvalidParameter { .. } | Self::Configuration { .. } => "configuration",
            Self::CollectiveMismatch { .. } | Self::GroupAborted { .. } => "collective",
            Self::Backend { .. } | Self::Database { .. } => "backend",
            Self::Serialization { .. } => "serialization",
            Self::Io { .. } => "io",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, LockstepError>;

impl From<std::io::Error> for LockstepError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<sled::Error> for LockstepError {
    fn from(err: sled::Error) -> Self {
        Self::database("sled_operation", err)
    }
}

impl From<bincode::Error> for LockstepError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization("bincode", err)
    }
}

impl From<serde_json::Error> for LockstepError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for LockstepError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

impl From<anyhow::Error> for LockstepError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}
