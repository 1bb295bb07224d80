use thiserror::Error;

/// Error type used throughout the crate.
#[derive(Error, Debug)]
pub enum AlarmError {
    /// I/O related failure
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A required construction option was not supplied
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    /// A node reference does not map to a live, value-bearing node
    #[error("Cannot resolve node reference '{reference}': {reason}")]
    Resolution { reference: String, reason: String },

    /// The operation is part of the contract but is not implemented
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// A node with the same id already exists in the address space
    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    /// A value was written to a node that carries no value
    #[error("Node carries no value: {0}")]
    NotAVariable(String),

    /// Requested node was not found in the address space
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A condition event could not be delivered to its sink
    #[error("Notification error: {0}")]
    Notification(String),

    /// Text could not be parsed as a node id
    #[error("Invalid node id '{0}'")]
    InvalidNodeId(String),
}

impl AlarmError {
    pub(crate) fn resolution(reference: impl ToString, reason: impl Into<String>) -> Self {
        AlarmError::Resolution {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenient alias over [`Result`] using [`AlarmError`]
pub type Result<T> = std::result::Result<T, AlarmError>;
