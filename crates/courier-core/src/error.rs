//! Error types for the Courier agent.

use thiserror::Error;

/// A shared error type for every Courier crate.
///
/// Variants are typed so that the router can map them onto JSON-RPC error
/// codes, while `From` conversions keep `?` usable across I/O and codec
/// boundaries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CourierError {
    /// Entity not found error with type information
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system or transport operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "JSON", "TOML"
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request parameters did not match the method's schema
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A session method was called before `initialize`
    #[error("Not initialized")]
    NotInitialized,

    /// The client did not advertise the capability an agent→client call needs
    #[error("{0}")]
    Capability(String),

    /// A second prompt arrived while one is still running for the session
    #[error("prompt already in progress for this session")]
    PromptInProgress,

    /// The surrounding cancellation scope fired
    #[error("operation cancelled")]
    Cancelled,

    /// The client answered an agent→client call with a JSON-RPC error
    #[error("client returned error")]
    ClientError { method: String },

    /// The transport went away while a call was waiting for its response
    #[error("connection closed")]
    ConnectionClosed,

    /// `session/load` was requested but no conversation store is configured
    #[error("conversation store not available")]
    StoreUnavailable,

    /// The conversation store failed or has no record for the id
    #[error("failed to load conversation: {0}")]
    LoadFailed(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CourierError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an InvalidParams error
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Creates a Capability error
    pub fn capability(message: impl Into<String>) -> Self {
        Self::Capability(message.into())
    }

    /// Creates a ClientError for the given agent→client method
    pub fn client_error(method: impl Into<String>) -> Self {
        Self::ClientError {
            method: method.into(),
        }
    }

    /// Creates a LoadFailed error
    pub fn load_failed(message: impl Into<String>) -> Self {
        Self::LoadFailed(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this is an IO error
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Check if this is a capability error
    pub fn is_capability(&self) -> bool {
        matches!(self, Self::Capability(_))
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for CourierError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for CourierError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, CourierError>`.
pub type Result<T> = std::result::Result<T, CourierError>;
