//! Error types for directory sessions.
//!
//! Errors carry a transient/permanent classification: transient errors are
//! the transport-level failures absorbed by server failover, everything else
//! propagates to the caller unchanged.

use thiserror::Error;

/// Error that can occur while managing a directory session or mapping an
/// operation onto the wire protocol.
#[derive(Debug, Error)]
pub enum DirectoryError {
    // Configuration errors: surfaced before any network attempt.
    /// No servers have been registered.
    #[error("no directory servers defined")]
    NoServers,

    /// A mutating operation was attempted on a read-only client.
    #[error("running in read-only mode, directory modifications are disabled")]
    ReadOnly,

    /// The client configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // Transport errors: absorbed per-endpoint during failover.
    /// The server could not be reached.
    #[error("server unreachable: {message}")]
    Unreachable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The connect or operation timeout expired.
    #[error("timed out: {message}")]
    Timeout { message: String },

    /// A local, client-side transport failure.
    #[error("local transport error: {message}")]
    Local { message: String },

    // Referral errors.
    /// A referral signal did not carry a parseable directory URL.
    #[error("bad referral: {payload:?}")]
    BadReferral { payload: String },

    /// A referral was signalled by an operation that was already a referral
    /// retry; only a single hop is ever followed.
    #[error("referral not followed: {url}")]
    UnfollowedReferral { url: String },

    // Operation errors.
    /// The target entry does not exist.
    #[error("no such object: {dn}")]
    NotFound { dn: String },

    /// An entry with the target DN already exists.
    #[error("entry already exists: {dn}")]
    AlreadyExists { dn: String },

    /// The server rejected the bind credentials.
    #[error("invalid credentials for {bind_dn:?}")]
    InvalidCredentials { bind_dn: String },

    /// A value could not be converted between the API and directory
    /// encodings.
    #[error("encoding failed: {message}")]
    Encoding { message: String },

    /// A distinguished name could not be parsed.
    #[error("invalid distinguished name: {dn:?}")]
    InvalidDn { dn: String },

    /// Any other protocol-level failure, carrying the server's result
    /// diagnostics.
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DirectoryError {
    /// Whether failover should absorb this error and try the next server.
    ///
    /// Matches the transport conditions the connect loop tolerates:
    /// unreachable, timeout, and local client-side failures.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectoryError::Unreachable { .. }
                | DirectoryError::Timeout { .. }
                | DirectoryError::Local { .. }
        )
    }

    // Convenience constructors

    /// Create an unreachable-server error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        DirectoryError::Unreachable {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unreachable-server error with the underlying cause.
    pub fn unreachable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Unreachable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        DirectoryError::Timeout {
            message: message.into(),
        }
    }

    /// Create a local transport error.
    pub fn local(message: impl Into<String>) -> Self {
        DirectoryError::Local {
            message: message.into(),
        }
    }

    /// Create an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        DirectoryError::Encoding {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        DirectoryError::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error with the underlying cause.
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Protocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid-configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        DirectoryError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for directory session operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
