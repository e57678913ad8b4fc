//! Error types for the extip system
//!
//! Every runtime failure here is recoverable: the engine logs it and the next
//! reconciliation pass recomputes the diff from scratch.

use thiserror::Error;

/// Result type alias for extip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the extip system
#[derive(Error, Debug)]
pub enum Error {
    /// Interface missing, or present without an IPv4 address
    #[error("no IPv4 address found for interface [{interface}] in [{}]", known.join(","))]
    SampleNotFound {
        /// Interface that was sampled
        interface: String,
        /// Every interface name known at sampling time
        known: Vec<String>,
    },

    /// The local interface table could not be read
    #[error("failed to get interfaces: {0}")]
    InterfaceEnumeration(String),

    /// Cluster-wide service listing failed
    #[error("error listing services: {0}")]
    List(String),

    /// Writing a single service failed
    #[error("error updating service {namespace}/{name}: {message}")]
    Update {
        /// Service namespace
        namespace: String,
        /// Service name
        name: String,
        /// Underlying failure
        message: String,
    },

    /// A cluster call exceeded the configured API timeout
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Timeout in seconds
        secs: u64,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a "sample not found" error
    pub fn sample_not_found(interface: impl Into<String>, known: Vec<String>) -> Self {
        Self::SampleNotFound {
            interface: interface.into(),
            known,
        }
    }

    /// Create an interface enumeration error
    pub fn enumeration(msg: impl Into<String>) -> Self {
        Self::InterfaceEnumeration(msg.into())
    }

    /// Create a list error
    pub fn list(msg: impl Into<String>) -> Self {
        Self::List(msg.into())
    }

    /// Create an update error for a single service
    pub fn update(
        namespace: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Update {
            namespace: namespace.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this is the `NotFound` class of sampling failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SampleNotFound { .. })
    }
}
