//! Error types for reconciliation and device access.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating declared input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Virtual server name is required")]
    NameRequired,

    #[error("Invalid name '{0}': names may not contain whitespace or '~'")]
    InvalidName(String),

    #[error("Invalid partition '{0}'")]
    InvalidPartition(String),

    #[error("Invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("Destination port {destination} conflicts with port {port}")]
    PortConflict { destination: u16, port: u16 },

    #[error("A destination is required to create virtual server {0}")]
    DestinationRequired(String),

    #[error("'ALL' cannot be combined with named VLANs")]
    MixedVlans,

    #[error("Invalid profile context '{0}'")]
    InvalidProfileContext(String),

    #[error("A profile list cannot be empty")]
    EmptyProfiles,

    #[error("'profiles' and 'all_profiles' cannot both be supplied for an existing virtual server")]
    ProfilesConflict,
}

/// Errors returned by the reconciler and the device clients.
#[derive(Debug, Error)]
pub enum Error {
    /// Target resource does not exist on the device.
    #[error("not found: {0}")]
    NotFound(String),

    /// The device could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The device refused the credentials or token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The desired state is malformed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The device rejected the operation.
    #[error("device rejected request ({status}): {message}")]
    Device { status: u16, message: String },

    /// A device call exceeded its deadline.
    #[error("device call timed out after {0:?}")]
    Timeout(Duration),
}

/// Serializable classification of [`Error`], reported in operation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    ConnectionError,
    AuthenticationError,
    ValidationError,
    DeviceError,
    Timeout,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Connection(_) => ErrorKind::ConnectionError,
            Error::Authentication(_) => ErrorKind::AuthenticationError,
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::Device { .. } => ErrorKind::DeviceError,
            Error::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type for reconciler and client operations.
pub type Result<T> = std::result::Result<T, Error>;
