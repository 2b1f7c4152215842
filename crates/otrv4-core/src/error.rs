//! Error types for the OTRv4 protocol core.

use otrv4_crypto::CryptoError;
use thiserror::Error;

/// Result type alias using the OTRv4 core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
///
/// None of the protocol variants are retryable: a failed exchange surfaces to
/// the caller and any secret scratch has already been dropped.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrong version or type, truncation, trailing bytes, bad field order.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Off-curve or small-order point, out-of-subgroup DH value, non-canonical
    /// scalar, or a signature, MAC, proof or profile that does not verify.
    #[error("Invalid cryptographic value: {0}")]
    InvalidCryptographicValue(String),

    /// A size bound was exceeded.
    #[error("Resource limit exceeded: {0}")]
    Resource(String),

    /// A message arrived that is not valid in the current protocol state.
    #[error("Protocol state violation: {0}")]
    ProtocolStateViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidLength { .. } => Self::MalformedMessage(err.to_string()),
            _ => Self::InvalidCryptographicValue(err.to_string()),
        }
    }
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMessage(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidCryptographicValue(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        Self::ProtocolStateViolation(msg.into())
    }
}
