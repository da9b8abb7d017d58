//! Error types for the rescue tool

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the rescue tool
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Interface descriptor error: {0}")]
    Descriptor(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    // Encoding errors
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Argument type mismatch for {method}: {reason}")]
    ArgumentTypeMismatch { method: String, reason: String },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    // Signing errors
    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Nonce fetch failed: {0}")]
    NonceFetch(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    // Relay errors
    #[error("Relay bundle submission failed: {0}")]
    RelaySubmission(String),

    #[error("Relay rejected bundle: {0}")]
    RelayRejected(String),

    #[error("Target block {target_block} not resolved within {waited_ms}ms")]
    OutcomeTimeout { target_block: u64, waited_ms: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    // Funding errors
    #[error("Insufficient gas funds: {available} wei available, {required} wei required")]
    InsufficientGasFunds { available: String, required: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::NonceFetch(_)
                | Error::RelaySubmission(_)
        )
    }

    /// Configuration and encoding errors stop the run before any network call
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::MissingEnvVar(_)
                | Error::InvalidCredential(_)
                | Error::Descriptor(_)
                | Error::InvalidAmount(_)
                | Error::InvalidDestination(_)
                | Error::UnknownMethod(_)
                | Error::ArgumentTypeMismatch { .. }
                | Error::Encoding(_)
        )
    }
}

// Conversion from ethers provider errors
impl From<ethers::providers::ProviderError> for Error {
    fn from(e: ethers::providers::ProviderError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from HTTP client errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::RelaySubmission(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(Error::UnknownMethod("transfer".into()).is_fatal());
        assert!(Error::InvalidAmount("zero".into()).is_fatal());
        assert!(!Error::Rpc("reset".into()).is_fatal());

        assert!(Error::RpcTimeout(500).is_retryable());
        assert!(Error::RelaySubmission("503".into()).is_retryable());
        assert!(!Error::RelayRejected("bad bundle".into()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }
}
