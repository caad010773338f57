use thiserror::Error;

/// Errors produced by the envelope codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Envelope text is not valid base64 or is shorter than the fixed header.
    #[error("malformed envelope: {0}")]
    Format(String),
    /// Tag verification failed. Wrong secret and tampered data look the same.
    #[error("wrong secret or corrupted data")]
    Authentication,
    /// Key derivation or cipher setup failed.
    #[error("key derivation failed: {0}")]
    Kdf(String),
}

/// Errors surfaced by the store engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing secret, or wrong secret detected while loading. Fatal to construction.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
    /// Malformed envelope text.
    #[error("format error: {reason}")]
    Format { reason: String },
    /// Tag verification failure.
    #[error("wrong secret or corrupted data")]
    Authentication,
    /// Payload authenticated but is not a valid serialized mapping.
    #[error("store is corrupted: {reason}")]
    Corruption { reason: String },
    /// Underlying read or write failure.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// Arithmetic produced NaN or infinity, which JSON cannot hold.
    #[error("number is not finite")]
    NonFiniteNumber,
    /// Key derivation or cipher setup failed.
    #[error("key derivation failed: {reason}")]
    Kdf { reason: String },
}

impl StoreError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn corruption(reason: impl Into<String>) -> Self {
        Self::Corruption {
            reason: reason.into(),
        }
    }
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Format(reason) => StoreError::Format { reason },
            CodecError::Authentication => StoreError::Authentication,
            CodecError::Kdf(reason) => StoreError::Kdf { reason },
        }
    }
}
