//! Signing error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum SigningError {
    #[error("failed to read signing key {path}: {message}")]
    KeyRead { path: String, message: String },

    #[error("failed to parse signing key {path}: {message}")]
    KeyParse { path: String, message: String },

    #[error("failed to generate signing key: {message}")]
    KeyGeneration { message: String },

    #[error("signature computation failed: {message}")]
    SignatureFailed { message: String },
}
