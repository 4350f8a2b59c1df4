//! Package emission error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum BuildError {
    #[error("workspace directory {path} unavailable: {message}")]
    Workspace { path: String, message: String },

    #[error("malformed dependency declaration: {entry:?}")]
    MalformedDependency { entry: String },

    #[error("archive error: {message}")]
    Archive { message: String },

    #[error("compression error: {message}")]
    Compression { message: String },

    #[error("emission failed for {identity}: {message}")]
    EmissionFailed { identity: String, message: String },
}
