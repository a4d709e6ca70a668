// FieldPose 🚀 AGPL-3.0 License

//! Error types for the decoding library.

use std::fmt;

/// Result type alias for decoding operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Main error type for the decoding library.
#[derive(Debug)]
pub enum DecodeError {
    /// Invalid decoder configuration provided.
    ConfigError(String),
    /// Field tensor has an unexpected shape or channel layout.
    FieldError(String),
    /// Skeleton definition is inconsistent (bad joint index, empty edge set, ...).
    SkeletonError(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::FieldError(msg) => write!(f, "Field error: {msg}"),
            Self::SkeletonError(msg) => write!(f, "Skeleton error: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}
