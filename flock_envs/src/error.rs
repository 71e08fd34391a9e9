//! Error types for flock environments.

use thiserror::Error;

/// Result type for environment operations.
pub type Result<T> = std::result::Result<T, EnvError>;

/// Errors raised while building or stepping environments.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// Invalid configuration (num_envs = 0, empty action space, etc.)
    #[error("invalid configuration for '{param}': {message}")]
    InvalidConfig { param: String, message: String },

    /// The flat action buffer does not match `n_envs * action_dim`.
    #[error("action buffer size mismatch: expected {expected}, got {actual}")]
    ActionSizeMismatch { expected: usize, actual: usize },

    /// No environment registered under this id.
    #[error("unknown environment id '{0}'")]
    UnknownEnv(String),
}

impl EnvError {
    pub(crate) fn invalid(param: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            param: param.to_string(),
            message: message.into(),
        }
    }
}
