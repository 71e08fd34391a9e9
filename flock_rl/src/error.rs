//! Crate-level error type.

use thiserror::Error;

use crate::buffers::BufferError;
use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::distributed::CollectiveError;

/// Result type for flock_rl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Any error raised while training.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Collective(#[from] CollectiveError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Env(#[from] flock_envs::EnvError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Burn recorder failure while (de)serializing weights.
    #[error("recorder error: {0}")]
    Recorder(String),

    /// A peer sent a message the protocol does not allow at this point.
    #[error("protocol error on rank {rank}: {message}")]
    Protocol { rank: usize, message: String },

    /// A rank panicked or its thread could not be spawned.
    #[error("rank {rank} failed: {message}")]
    Rank { rank: usize, message: String },
}

impl Error {
    pub(crate) fn protocol(rank: usize, message: impl Into<String>) -> Self {
        Self::Protocol {
            rank,
            message: message.into(),
        }
    }

    /// Whether this error only reports that a peer went away.
    ///
    /// When one rank fails its peers see disconnects; the launcher reports
    /// the root cause instead.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Collective(CollectiveError::Disconnected { .. })
        )
    }
}
