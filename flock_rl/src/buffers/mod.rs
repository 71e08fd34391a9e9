//! Experience storage.
//!
//! - [`TensorDict`]: named flat `f32` fields sharing a batch shape
//! - [`ReplayBuffer`]: ring buffer over `(T, B, *)` timesteps, used for PPO
//!   rollouts and SAC replay
//! - [`SequentialReplayBuffer`]: samples contiguous per-env windows
//! - [`EpisodeBuffer`]: stores whole episodes and samples windows from them

pub mod episode_buffer;
pub mod replay_buffer;
pub mod sequential;
pub mod tensor_dict;

pub use episode_buffer::EpisodeBuffer;
pub use replay_buffer::ReplayBuffer;
pub use sequential::SequentialReplayBuffer;
pub use tensor_dict::{Field, TensorDict};

use thiserror::Error;

/// Errors raised by buffers and [`TensorDict`] operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BufferError {
    #[error("field `{key}` has {actual} floats, expected {expected}")]
    DataLength {
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error("batch shape {actual:?} does not match {expected:?}")]
    BatchShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("missing key `{0}`")]
    MissingKey(String),

    #[error("unexpected key `{0}`")]
    UnexpectedKey(String),

    #[error("field `{key}` has feature shape {actual:?}, expected {expected:?}")]
    FeatureShape {
        key: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("buffer is empty")]
    Empty,

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("not enough data: {0}")]
    NotEnoughData(String),
}
