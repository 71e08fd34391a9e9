//! Replay buffer that samples contiguous sequences.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{BufferError, ReplayBuffer, TensorDict};

/// Ring buffer sampling `[n_samples, sequence_length, batch_size, *]` windows.
///
/// Every column of a sample is a run of consecutive timesteps of one
/// environment. Windows are taken in chronological order, so a sequence never
/// straddles the write position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialReplayBuffer {
    inner: ReplayBuffer,
}

impl SequentialReplayBuffer {
    pub fn new(buffer_size: usize, n_envs: usize) -> Result<Self, BufferError> {
        Ok(Self {
            inner: ReplayBuffer::new(buffer_size, n_envs)?,
        })
    }

    pub fn add(&mut self, data: &TensorDict) -> Result<(), BufferError> {
        self.inner.add(data)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    pub fn inner(&self) -> &ReplayBuffer {
        &self.inner
    }

    pub fn sample_sequences<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        sequence_length: usize,
        n_samples: usize,
        rng: &mut R,
    ) -> Result<TensorDict, BufferError> {
        if batch_size == 0 || sequence_length == 0 || n_samples == 0 {
            return Err(BufferError::Invalid(
                "batch_size, sequence_length and n_samples must be positive".into(),
            ));
        }
        let len = self.inner.len();
        if len < sequence_length {
            return Err(BufferError::NotEnoughData(format!(
                "{len} timesteps stored, sequences need {sequence_length}"
            )));
        }

        let n_envs = self.inner.n_envs();
        let size = self.inner.buffer_size();
        // oldest stored timestep
        let start_pos = if self.inner.is_full() { self.inner.pos() } else { 0 };

        // rows[(s * sequence_length + l) * batch_size + b]
        let mut rows = vec![0usize; n_samples * sequence_length * batch_size];
        for s in 0..n_samples {
            for b in 0..batch_size {
                let env = rng.gen_range(0..n_envs);
                let first = rng.gen_range(0..=len - sequence_length);
                for l in 0..sequence_length {
                    let t = (start_pos + first + l) % size;
                    rows[(s * sequence_length + l) * batch_size + b] = t * n_envs + env;
                }
            }
        }

        self.inner
            .storage()
            .select(&rows)
            .reshape_batch(vec![n_samples, sequence_length, batch_size])
    }
}
