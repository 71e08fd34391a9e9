//! Buffer of complete episodes.

use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{BufferError, TensorDict};

/// Key holding the episode termination flags.
pub const DONES_KEY: &str = "dones";

/// Stores whole episodes up to `buffer_size` total steps, evicting the oldest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeBuffer {
    buffer_size: usize,
    sequence_length: usize,
    episodes: VecDeque<TensorDict>,
    steps: usize,
}

impl EpisodeBuffer {
    pub fn new(buffer_size: usize, sequence_length: usize) -> Result<Self, BufferError> {
        if sequence_length == 0 {
            return Err(BufferError::Invalid("sequence_length must be positive".into()));
        }
        if buffer_size < sequence_length {
            return Err(BufferError::Invalid(format!(
                "buffer_size ({buffer_size}) must be at least sequence_length ({sequence_length})"
            )));
        }
        Ok(Self {
            buffer_size,
            sequence_length,
            episodes: VecDeque::new(),
            steps: 0,
        })
    }

    /// Total stored steps.
    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }

    pub fn n_episodes(&self) -> usize {
        self.episodes.len()
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Add one episode shaped `[len]` or `[len, 1]`.
    ///
    /// The episode needs a `dones` field with a single done on its last step
    /// and at least `sequence_length` steps.
    pub fn add(&mut self, episode: TensorDict) -> Result<(), BufferError> {
        let shape = episode.batch_shape();
        let valid_shape = matches!(shape, [_] | [_, 1]);
        if !valid_shape {
            return Err(BufferError::BatchShape {
                expected: vec![episode.len(), 1],
                actual: shape.to_vec(),
            });
        }
        let len = episode.len();
        if len < self.sequence_length {
            return Err(BufferError::Invalid(format!(
                "episode of {len} steps is shorter than sequence_length ({})",
                self.sequence_length
            )));
        }
        if len > self.buffer_size {
            return Err(BufferError::Invalid(format!(
                "episode of {len} steps exceeds buffer_size ({})",
                self.buffer_size
            )));
        }

        let dones = episode.data(DONES_KEY)?;
        if dones.len() != len {
            return Err(BufferError::FeatureShape {
                key: DONES_KEY.to_string(),
                expected: vec![1],
                actual: vec![dones.len() / len.max(1)],
            });
        }
        if dones[..len - 1].iter().any(|&d| d != 0.0) || dones[len - 1] == 0.0 {
            return Err(BufferError::Invalid(
                "an episode must contain exactly one done, on its last step".into(),
            ));
        }

        if let Some(first) = self.episodes.front() {
            for (key, field) in first.iter() {
                let incoming = episode
                    .get(key)
                    .ok_or_else(|| BufferError::MissingKey(key.to_string()))?;
                if incoming.feature_shape() != field.feature_shape() {
                    return Err(BufferError::FeatureShape {
                        key: key.to_string(),
                        expected: field.feature_shape().to_vec(),
                        actual: incoming.feature_shape().to_vec(),
                    });
                }
            }
            if let Some(extra) = episode.keys().find(|k| !first.contains_key(k)) {
                return Err(BufferError::UnexpectedKey(extra.to_string()));
            }
        }

        while self.steps + len > self.buffer_size {
            match self.episodes.pop_front() {
                Some(old) => self.steps -= old.len(),
                None => break,
            }
        }
        self.steps += len;
        self.episodes.push_back(episode.flatten_batch());
        Ok(())
    }

    /// Sample `[n_samples, sequence_length, batch_size, *]` windows.
    ///
    /// With `prioritize_ends` the start is drawn over the whole episode and
    /// clamped, which oversamples windows that end on the terminal step.
    pub fn sample_sequences<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        n_samples: usize,
        prioritize_ends: bool,
        rng: &mut R,
    ) -> Result<TensorDict, BufferError> {
        if batch_size == 0 || n_samples == 0 {
            return Err(BufferError::Invalid(
                "batch_size and n_samples must be positive".into(),
            ));
        }
        if self.episodes.is_empty() {
            return Err(BufferError::Empty);
        }

        let seq = self.sequence_length;
        // (episode, first step) for every column
        let mut picks = Vec::with_capacity(n_samples * batch_size);
        for _ in 0..n_samples * batch_size {
            let ep = rng.gen_range(0..self.episodes.len());
            let ep_len = self.episodes[ep].len();
            let first = if prioritize_ends {
                rng.gen_range(0..ep_len).min(ep_len - seq)
            } else {
                rng.gen_range(0..=ep_len - seq)
            };
            picks.push((ep, first));
        }

        let mut out = TensorDict::new(vec![n_samples, seq, batch_size]);
        let template = &self.episodes[0];
        for (key, field) in template.iter() {
            let size = field.feature_size();
            let mut data = vec![0.0; n_samples * seq * batch_size * size];
            for s in 0..n_samples {
                for b in 0..batch_size {
                    let (ep, first) = picks[s * batch_size + b];
                    let src = self.episodes[ep]
                        .get(key)
                        .ok_or_else(|| BufferError::MissingKey(key.to_string()))?;
                    for l in 0..seq {
                        let dst = ((s * seq + l) * batch_size + b) * size;
                        data[dst..dst + size].copy_from_slice(src.row(first + l));
                    }
                }
            }
            out.insert(key, field.feature_shape(), data)?;
        }
        Ok(out)
    }
}
