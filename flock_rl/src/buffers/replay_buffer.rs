//! Ring replay buffer with `(T, B, *)` fields.
//!
//! The buffer holds `buffer_size` timesteps of `n_envs` parallel environments.
//! Every `add` writes `t` new timesteps at the write position `pos`, wrapping
//! around once the capacity is reached.
//!
//! # Layout
//!
//! ```text
//! field data: [t0_env0, t0_env1, ..., t1_env0, t1_env1, ...]  (each row = feature floats)
//!               ^-- row index = t * n_envs + env
//! ```
//!
//! For on-policy rollouts use `buffer_size == rollout_steps`, so one rollout
//! fills the buffer exactly once.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{BufferError, TensorDict};

/// Ring buffer over `(buffer_size, n_envs)` timesteps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayBuffer {
    buffer_size: usize,
    n_envs: usize,
    pos: usize,
    full: bool,
    storage: TensorDict,
}

impl ReplayBuffer {
    pub fn new(buffer_size: usize, n_envs: usize) -> Result<Self, BufferError> {
        if buffer_size == 0 {
            return Err(BufferError::Invalid("buffer_size must be positive".into()));
        }
        if n_envs == 0 {
            return Err(BufferError::Invalid("n_envs must be positive".into()));
        }
        Ok(Self {
            buffer_size,
            n_envs,
            pos: 0,
            full: false,
            storage: TensorDict::new(vec![buffer_size, n_envs]),
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn n_envs(&self) -> usize {
        self.n_envs
    }

    /// Next timestep to be written.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Number of valid timesteps.
    pub fn len(&self) -> usize {
        if self.full {
            self.buffer_size
        } else {
            self.pos
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.storage.keys()
    }

    /// Raw storage in physical (not chronological) order.
    pub fn storage(&self) -> &TensorDict {
        &self.storage
    }

    /// Forget all data but keep the allocated fields.
    pub fn clear(&mut self) {
        self.pos = 0;
        self.full = false;
    }

    /// Append `t` timesteps from a dict shaped `[t, n_envs, *]`.
    ///
    /// The first `add` fixes the key set and feature shapes. When `t`
    /// exceeds the capacity only the last `buffer_size` timesteps are kept.
    pub fn add(&mut self, data: &TensorDict) -> Result<(), BufferError> {
        let shape = data.batch_shape();
        if shape.len() != 2 || shape[1] != self.n_envs {
            return Err(BufferError::BatchShape {
                expected: vec![shape.first().copied().unwrap_or(0), self.n_envs],
                actual: shape.to_vec(),
            });
        }
        let steps = shape[0];
        if steps == 0 {
            return Ok(());
        }
        self.check_keys(data)?;

        let skip = steps.saturating_sub(self.buffer_size);
        let kept = steps - skip;
        for (key, src) in data.iter() {
            let row = self.n_envs * src.feature_size();
            let dst = self
                .storage
                .get_mut(key)
                .ok_or_else(|| BufferError::MissingKey(key.to_string()))?
                .data_mut();
            for i in 0..kept {
                let t = (self.pos + i) % self.buffer_size;
                let from = (skip + i) * row;
                dst[t * row..(t + 1) * row].copy_from_slice(&src.data()[from..from + row]);
            }
        }

        let next = self.pos + kept;
        if next >= self.buffer_size {
            self.full = true;
        }
        self.pos = next % self.buffer_size;
        Ok(())
    }

    fn check_keys(&mut self, data: &TensorDict) -> Result<(), BufferError> {
        if self.storage.keys().next().is_none() {
            let rows = self.buffer_size * self.n_envs;
            for (key, field) in data.iter() {
                self.storage.insert(
                    key,
                    field.feature_shape(),
                    vec![0.0; rows * field.feature_size()],
                )?;
            }
            return Ok(());
        }

        for (key, field) in self.storage.iter() {
            let incoming = data
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
        if let Some(extra) = data.keys().find(|k| !self.storage.contains_key(k)) {
            return Err(BufferError::UnexpectedKey(extra.to_string()));
        }
        Ok(())
    }

    /// Physical timestep of the `k`-th oldest valid timestep.
    fn physical(&self, k: usize) -> usize {
        if self.full {
            (self.pos + k) % self.buffer_size
        } else {
            k
        }
    }

    /// Stored data in chronological order, shaped `[len(), n_envs, *]`.
    pub fn to_dict(&self) -> Result<TensorDict, BufferError> {
        let n_envs = self.n_envs;
        let rows: Vec<usize> = (0..self.len())
            .flat_map(|k| {
                let t = self.physical(k);
                (0..n_envs).map(move |env| t * n_envs + env)
            })
            .collect();
        // select() flattens; restore the time/env split.
        self.storage
            .select(&rows)
            .reshape_batch(vec![self.len(), n_envs])
    }

    /// Sample `batch_size` uniformly random `(t, env)` rows.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<TensorDict, BufferError> {
        self.sample_next(batch_size, &[], rng)
    }

    /// Like [`sample`](Self::sample), also returning `next_<key>` read at
    /// timestep `t + 1` for every key in `next_keys`.
    ///
    /// With `next_keys` non-empty the newest timestep is never sampled,
    /// since its successor is not stored yet.
    pub fn sample_next<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        next_keys: &[&str],
        rng: &mut R,
    ) -> Result<TensorDict, BufferError> {
        if batch_size == 0 {
            return Err(BufferError::Invalid("batch_size must be positive".into()));
        }
        if self.is_empty() {
            return Err(BufferError::Empty);
        }
        let valid = if next_keys.is_empty() {
            self.len()
        } else {
            self.len() - 1
        };
        if valid == 0 {
            return Err(BufferError::NotEnoughData(
                "need at least two timesteps to sample successors".into(),
            ));
        }

        let mut rows = Vec::with_capacity(batch_size);
        let mut next_rows = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let t = self.physical(rng.gen_range(0..valid));
            let env = rng.gen_range(0..self.n_envs);
            rows.push(t * self.n_envs + env);
            next_rows.push(((t + 1) % self.buffer_size) * self.n_envs + env);
        }

        let mut out = self.storage.select(&rows);
        for &key in next_keys {
            let field = self
                .storage
                .get(key)
                .ok_or_else(|| BufferError::MissingKey(key.to_string()))?;
            let size = field.feature_size();
            let mut data = Vec::with_capacity(batch_size * size);
            for &row in &next_rows {
                data.extend_from_slice(field.row(row));
            }
            let feature_shape = field.feature_shape().to_vec();
            out.insert(format!("next_{key}"), &feature_shape, data)?;
        }
        Ok(out)
    }
}
