//! Auto-resetting front end over a wrapper stack.
//!
//! [`AutoResetEnv`] is what training loops talk to. It resets finished
//! sub-environments right after they finish, keeps their last observation in
//! `final_observations` and records completed episode statistics.

use crate::env::{ResetMask, VectorizedEnv};
use crate::error::Result;
use crate::spaces::ActionSpace;

/// Statistics of one completed episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeInfo {
    /// Index of the sub-environment.
    pub env: usize,
    /// Undiscounted return.
    pub ret: f32,
    /// Number of steps.
    pub length: usize,
}

/// Output of an auto-resetting vector step.
#[derive(Debug, Clone, Default)]
pub struct VecStep {
    /// Observations to act on next; post-reset for finished envs. [n_envs * obs_size]
    pub observations: Vec<f32>,
    pub rewards: Vec<f32>,
    pub terminals: Vec<bool>,
    pub truncations: Vec<bool>,
    /// Last observation of every sub-environment that finished this step.
    pub final_observations: Vec<Option<Vec<f32>>>,
    /// Episodes completed this step.
    pub episodes: Vec<EpisodeInfo>,
}

impl VecStep {
    pub fn dones(&self) -> Vec<bool> {
        self.terminals
            .iter()
            .zip(&self.truncations)
            .map(|(&t, &tr)| t || tr)
            .collect()
    }

    /// Successor observations with the final observation substituted for
    /// finished sub-environments.
    pub fn next_observations(&self) -> Vec<f32> {
        let n_envs = self.rewards.len();
        if n_envs == 0 {
            return Vec::new();
        }
        let obs_size = self.observations.len() / n_envs;
        let mut next = self.observations.clone();
        for (i, last) in self.final_observations.iter().enumerate() {
            if let Some(last) = last {
                next[i * obs_size..(i + 1) * obs_size].copy_from_slice(last);
            }
        }
        next
    }
}

/// Auto-resetting vector environment with episode statistics.
pub struct AutoResetEnv<E> {
    env: E,
    base_seed: u64,
    resets: u64,
    returns: Vec<f32>,
    lengths: Vec<usize>,
}

/// The concrete environment type built by `make_env`.
pub type VecEnv = AutoResetEnv<Box<dyn VectorizedEnv>>;

impl<E: VectorizedEnv> AutoResetEnv<E> {
    pub fn new(env: E) -> Self {
        let n_envs = env.n_envs();
        Self {
            env,
            base_seed: 0,
            resets: 0,
            returns: vec![0.0; n_envs],
            lengths: vec![0; n_envs],
        }
    }

    pub fn n_envs(&self) -> usize {
        self.env.n_envs()
    }

    pub fn obs_size(&self) -> usize {
        self.env.obs_size()
    }

    pub fn action_space(&self) -> ActionSpace {
        self.env.action_space()
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    /// Reset every sub-environment and return the initial observations.
    pub fn reset(&mut self, seed: u64) -> Vec<f32> {
        self.base_seed = seed;
        self.resets = 1;
        self.returns.fill(0.0);
        self.lengths.fill(0);
        self.env.reset_all(seed);
        self.env.get_observations()
    }

    /// Step, reset whatever finished and report completed episodes.
    pub fn step(&mut self, actions: &[f32]) -> Result<VecStep> {
        let result = self.env.step(actions)?;
        let n_envs = self.n_envs();
        let obs_size = self.obs_size();
        let dones = result.dones();

        let mut final_observations = vec![None; n_envs];
        let mut episodes = Vec::new();
        for i in 0..n_envs {
            self.returns[i] += result.rewards[i];
            self.lengths[i] += 1;
            if dones[i] {
                final_observations[i] =
                    Some(result.observations[i * obs_size..(i + 1) * obs_size].to_vec());
                episodes.push(EpisodeInfo {
                    env: i,
                    ret: self.returns[i],
                    length: self.lengths[i],
                });
                self.returns[i] = 0.0;
                self.lengths[i] = 0;
            }
        }

        let mask = ResetMask::from_dones(&dones);
        let observations = if mask.any() {
            let seed = self
                .base_seed
                .wrapping_add(self.resets.wrapping_mul(n_envs as u64));
            self.resets += 1;
            self.env.reset_envs(&mask, seed);
            log::trace!("auto-reset {} of {} envs", mask.count(), n_envs);
            self.env.get_observations()
        } else {
            result.observations
        };

        Ok(VecStep {
            observations,
            rewards: result.rewards,
            terminals: result.terminals,
            truncations: result.truncations,
            final_observations,
            episodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::DummyEnv;
    use crate::wrappers::TimeLimit;

    #[test]
    fn test_auto_reset_records_final_obs_and_episode() {
        let base = DummyEnv::discrete(2).unwrap().with_episode_len(2);
        let mut env = AutoResetEnv::new(base);
        let obs = env.reset(3);
        assert_eq!(obs, vec![0.0; 6]);

        let step = env.step(&[0.0, 1.0]).unwrap();
        assert!(step.episodes.is_empty());
        assert!(step.final_observations.iter().all(Option::is_none));

        let step = env.step(&[0.0, 1.0]).unwrap();
        assert_eq!(step.dones(), vec![true, true]);
        assert_eq!(step.observations, vec![0.0; 6]);
        assert_eq!(step.final_observations[0].as_deref(), Some(&[2.0, 2.0, 2.0][..]));
        assert_eq!(step.next_observations(), vec![2.0; 6]);
        assert_eq!(
            step.episodes,
            vec![
                EpisodeInfo { env: 0, ret: 2.0, length: 2 },
                EpisodeInfo { env: 1, ret: 2.0, length: 2 },
            ]
        );
    }

    #[test]
    fn test_truncation_resets_only_that_env() {
        let base = DummyEnv::discrete(1).unwrap();
        let mut env = AutoResetEnv::new(TimeLimit::new(base, 3).unwrap());
        env.reset(0);
        for _ in 0..2 {
            assert!(env.step(&[0.0]).unwrap().episodes.is_empty());
        }
        let step = env.step(&[0.0]).unwrap();
        assert_eq!(step.truncations, vec![true]);
        assert_eq!(step.terminals, vec![false]);
        assert_eq!(step.episodes.len(), 1);
        assert_eq!(step.observations, vec![0.0; 3]);
    }
}
