//! Deterministic dummy environments for fast end-to-end tests.
//!
//! Every sub-environment counts steps, emits the counter as its observation,
//! pays a reward of 1 per step and terminates after `episode_len` steps.

use crate::env::{check_actions, ResetMask, StepResult, VectorizedEnv};
use crate::error::{EnvError, Result};
use crate::spaces::ActionSpace;

/// Default number of steps before a dummy episode terminates.
pub const DUMMY_EPISODE_LEN: usize = 128;

const DUMMY_OBS_SIZE: usize = 3;

/// Counter environment over an arbitrary action space.
pub struct DummyEnv {
    space: ActionSpace,
    counters: Vec<usize>,
    episode_len: usize,
    obs_size: usize,
}

impl DummyEnv {
    pub fn new(space: ActionSpace, num_envs: usize, episode_len: usize) -> Result<Self> {
        if num_envs == 0 {
            return Err(EnvError::invalid("num_envs", "must be at least 1"));
        }
        if episode_len == 0 {
            return Err(EnvError::invalid("episode_len", "must be at least 1"));
        }
        space.validate()?;
        Ok(Self {
            space,
            counters: vec![0; num_envs],
            episode_len,
            obs_size: DUMMY_OBS_SIZE,
        })
    }

    /// `discrete_dummy`: two discrete actions.
    pub fn discrete(num_envs: usize) -> Result<Self> {
        Self::new(ActionSpace::Discrete(2), num_envs, DUMMY_EPISODE_LEN)
    }

    /// `multidiscrete_dummy`: two binary branches.
    pub fn multi_discrete(num_envs: usize) -> Result<Self> {
        Self::new(ActionSpace::MultiDiscrete(vec![2, 2]), num_envs, DUMMY_EPISODE_LEN)
    }

    /// `continuous_dummy`: two dimensions in `[-1, 1]`.
    pub fn continuous(num_envs: usize) -> Result<Self> {
        Self::new(ActionSpace::symmetric_box(2, 1.0), num_envs, DUMMY_EPISODE_LEN)
    }

    pub fn with_episode_len(mut self, episode_len: usize) -> Self {
        self.episode_len = episode_len.max(1);
        self
    }
}

impl VectorizedEnv for DummyEnv {
    fn n_envs(&self) -> usize {
        self.counters.len()
    }

    fn obs_size(&self) -> usize {
        self.obs_size
    }

    fn action_space(&self) -> ActionSpace {
        self.space.clone()
    }

    fn write_observations(&self, buffer: &mut [f32]) {
        for (i, &count) in self.counters.iter().enumerate() {
            buffer[i * self.obs_size..(i + 1) * self.obs_size].fill(count as f32);
        }
    }

    fn step(&mut self, actions: &[f32]) -> Result<StepResult> {
        let n_envs = self.n_envs();
        check_actions(actions, n_envs, self.space.action_dim())?;

        let mut terminals = vec![false; n_envs];
        for (i, counter) in self.counters.iter_mut().enumerate() {
            *counter += 1;
            terminals[i] = *counter >= self.episode_len;
        }

        Ok(StepResult::new(
            self.get_observations(),
            vec![1.0; n_envs],
            terminals,
            vec![false; n_envs],
        ))
    }

    fn reset_envs(&mut self, mask: &ResetMask, _seed: u64) {
        for i in mask.iter_set() {
            if let Some(counter) = self.counters.get_mut(i) {
                *counter = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_terminates() {
        let mut env = DummyEnv::discrete(2).unwrap().with_episode_len(3);
        env.reset_all(0);
        assert_eq!(env.get_observations(), vec![0.0; 6]);

        env.step(&[0.0, 1.0]).unwrap();
        let r = env.step(&[0.0, 1.0]).unwrap();
        assert_eq!(r.observations, vec![2.0; 6]);
        assert_eq!(r.terminals, vec![false, false]);

        let r = env.step(&[0.0, 1.0]).unwrap();
        assert_eq!(r.terminals, vec![true, true]);
        assert_eq!(r.rewards, vec![1.0, 1.0]);
    }

    #[test]
    fn test_action_dims_follow_space() {
        let mut multi = DummyEnv::multi_discrete(2).unwrap();
        assert!(multi.step(&[0.0; 4]).is_ok());
        assert!(multi.step(&[0.0; 2]).is_err());

        let mut cont = DummyEnv::continuous(1).unwrap();
        assert!(cont.step(&[0.5, -0.5]).is_ok());
    }

    #[test]
    fn test_rejects_zero_sized_discrete_space() {
        let err = DummyEnv::new(ActionSpace::Discrete(0), 1, 4).err();
        assert!(matches!(err, Some(EnvError::InvalidConfig { .. })));
        let err = DummyEnv::new(ActionSpace::MultiDiscrete(vec![3, 0]), 1, 4).err();
        assert!(matches!(err, Some(EnvError::InvalidConfig { .. })));
    }
}
