//! Vectorized environment abstraction.
//!
//! Base environments and wrappers implement [`VectorizedEnv`], which never
//! resets on its own. [`AutoResetEnv`](crate::AutoResetEnv) sits on top of the
//! stack and turns done flags into resets.

use crate::error::{EnvError, Result};
use crate::spaces::ActionSpace;

/// Result from stepping vectorized environments.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    /// Observations after step [n_envs * obs_size] (flattened)
    pub observations: Vec<f32>,
    /// Rewards received [n_envs]
    pub rewards: Vec<f32>,
    /// Terminal flags (episode ended due to goal/failure) [n_envs]
    pub terminals: Vec<bool>,
    /// Truncation flags (episode ended due to time limit) [n_envs]
    pub truncations: Vec<bool>,
}

impl StepResult {
    pub fn new(
        observations: Vec<f32>,
        rewards: Vec<f32>,
        terminals: Vec<bool>,
        truncations: Vec<bool>,
    ) -> Self {
        Self {
            observations,
            rewards,
            terminals,
            truncations,
        }
    }

    /// Done flags (terminal OR truncated).
    pub fn dones(&self) -> Vec<bool> {
        self.terminals
            .iter()
            .zip(self.truncations.iter())
            .map(|(&t, &tr)| t || tr)
            .collect()
    }
}

/// Mask indicating which environments need reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetMask {
    mask: Vec<bool>,
}

impl ResetMask {
    pub fn from_dones(dones: &[bool]) -> Self {
        Self {
            mask: dones.to_vec(),
        }
    }

    pub fn from_step_result(result: &StepResult) -> Self {
        Self::from_dones(&result.dones())
    }

    /// Mask selecting every environment.
    pub fn all(n_envs: usize) -> Self {
        Self {
            mask: vec![true; n_envs],
        }
    }

    pub fn any(&self) -> bool {
        self.mask.iter().any(|&x| x)
    }

    pub fn is_set(&self, idx: usize) -> bool {
        self.mask.get(idx).copied().unwrap_or(false)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.mask
    }

    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&x| x).count()
    }

    /// Indices of the selected environments.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &x)| x.then_some(i))
    }
}

/// Trait for vectorized environments.
///
/// Observations are laid out `[env0_obs, env1_obs, ...]` and actions
/// `[env0_action, env1_action, ...]` with `action_space().action_dim()`
/// floats per environment.
pub trait VectorizedEnv: Send {
    /// Number of parallel environments.
    fn n_envs(&self) -> usize;

    /// Size of the observation vector of a single environment.
    fn obs_size(&self) -> usize;

    /// Action space shared by every sub-environment.
    fn action_space(&self) -> ActionSpace;

    /// Write current observations to `buffer` (`n_envs * obs_size`).
    fn write_observations(&self, buffer: &mut [f32]);

    /// Step all environments with the given actions.
    ///
    /// Finished environments are NOT reset; call [`reset_envs`](Self::reset_envs).
    fn step(&mut self, actions: &[f32]) -> Result<StepResult>;

    /// Reset the environments selected by `mask`.
    fn reset_envs(&mut self, mask: &ResetMask, seed: u64);

    /// Reset all environments.
    fn reset_all(&mut self, seed: u64) {
        let mask = ResetMask::all(self.n_envs());
        self.reset_envs(&mask, seed);
    }

    /// Current observations as a new vector.
    fn get_observations(&self) -> Vec<f32> {
        let mut buffer = vec![0.0f32; self.n_envs() * self.obs_size()];
        self.write_observations(&mut buffer);
        buffer
    }
}

impl<E: VectorizedEnv + ?Sized> VectorizedEnv for Box<E> {
    fn n_envs(&self) -> usize {
        (**self).n_envs()
    }

    fn obs_size(&self) -> usize {
        (**self).obs_size()
    }

    fn action_space(&self) -> ActionSpace {
        (**self).action_space()
    }

    fn write_observations(&self, buffer: &mut [f32]) {
        (**self).write_observations(buffer)
    }

    fn step(&mut self, actions: &[f32]) -> Result<StepResult> {
        (**self).step(actions)
    }

    fn reset_envs(&mut self, mask: &ResetMask, seed: u64) {
        (**self).reset_envs(mask, seed)
    }

    fn reset_all(&mut self, seed: u64) {
        (**self).reset_all(seed)
    }
}

/// Check that a flat action buffer matches `n_envs * action_dim`.
pub fn check_actions(actions: &[f32], n_envs: usize, action_dim: usize) -> Result<()> {
    let expected = n_envs * action_dim;
    if actions.len() != expected {
        return Err(EnvError::ActionSizeMismatch {
            expected,
            actual: actions.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dones_and_mask() {
        let result = StepResult::new(
            vec![0.0; 3],
            vec![1.0, 1.0, 1.0],
            vec![true, false, false],
            vec![false, false, true],
        );
        assert_eq!(result.dones(), vec![true, false, true]);

        let mask = ResetMask::from_step_result(&result);
        assert!(mask.any());
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.iter_set().collect::<Vec<_>>(), vec![0, 2]);
        assert!(!mask.is_set(1));
        assert!(!mask.is_set(10));
    }

    #[test]
    fn test_check_actions() {
        assert!(check_actions(&[0.0; 6], 3, 2).is_ok());
        assert_eq!(
            check_actions(&[0.0; 5], 3, 2),
            Err(EnvError::ActionSizeMismatch {
                expected: 6,
                actual: 5
            })
        );
    }
}
