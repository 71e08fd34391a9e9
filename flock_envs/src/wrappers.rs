//! Environment wrappers.
//!
//! Each wrapper is itself a [`VectorizedEnv`], so they stack in any order.
//! `make_env` applies them as: action repeat, time limit, reward clip, action
//! stack.

use std::collections::VecDeque;

use crate::env::{ResetMask, StepResult, VectorizedEnv};
use crate::error::{EnvError, Result};
use crate::spaces::ActionSpace;

// ============================================================================
// ActionRepeat
// ============================================================================

/// Repeat every action `repeat` times and sum the rewards.
///
/// A sub-environment that finishes during the repeats keeps the reward,
/// flags and observation of its finishing step. Later repeats still advance
/// the vector, but their output is ignored for that sub-environment.
pub struct ActionRepeat<E> {
    env: E,
    repeat: usize,
}

impl<E: VectorizedEnv> ActionRepeat<E> {
    pub fn new(env: E, repeat: usize) -> Result<Self> {
        if repeat == 0 {
            return Err(EnvError::invalid("action_repeat", "must be at least 1"));
        }
        Ok(Self { env, repeat })
    }
}

impl<E: VectorizedEnv> VectorizedEnv for ActionRepeat<E> {
    fn n_envs(&self) -> usize {
        self.env.n_envs()
    }

    fn obs_size(&self) -> usize {
        self.env.obs_size()
    }

    fn action_space(&self) -> ActionSpace {
        self.env.action_space()
    }

    fn write_observations(&self, buffer: &mut [f32]) {
        self.env.write_observations(buffer)
    }

    fn step(&mut self, actions: &[f32]) -> Result<StepResult> {
        let obs_size = self.obs_size();
        let mut result = self.env.step(actions)?;
        let mut done = result.dones();

        for _ in 1..self.repeat {
            if done.iter().all(|&d| d) {
                break;
            }
            let next = self.env.step(actions)?;
            for (i, finished) in done.iter_mut().enumerate() {
                if *finished {
                    continue;
                }
                result.rewards[i] += next.rewards[i];
                result.terminals[i] = next.terminals[i];
                result.truncations[i] = next.truncations[i];
                let span = i * obs_size..(i + 1) * obs_size;
                result.observations[span.clone()].copy_from_slice(&next.observations[span]);
                *finished = next.terminals[i] || next.truncations[i];
            }
        }

        Ok(result)
    }

    fn reset_envs(&mut self, mask: &ResetMask, seed: u64) {
        self.env.reset_envs(mask, seed)
    }
}

// ============================================================================
// TimeLimit
// ============================================================================

/// Truncate episodes after `max_episode_steps` steps.
pub struct TimeLimit<E> {
    env: E,
    max_episode_steps: usize,
    elapsed: Vec<usize>,
}

impl<E: VectorizedEnv> TimeLimit<E> {
    pub fn new(env: E, max_episode_steps: usize) -> Result<Self> {
        if max_episode_steps == 0 {
            return Err(EnvError::invalid("max_episode_steps", "must be at least 1"));
        }
        let elapsed = vec![0; env.n_envs()];
        Ok(Self {
            env,
            max_episode_steps,
            elapsed,
        })
    }
}

impl<E: VectorizedEnv> VectorizedEnv for TimeLimit<E> {
    fn n_envs(&self) -> usize {
        self.env.n_envs()
    }

    fn obs_size(&self) -> usize {
        self.env.obs_size()
    }

    fn action_space(&self) -> ActionSpace {
        self.env.action_space()
    }

    fn write_observations(&self, buffer: &mut [f32]) {
        self.env.write_observations(buffer)
    }

    fn step(&mut self, actions: &[f32]) -> Result<StepResult> {
        let mut result = self.env.step(actions)?;
        for (i, elapsed) in self.elapsed.iter_mut().enumerate() {
            *elapsed += 1;
            if *elapsed >= self.max_episode_steps && !result.terminals[i] {
                result.truncations[i] = true;
            }
        }
        Ok(result)
    }

    fn reset_envs(&mut self, mask: &ResetMask, seed: u64) {
        for i in mask.iter_set() {
            if let Some(elapsed) = self.elapsed.get_mut(i) {
                *elapsed = 0;
            }
        }
        self.env.reset_envs(mask, seed)
    }
}

// ============================================================================
// ClipReward
// ============================================================================

/// Squash rewards with `tanh`.
pub struct ClipReward<E> {
    env: E,
}

impl<E: VectorizedEnv> ClipReward<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

impl<E: VectorizedEnv> VectorizedEnv for ClipReward<E> {
    fn n_envs(&self) -> usize {
        self.env.n_envs()
    }

    fn obs_size(&self) -> usize {
        self.env.obs_size()
    }

    fn action_space(&self) -> ActionSpace {
        self.env.action_space()
    }

    fn write_observations(&self, buffer: &mut [f32]) {
        self.env.write_observations(buffer)
    }

    fn step(&mut self, actions: &[f32]) -> Result<StepResult> {
        let mut result = self.env.step(actions)?;
        result.rewards.iter_mut().for_each(|r| *r = r.tanh());
        Ok(result)
    }

    fn reset_envs(&mut self, mask: &ResetMask, seed: u64) {
        self.env.reset_envs(mask, seed)
    }
}

// ============================================================================
// ActionStack
// ============================================================================

/// Append the last `stack` actions to every observation.
///
/// Categorical actions are stored one-hot. The history starts zeroed after
/// every reset.
pub struct ActionStack<E> {
    env: E,
    stack: usize,
    space: ActionSpace,
    history: Vec<VecDeque<Vec<f32>>>,
}

impl<E: VectorizedEnv> ActionStack<E> {
    pub fn new(env: E, stack: usize) -> Result<Self> {
        if stack == 0 {
            return Err(EnvError::invalid("actions_stack", "must be at least 1"));
        }
        let space = env.action_space();
        let width = space.n_outputs();
        let history = (0..env.n_envs())
            .map(|_| std::iter::repeat(vec![0.0; width]).take(stack).collect())
            .collect();
        Ok(Self {
            env,
            stack,
            space,
            history,
        })
    }

    fn stacked_width(&self) -> usize {
        self.stack * self.space.n_outputs()
    }

    fn augment(&self, inner: &[f32]) -> Vec<f32> {
        let inner_size = self.env.obs_size();
        let mut out = Vec::with_capacity(self.n_envs() * self.obs_size());
        for (i, history) in self.history.iter().enumerate() {
            out.extend_from_slice(&inner[i * inner_size..(i + 1) * inner_size]);
            for action in history {
                out.extend_from_slice(action);
            }
        }
        out
    }
}

impl<E: VectorizedEnv> VectorizedEnv for ActionStack<E> {
    fn n_envs(&self) -> usize {
        self.env.n_envs()
    }

    fn obs_size(&self) -> usize {
        self.env.obs_size() + self.stacked_width()
    }

    fn action_space(&self) -> ActionSpace {
        self.space.clone()
    }

    fn write_observations(&self, buffer: &mut [f32]) {
        let augmented = self.augment(&self.env.get_observations());
        buffer[..augmented.len()].copy_from_slice(&augmented);
    }

    fn step(&mut self, actions: &[f32]) -> Result<StepResult> {
        let mut result = self.env.step(actions)?;

        let dim = self.space.action_dim();
        let width = self.space.n_outputs();
        for (i, history) in self.history.iter_mut().enumerate() {
            let mut encoded = vec![0.0; width];
            self.space.encode(&actions[i * dim..(i + 1) * dim], &mut encoded);
            history.pop_front();
            history.push_back(encoded);
        }

        result.observations = self.augment(&result.observations);
        Ok(result)
    }

    fn reset_envs(&mut self, mask: &ResetMask, seed: u64) {
        for i in mask.iter_set() {
            if let Some(history) = self.history.get_mut(i) {
                history.iter_mut().for_each(|a| a.fill(0.0));
            }
        }
        self.env.reset_envs(mask, seed)
    }
}
