//! Vectorized CartPole with Struct-of-Arrays memory layout.
//!
//! Classic pole balancing task. Two discrete actions push the cart left or
//! right; the episode terminates when the pole falls past 12 degrees or the
//! cart leaves the track. Time limits come from the `TimeLimit` wrapper.

use rand::SeedableRng;

use crate::env::{check_actions, ResetMask, StepResult, VectorizedEnv};
use crate::error::{EnvError, Result};
use crate::rng::{random_uniform, Xoshiro256StarStar};
use crate::spaces::ActionSpace;

const GRAVITY: f32 = 9.8;
const CART_MASS: f32 = 1.0;
const POLE_MASS: f32 = 0.1;
const POLE_LENGTH: f32 = 0.5;
const FORCE_MAG: f32 = 10.0;
const DT: f32 = 0.02;
const X_THRESHOLD: f32 = 2.4;
const THETA_THRESHOLD: f32 = 12.0 * 2.0 * std::f32::consts::PI / 360.0;
const INIT_RANGE: f32 = 0.05;

/// Vectorized CartPole-v1 dynamics.
pub struct CartPole {
    x: Vec<f32>,
    x_dot: Vec<f32>,
    theta: Vec<f32>,
    theta_dot: Vec<f32>,
    num_envs: usize,
}

impl CartPole {
    pub const OBS_SIZE: usize = 4;

    pub fn new(num_envs: usize) -> Result<Self> {
        if num_envs == 0 {
            return Err(EnvError::invalid("num_envs", "must be at least 1"));
        }
        Ok(Self {
            x: vec![0.0; num_envs],
            x_dot: vec![0.0; num_envs],
            theta: vec![0.0; num_envs],
            theta_dot: vec![0.0; num_envs],
            num_envs,
        })
    }

    fn reset_single(&mut self, idx: usize, seed: u64) {
        let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
        self.x[idx] = random_uniform(&mut rng, -INIT_RANGE, INIT_RANGE);
        self.x_dot[idx] = random_uniform(&mut rng, -INIT_RANGE, INIT_RANGE);
        self.theta[idx] = random_uniform(&mut rng, -INIT_RANGE, INIT_RANGE);
        self.theta_dot[idx] = random_uniform(&mut rng, -INIT_RANGE, INIT_RANGE);
    }

    /// Advance one environment and return `(reward, terminal)`.
    fn step_single(&mut self, idx: usize, action: f32) -> (f32, bool) {
        let force = if action as i32 == 1 { FORCE_MAG } else { -FORCE_MAG };

        let theta = self.theta[idx];
        let theta_dot = self.theta_dot[idx];
        let cos_theta = theta.cos();
        let sin_theta = theta.sin();

        let total_mass = CART_MASS + POLE_MASS;
        let pole_mass_length = POLE_MASS * POLE_LENGTH;

        let temp = (force + pole_mass_length * theta_dot * theta_dot * sin_theta) / total_mass;
        let denom = POLE_LENGTH * (4.0 / 3.0 - POLE_MASS * cos_theta * cos_theta / total_mass);
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp) / denom.max(1e-6);
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        self.x[idx] += DT * self.x_dot[idx];
        self.x_dot[idx] += DT * x_acc;
        self.theta[idx] += DT * theta_dot;
        self.theta_dot[idx] += DT * theta_acc;

        let terminal =
            self.x[idx].abs() > X_THRESHOLD || self.theta[idx].abs() > THETA_THRESHOLD;
        // gymnasium pays the reward on the terminating step as well
        (1.0, terminal)
    }
}

impl VectorizedEnv for CartPole {
    fn n_envs(&self) -> usize {
        self.num_envs
    }

    fn obs_size(&self) -> usize {
        Self::OBS_SIZE
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Discrete(2)
    }

    fn write_observations(&self, buffer: &mut [f32]) {
        for i in 0..self.num_envs {
            let base = i * Self::OBS_SIZE;
            buffer[base] = self.x[i];
            buffer[base + 1] = self.x_dot[i];
            buffer[base + 2] = self.theta[i];
            buffer[base + 3] = self.theta_dot[i];
        }
    }

    fn step(&mut self, actions: &[f32]) -> Result<StepResult> {
        check_actions(actions, self.num_envs, 1)?;

        let mut rewards = vec![0.0; self.num_envs];
        let mut terminals = vec![false; self.num_envs];
        for (i, &action) in actions.iter().enumerate() {
            let (reward, terminal) = self.step_single(i, action);
            rewards[i] = reward;
            terminals[i] = terminal;
        }

        Ok(StepResult::new(
            self.get_observations(),
            rewards,
            terminals,
            vec![false; self.num_envs],
        ))
    }

    fn reset_envs(&mut self, mask: &ResetMask, seed: u64) {
        let num_envs = self.num_envs;
        for i in mask.iter_set().filter(|&i| i < num_envs) {
            self.reset_single(i, seed.wrapping_add(i as u64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_is_seeded() {
        let mut a = CartPole::new(4).unwrap();
        let mut b = CartPole::new(4).unwrap();
        a.reset_all(11);
        b.reset_all(11);
        assert_eq!(a.get_observations(), b.get_observations());

        let obs = a.get_observations();
        assert_eq!(obs.len(), 16);
        assert!(obs.iter().all(|v| v.abs() <= INIT_RANGE));
    }

    #[test]
    fn test_pushing_one_way_terminates() {
        let mut env = CartPole::new(1).unwrap();
        env.reset_all(0);
        let mut terminated = false;
        for _ in 0..200 {
            let result = env.step(&[1.0]).unwrap();
            assert_eq!(result.rewards[0], 1.0);
            if result.terminals[0] {
                terminated = true;
                break;
            }
        }
        assert!(terminated);
    }

    #[test]
    fn test_rejects_wrong_action_count() {
        let mut env = CartPole::new(2).unwrap();
        env.reset_all(0);
        assert!(env.step(&[0.0]).is_err());
        assert!(CartPole::new(0).is_err());
    }
}
