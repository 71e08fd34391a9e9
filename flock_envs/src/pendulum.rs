//! Vectorized Pendulum with Struct-of-Arrays memory layout.
//!
//! Swing-up task with a continuous torque in `[-2, 2]`. The pendulum never
//! terminates; episodes end through the `TimeLimit` wrapper.

use rand::SeedableRng;

use crate::env::{check_actions, ResetMask, StepResult, VectorizedEnv};
use crate::error::{EnvError, Result};
use crate::rng::{random_uniform, Xoshiro256StarStar};
use crate::spaces::ActionSpace;

const MAX_SPEED: f32 = 8.0;
const MAX_TORQUE: f32 = 2.0;
const DT: f32 = 0.05;
const G: f32 = 10.0;
const M: f32 = 1.0;
const L: f32 = 1.0;

/// Wrap an angle into `[-pi, pi)`.
#[inline]
fn angle_normalize(x: f32) -> f32 {
    use std::f32::consts::PI;
    (x + PI).rem_euclid(2.0 * PI) - PI
}

/// Vectorized Pendulum-v1 dynamics.
pub struct Pendulum {
    theta: Vec<f32>,
    theta_dot: Vec<f32>,
    num_envs: usize,
}

impl Pendulum {
    pub const OBS_SIZE: usize = 3;

    pub fn new(num_envs: usize) -> Result<Self> {
        if num_envs == 0 {
            return Err(EnvError::invalid("num_envs", "must be at least 1"));
        }
        Ok(Self {
            theta: vec![0.0; num_envs],
            theta_dot: vec![0.0; num_envs],
            num_envs,
        })
    }

    fn reset_single(&mut self, idx: usize, seed: u64) {
        let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
        self.theta[idx] =
            random_uniform(&mut rng, -std::f32::consts::PI, std::f32::consts::PI);
        self.theta_dot[idx] = random_uniform(&mut rng, -1.0, 1.0);
    }

    fn step_single(&mut self, idx: usize, action: f32) -> f32 {
        let theta = self.theta[idx];
        let theta_dot = self.theta_dot[idx];
        let torque = action.clamp(-MAX_TORQUE, MAX_TORQUE);

        let cost = angle_normalize(theta).powi(2)
            + 0.1 * theta_dot * theta_dot
            + 0.001 * torque * torque;

        let new_theta_dot = (theta_dot
            + (3.0 * G / (2.0 * L) * theta.sin() + 3.0 / (M * L * L) * torque) * DT)
            .clamp(-MAX_SPEED, MAX_SPEED);
        self.theta[idx] = theta + new_theta_dot * DT;
        self.theta_dot[idx] = new_theta_dot;

        -cost
    }
}

impl VectorizedEnv for Pendulum {
    fn n_envs(&self) -> usize {
        self.num_envs
    }

    fn obs_size(&self) -> usize {
        Self::OBS_SIZE
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::symmetric_box(1, MAX_TORQUE)
    }

    fn write_observations(&self, buffer: &mut [f32]) {
        for i in 0..self.num_envs {
            let base = i * Self::OBS_SIZE;
            buffer[base] = self.theta[i].cos();
            buffer[base + 1] = self.theta[i].sin();
            buffer[base + 2] = self.theta_dot[i];
        }
    }

    fn step(&mut self, actions: &[f32]) -> Result<StepResult> {
        check_actions(actions, self.num_envs, 1)?;

        let rewards = actions
            .iter()
            .enumerate()
            .map(|(i, &a)| self.step_single(i, a))
            .collect();

        Ok(StepResult::new(
            self.get_observations(),
            rewards,
            vec![false; self.num_envs],
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
