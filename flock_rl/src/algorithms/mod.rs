//! RL algorithms and their building blocks.
//!
//! - [`gae`]: Generalized Advantage Estimation over `(T, B)` rollouts
//! - [`policy_loss`]: PPO clipped surrogate, value and entropy losses
//! - [`distribution`]: action distributions chosen from the action space
//! - [`ppo`]: on-policy actor-critic
//! - [`sac`]: off-policy maximum-entropy actor-critic for continuous control

pub mod distribution;
pub mod gae;
pub mod policy_loss;
pub mod ppo;
pub mod sac;

use burn::prelude::*;

pub use distribution::ActionDistribution;
pub use gae::{compute_gae, normalize_advantages};
pub use policy_loss::{entropy_loss, ppo_clip_loss, value_loss};

/// Copy a tensor to the host as a flat `Vec<f32>`.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

/// First element of a tensor, typically a reduced loss.
pub fn tensor_to_scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor_to_vec(tensor).first().copied().unwrap_or(0.0)
}
