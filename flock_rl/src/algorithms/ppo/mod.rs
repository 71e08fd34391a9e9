//! Proximal Policy Optimization.
//!
//! ```text
//! L = L_clip + vf_coef * L_value - ent_coef * H
//! ```
//!
//! The agent, loss and update are shared by the coupled and the decoupled
//! loops in [`crate::runners`].

pub mod agent;
pub mod args;
pub mod train;

pub use agent::{ppo_optimizer, PPOAgent, PPOAgentConfig, PolicyStep};
pub use args::{PPOArgs, PPODecoupledArgs};
pub use train::{keys, train, UpdateParams};

#[cfg(test)]
mod tests;
