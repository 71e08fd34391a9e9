//! Training entry points.
//!
//! # Coupled
//!
//! - [`ppo::main`]: rollout collection and PPO updates in one loop
//! - [`sac::main`]: environment steps and SAC updates in one loop
//! - [`droq::main`]: SAC with dropout critics and several critic updates per step
//!
//! # Decoupled
//!
//! One player thread (rank 0) owns the environments, `num_trainers` trainer
//! threads (ranks `1..=N`) own the optimizers:
//!
//! - [`ppo_decoupled::main`]: trainers split every rollout
//! - [`sac_decoupled::main`]: trainers split every replay sample
//!
//! Every entry point writes its run into
//! `<root_dir>/<run_name>/version_<k>/` (see [`common::Run`]).

pub mod common;
pub mod droq;
pub mod ppo;
pub mod ppo_decoupled;
pub mod sac;
pub mod sac_decoupled;

pub use common::{test_episode, InferBackend, Run, TrainBackend, TrainState};

#[cfg(test)]
mod tests;
