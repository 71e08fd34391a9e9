//! # flock_rl: coupled and decoupled reinforcement learning on burn
//!
//! PPO and SAC, each with two topologies, plus a coupled DroQ loop:
//!
//! - **Coupled** loops step the environments and optimize in one thread.
//! - **Decoupled** loops run one *player* rank that owns the environments
//!   and `N` *trainer* ranks that optimize on scattered chunks. Trainers
//!   average gradients over their own group; rank 1 broadcasts the new
//!   weights back and the player blocks until they arrive.
//!
//! ```text
//!             scatter(data)            broadcast(weights)
//!   player 0 ───────────────▶ trainers 1..=N ───────────────▶ player 0
//!      ▲                         │   all_reduce(grads)
//!      └──────── gather(metrics) ┘
//! ```
//!
//! Every run writes `args.json`, `metrics.csv`, a TensorBoard event file
//! (with the default `tensorboard` feature) and versioned checkpoints under
//! `<root_dir>/<run_name>/version_<n>/`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flock_rl::algorithms::ppo::PPOArgs;
//!
//! let mut args = PPOArgs::default();
//! args.common.env_id = Some("CartPole-v1".into());
//! flock_rl::runners::ppo::main(args)?;
//! ```

pub mod algorithms;
pub mod buffers;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod distributed;
pub mod error;
pub mod messages;
pub mod metrics;
pub mod nn;
pub mod runners;
pub mod scheduling;

pub use error::{Error, Result};

pub use buffers::{ReplayBuffer, TensorDict};
pub use checkpoint::{CheckpointInfo, Checkpointer, CheckpointerConfig};
pub use config::{ConfigError, StandardArgs};
pub use distributed::{world, Communicator, ReduceOp};
pub use metrics::{MetricAggregator, MetricsLogger};
#[cfg(feature = "tensorboard")]
pub use metrics::TensorBoardLogger;
pub use scheduling::LRScheduler;
