//! Vectorized environments for flock_rl.
//!
//! Base environments step without resetting; wrappers compose on top of them;
//! [`AutoResetEnv`] is the auto-resetting front end used by training loops.
//!
//! ```ignore
//! use flock_envs::{make_env, EnvOptions};
//!
//! let mut env = make_env("CartPole-v1", &EnvOptions::new(8))?;
//! let obs = env.reset(42);
//! let step = env.step(&vec![0.0; 8])?;
//! ```

pub mod cartpole;
pub mod dummy;
pub mod env;
pub mod error;
pub mod pendulum;
pub mod registry;
mod rng;
pub mod spaces;
pub mod vector;
pub mod wrappers;

pub use cartpole::CartPole;
pub use dummy::DummyEnv;
pub use env::{ResetMask, StepResult, VectorizedEnv};
pub use error::{EnvError, Result};
pub use pendulum::Pendulum;
pub use registry::{make_env, EnvOptions, ENV_IDS};
pub use spaces::ActionSpace;
pub use vector::{AutoResetEnv, EpisodeInfo, VecEnv, VecStep};
pub use wrappers::{ActionRepeat, ActionStack, ClipReward, TimeLimit};
