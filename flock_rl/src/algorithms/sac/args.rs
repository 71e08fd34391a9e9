//! SAC hyperparameters.

use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};

use crate::config::{in_range, positive, ConfigError, StandardArgs};

pub const DEFAULT_ENV_ID: &str = "Pendulum-v1";
pub const DEFAULT_TOTAL_STEPS: usize = 1_000_000;

/// Arguments of the coupled SAC loop.
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct SACArgs {
    #[command(flatten)]
    #[serde(flatten)]
    pub common: StandardArgs,

    /// Transitions sampled per gradient step.
    #[arg(long, default_value_t = 256)]
    pub per_rank_batch_size: usize,

    /// Replay capacity in transitions, over all environments.
    #[arg(long, default_value_t = 1_000_000)]
    pub buffer_size: usize,

    /// Policy steps of uniformly random actions before training starts.
    #[arg(long, default_value_t = 100)]
    pub learning_starts: usize,

    /// Gradient steps per vector step.
    #[arg(long, default_value_t = 1)]
    pub gradient_steps: usize,

    #[arg(long, default_value_t = 0.99)]
    pub gamma: f32,

    /// Polyak coefficient of the target critics.
    #[arg(long, default_value_t = 0.005)]
    pub tau: f32,

    /// Initial entropy temperature.
    #[arg(long, default_value_t = 1.0)]
    pub alpha: f32,

    #[arg(long, default_value_t = 3e-4)]
    pub actor_lr: f64,

    #[arg(long, default_value_t = 3e-4)]
    pub critic_lr: f64,

    #[arg(long, default_value_t = 3e-4)]
    pub alpha_lr: f64,

    /// Gradient steps between two target updates.
    #[arg(long, default_value_t = 1)]
    pub target_network_frequency: usize,

    #[arg(long, default_value_t = 2)]
    pub num_critics: usize,

    #[arg(long, default_value_t = 256)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 2)]
    pub n_layers: usize,

    /// Store the replay buffer with every checkpoint.
    #[arg(long)]
    pub checkpoint_buffer: bool,
}

impl Default for SACArgs {
    fn default() -> Self {
        Self {
            common: StandardArgs::default(),
            per_rank_batch_size: 256,
            buffer_size: 1_000_000,
            learning_starts: 100,
            gradient_steps: 1,
            gamma: 0.99,
            tau: 0.005,
            alpha: 1.0,
            actor_lr: 3e-4,
            critic_lr: 3e-4,
            alpha_lr: 3e-4,
            target_network_frequency: 1,
            num_critics: 2,
            hidden_size: 256,
            n_layers: 2,
            checkpoint_buffer: false,
        }
    }
}

impl SACArgs {
    pub fn resolve(&mut self, algorithm: &str) {
        self.common
            .resolve(algorithm, DEFAULT_ENV_ID, DEFAULT_TOTAL_STEPS);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.common.validate()?;
        positive("per_rank_batch_size", self.per_rank_batch_size)?;
        positive("gradient_steps", self.gradient_steps)?;
        positive("target_network_frequency", self.target_network_frequency)?;
        positive("num_critics", self.num_critics)?;
        positive("hidden_size", self.hidden_size)?;
        if self.buffer_size < self.common.num_envs {
            return Err(ConfigError::OutOfRange {
                field: "buffer_size",
                value: self.buffer_size as f64,
                min: self.common.num_envs as f64,
                max: f64::MAX,
            });
        }
        in_range("gamma", self.gamma.into(), 0.0, 1.0)?;
        in_range("tau", self.tau.into(), 0.0, 1.0)?;
        in_range("alpha", self.alpha.into(), f64::MIN_POSITIVE, f64::MAX)?;
        Ok(())
    }

    /// Timesteps of the `(T, num_envs)` replay buffer.
    pub fn buffer_steps(&self) -> usize {
        (self.buffer_size / self.common.num_envs.max(1)).max(1)
    }

    /// Vector steps to run; a dry run stops right after the first update.
    pub fn num_iterations(&self) -> usize {
        let per_step = self.common.num_envs.max(1);
        if self.common.dry_run {
            self.learning_starts_iteration() + 1
        } else {
            (self.common.total_steps() / per_step).max(1)
        }
    }

    /// First vector step whose policy step count reaches `learning_starts`.
    pub fn learning_starts_iteration(&self) -> usize {
        self.learning_starts.div_ceil(self.common.num_envs.max(1)).max(1)
    }
}

/// Arguments of the decoupled SAC loop.
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct SACDecoupledArgs {
    #[command(flatten)]
    #[serde(flatten)]
    pub sac: SACArgs,

    /// Trainer ranks; the world also holds the player.
    #[arg(long, default_value_t = 2)]
    pub num_trainers: usize,
}

impl Default for SACDecoupledArgs {
    fn default() -> Self {
        Self {
            sac: SACArgs::default(),
            num_trainers: 2,
        }
    }
}

impl SACDecoupledArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sac.validate()?;
        positive("num_trainers", self.num_trainers)?;
        Ok(())
    }
}

/// Arguments of the DroQ loop.
///
/// DroQ is SAC with dropout and layer norm in the critics and many critic
/// updates per policy update: `--gradient-steps` sets the critic updates per
/// vector step, after which the actor and temperature take one step.
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct DroQArgs {
    #[command(flatten)]
    #[serde(flatten)]
    pub sac: SACArgs,

    /// Dropout probability in every hidden critic layer.
    #[arg(long, default_value_t = 0.01)]
    pub dropout: f64,

    /// Layer norm after every hidden critic layer.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub layer_norm: bool,
}

impl Default for DroQArgs {
    fn default() -> Self {
        Self {
            sac: SACArgs::default(),
            dropout: 0.01,
            layer_norm: true,
        }
    }
}

impl DroQArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sac.validate()?;
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::OutOfRange {
                field: "dropout",
                value: self.dropout,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}
