//! PPO hyperparameters.

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::config::{in_range, positive, ConfigError, StandardArgs};

pub const DEFAULT_ENV_ID: &str = "CartPole-v1";
pub const DEFAULT_TOTAL_STEPS: usize = 65_536;

/// Arguments of the coupled PPO loop.
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct PPOArgs {
    #[command(flatten)]
    #[serde(flatten)]
    pub common: StandardArgs,

    /// Vector steps collected per update.
    #[arg(long, default_value_t = 128)]
    pub rollout_steps: usize,

    #[arg(long, default_value_t = 10)]
    pub update_epochs: usize,

    /// Minibatch size of every gradient step.
    #[arg(long, default_value_t = 64)]
    pub per_rank_batch_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.99)]
    pub gamma: f32,

    #[arg(long, default_value_t = 0.95)]
    pub gae_lambda: f32,

    #[arg(long, default_value_t = 0.2)]
    pub clip_coef: f32,

    #[arg(long, default_value_t = 0.0)]
    pub ent_coef: f32,

    #[arg(long, default_value_t = 1.0)]
    pub vf_coef: f32,

    /// Gradient norm clip; 0 disables clipping.
    #[arg(long, default_value_t = 0.0)]
    pub max_grad_norm: f32,

    #[arg(long)]
    pub anneal_lr: bool,

    #[arg(long)]
    pub anneal_clip_coef: bool,

    #[arg(long)]
    pub anneal_ent_coef: bool,

    #[arg(long)]
    pub normalize_advantages: bool,

    /// Clip value predictions around the rollout values.
    #[arg(long)]
    pub clip_vloss: bool,

    #[arg(long, default_value_t = 64)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 2)]
    pub n_layers: usize,
}

impl Default for PPOArgs {
    fn default() -> Self {
        Self {
            common: StandardArgs::default(),
            rollout_steps: 128,
            update_epochs: 10,
            per_rank_batch_size: 64,
            lr: 1e-3,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_coef: 0.2,
            ent_coef: 0.0,
            vf_coef: 1.0,
            max_grad_norm: 0.0,
            anneal_lr: false,
            anneal_clip_coef: false,
            anneal_ent_coef: false,
            normalize_advantages: false,
            clip_vloss: false,
            hidden_size: 64,
            n_layers: 2,
        }
    }
}

impl PPOArgs {
    pub fn resolve(&mut self, algorithm: &str) {
        self.common
            .resolve(algorithm, DEFAULT_ENV_ID, DEFAULT_TOTAL_STEPS);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.common.validate()?;
        positive("rollout_steps", self.rollout_steps)?;
        positive("update_epochs", self.update_epochs)?;
        positive("per_rank_batch_size", self.per_rank_batch_size)?;
        positive("hidden_size", self.hidden_size)?;
        in_range("gamma", self.gamma.into(), 0.0, 1.0)?;
        in_range("gae_lambda", self.gae_lambda.into(), 0.0, 1.0)?;
        in_range("clip_coef", self.clip_coef.into(), 0.0, 1.0)?;
        in_range("lr", self.lr, 0.0, f64::MAX)?;
        in_range("max_grad_norm", self.max_grad_norm.into(), 0.0, f64::MAX)?;
        Ok(())
    }

    /// Transitions collected per update.
    pub fn rollout_size(&self) -> usize {
        self.rollout_steps * self.common.num_envs
    }

    /// Number of updates; a dry run does exactly one.
    pub fn num_updates(&self) -> usize {
        if self.common.dry_run {
            1
        } else {
            (self.common.total_steps() / self.rollout_size()).max(1)
        }
    }
}

/// Arguments of the decoupled PPO loop.
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct PPODecoupledArgs {
    #[command(flatten)]
    #[serde(flatten)]
    pub ppo: PPOArgs,

    /// Trainer ranks; the world also holds the player.
    #[arg(long, default_value_t = 2)]
    pub num_trainers: usize,
}

impl Default for PPODecoupledArgs {
    fn default() -> Self {
        Self {
            ppo: PPOArgs::default(),
            num_trainers: 2,
        }
    }
}

impl PPODecoupledArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ppo.validate()?;
        positive("num_trainers", self.num_trainers)?;
        let rollout = self.ppo.rollout_size();
        if rollout % self.num_trainers != 0 {
            return Err(ConfigError::NotDivisible {
                field: "rollout_steps * num_envs",
                value: rollout,
                divisor: self.num_trainers,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_updates() {
        let mut args = PPOArgs::default();
        args.resolve("ppo");
        assert_eq!(args.num_updates(), 65_536 / (128 * 4));

        args.common.dry_run = true;
        assert_eq!(args.num_updates(), 1);
    }

    #[test]
    fn test_decoupled_requires_even_split() {
        let mut args = PPODecoupledArgs::default();
        args.ppo.resolve("ppo_decoupled");
        args.ppo.rollout_steps = 5;
        args.ppo.common.num_envs = 1;
        args.num_trainers = 2;
        assert!(matches!(
            args.validate(),
            Err(ConfigError::NotDivisible { value: 5, divisor: 2, .. })
        ));

        args.num_trainers = 0;
        assert!(matches!(
            args.validate(),
            Err(ConfigError::InvalidCount { field: "num_trainers", .. })
        ));
    }

    #[test]
    fn test_rejects_bad_gamma() {
        let mut args = PPOArgs::default();
        args.resolve("ppo");
        args.gamma = 1.5;
        assert!(args.validate().is_err());
    }
}
