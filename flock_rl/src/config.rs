//! Configuration shared by every algorithm.
//!
//! Argument structs are clap `Args` so they can be composed into the CLI, and
//! serde types so the resolved configuration can be written to `args.json`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use flock_envs::{EnvOptions, ENV_IDS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation error.
///
/// Returned before any environment or thread is created.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A count parameter must be positive.
    #[error("{field} must be > 0, got {value}")]
    InvalidCount { field: &'static str, value: usize },

    /// A parameter is outside its valid range.
    #[error("{field} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A quantity must split evenly across workers.
    #[error("{field} ({value}) must be divisible by {divisor}")]
    NotDivisible {
        field: &'static str,
        value: usize,
        divisor: usize,
    },

    #[error("unknown environment id '{0}'")]
    UnknownEnv(String),

    /// The algorithm cannot handle the requested environment.
    #[error("{0}")]
    Unsupported(String),
}

pub(crate) fn positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidCount { field, value });
    }
    Ok(())
}

pub(crate) fn in_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

// ============================================================================
// Standard arguments
// ============================================================================

/// Flags understood by every algorithm.
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct StandardArgs {
    /// Environment id; each algorithm has its own default.
    #[arg(long)]
    pub env_id: Option<String>,

    /// Number of parallel environments.
    #[arg(long, default_value_t = 4)]
    pub num_envs: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Total policy steps; each algorithm has its own default.
    #[arg(long)]
    pub total_steps: Option<usize>,

    /// Directory holding every run.
    #[arg(long, default_value = "logs/runs")]
    pub root_dir: PathBuf,

    /// Run name; defaults to `<algorithm>_<env_id>_<seed>`.
    #[arg(long)]
    pub run_name: Option<String>,

    /// Run a single update and checkpoint, then exit.
    #[arg(long)]
    pub dry_run: bool,

    /// Checkpoint every N updates (the last update always checkpoints).
    #[arg(long, default_value_t = 100)]
    pub checkpoint_every: usize,

    /// Number of checkpoints kept on disk (0 keeps all).
    #[arg(long, default_value_t = 5)]
    pub keep_last_checkpoints: usize,

    /// Minimum number of policy steps between two metric rows.
    #[arg(long, default_value_t = 1000)]
    pub log_every: usize,

    #[arg(long, default_value_t = 1)]
    pub action_repeat: usize,

    #[arg(long)]
    pub max_episode_steps: Option<usize>,

    /// Squash rewards with tanh.
    #[arg(long)]
    pub clip_rewards: bool,

    /// Append the last N actions to the observation.
    #[arg(long, default_value_t = 0)]
    pub actions_stack: usize,
}

impl Default for StandardArgs {
    fn default() -> Self {
        Self {
            env_id: None,
            num_envs: 4,
            seed: 42,
            total_steps: None,
            root_dir: PathBuf::from("logs/runs"),
            run_name: None,
            dry_run: false,
            checkpoint_every: 100,
            keep_last_checkpoints: 5,
            log_every: 1000,
            action_repeat: 1,
            max_episode_steps: None,
            clip_rewards: false,
            actions_stack: 0,
        }
    }
}

impl StandardArgs {
    /// Fill in the algorithm defaults for unset options.
    pub fn resolve(&mut self, algorithm: &str, env_id: &str, total_steps: usize) {
        let env_id = self.env_id.get_or_insert_with(|| env_id.to_string()).clone();
        self.total_steps.get_or_insert(total_steps);
        let seed = self.seed;
        self.run_name
            .get_or_insert_with(|| format!("{algorithm}_{env_id}_{seed}"));
    }

    pub fn env_id(&self) -> &str {
        self.env_id.as_deref().unwrap_or(ENV_IDS[0])
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps.unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("num_envs", self.num_envs)?;
        positive("checkpoint_every", self.checkpoint_every)?;
        positive("action_repeat", self.action_repeat)?;
        if !ENV_IDS.contains(&self.env_id()) {
            return Err(ConfigError::UnknownEnv(self.env_id().to_string()));
        }
        Ok(())
    }

    pub fn env_options(&self) -> EnvOptions {
        EnvOptions::new(self.num_envs)
            .with_action_repeat(self.action_repeat)
            .with_max_episode_steps(self.max_episode_steps)
            .with_clip_rewards(self.clip_rewards)
            .with_actions_stack(self.actions_stack)
    }

    /// Next free `<root_dir>/<run_name>/version_<k>` directory, created.
    pub fn create_run_dir(&self) -> std::io::Result<PathBuf> {
        let name = self.run_name.as_deref().unwrap_or("default");
        versioned_dir(&self.root_dir.join(name))
    }
}

impl fmt::Display for StandardArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x{} envs, seed {}, {} steps",
            self.env_id(),
            self.num_envs,
            self.seed,
            self.total_steps()
        )
    }
}

/// Create `<base>/version_<k>` with the smallest unused `k`.
pub fn versioned_dir(base: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(base)?;
    let next = fs::read_dir(base)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            e.file_name()
                .to_str()?
                .strip_prefix("version_")?
                .parse::<usize>()
                .ok()
        })
        .max()
        .map_or(0, |k| k + 1);
    let dir = base.join(format!("version_{next}"));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}
