//! Run directory, logging and evaluation shared by every training loop.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use flock_envs::{make_env, EpisodeInfo};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::config::StandardArgs;
use crate::error::Result;
#[cfg(feature = "tensorboard")]
use crate::metrics::TensorBoardLogger;
use crate::metrics::{CSVLogger, ConsoleLogger, MetricAggregator, MetricsLogger, MultiLogger};

#[cfg(not(feature = "wgpu"))]
pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray<f32>>;

#[cfg(feature = "wgpu")]
pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Backend used for acting, without autodiff bookkeeping.
pub type InferBackend = <TrainBackend as AutodiffBackend>::InnerBackend;

/// Counters written as `state.json` into every checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainState {
    pub update: usize,
    pub global_step: usize,
}

/// Whether `update` (1-based) ends with a checkpoint.
pub fn should_checkpoint(common: &StandardArgs, update: usize, last_update: usize) -> bool {
    common.dry_run || update == last_update || update % common.checkpoint_every.max(1) == 0
}

// ============================================================================
// Run
// ============================================================================

/// One versioned run directory with its loggers and checkpointer.
///
/// Episode statistics and training losses are averaged between two log
/// points; a row is written once `log_every` policy steps have passed.
pub struct Run {
    dir: PathBuf,
    logger: MultiLogger,
    checkpointer: Checkpointer,
    log_every: usize,
    last_log: usize,
    episodes: MetricAggregator,
    train: MetricAggregator,
}

impl Run {
    /// Create `<root_dir>/<run_name>/version_<k>` and write `args.json`.
    pub fn create<A: Serialize>(common: &StandardArgs, args: &A) -> Result<Self> {
        let dir = common.create_run_dir()?;
        let file = BufWriter::new(File::create(dir.join("args.json"))?);
        serde_json::to_writer_pretty(file, args)?;

        let logger = MultiLogger::new()
            .add(ConsoleLogger::new(common.log_every))
            .add(CSVLogger::new(dir.join("metrics.csv"))?);
        #[cfg(feature = "tensorboard")]
        let logger = logger.add(TensorBoardLogger::new(&dir)?);
        let checkpointer = Checkpointer::new(
            CheckpointerConfig::new(dir.join("checkpoint"))
                .with_keep_last_n(common.keep_last_checkpoints),
        )?;

        log::info!("run directory: {}", dir.display());
        log::info!("{common}");
        Ok(Self {
            dir,
            logger,
            checkpointer,
            log_every: common.log_every,
            last_log: 0,
            episodes: MetricAggregator::new(),
            train: MetricAggregator::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    pub fn record_episodes(&mut self, episodes: &[EpisodeInfo]) {
        for episode in episodes {
            self.episodes.update("Rewards/rew_avg", episode.ret);
            self.episodes.update("Game/ep_len_avg", episode.length as f32);
        }
    }

    pub fn record_train(&mut self, metrics: &BTreeMap<String, f32>) {
        self.train.extend(metrics);
    }

    /// Write the averaged metrics if `log_every` steps passed or `force` is set.
    pub fn log(&mut self, global_step: usize, force: bool) {
        if !force && global_step.saturating_sub(self.last_log) < self.log_every {
            return;
        }
        let mut metrics = self.episodes.compute();
        metrics.extend(self.train.compute());
        self.logger.log_metrics(global_step, &metrics);
        self.episodes.reset();
        self.train.reset();
        self.last_log = global_step;
    }

    pub fn log_scalar(&mut self, name: &str, value: f32, global_step: usize) {
        self.logger.log_scalar(name, value, global_step);
    }

    /// Flush every logger, surfacing write failures.
    pub fn finish(&mut self) -> Result<()> {
        self.logger.flush()?;
        Ok(())
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Play one episode on a fresh single environment and return its reward.
///
/// `policy` maps a flat observation to a flat action; continuous actions are
/// clipped into the action box before stepping.
pub fn test_episode<F>(common: &StandardArgs, mut policy: F) -> Result<f32>
where
    F: FnMut(&[f32]) -> Vec<f32>,
{
    let mut options = common.env_options();
    options.num_envs = 1;
    let mut env = make_env(common.env_id(), &options)?;
    let space = env.action_space();
    let mut obs = env.reset(common.seed);
    loop {
        let mut actions = policy(&obs);
        space.clip(&mut actions);
        let step = env.step(&actions)?;
        if let Some(episode) = step.episodes.first() {
            log::info!(
                "test episode: reward {:.2}, length {}",
                episode.ret,
                episode.length
            );
            return Ok(episode.ret);
        }
        obs = step.observations;
    }
}

/// Log the greedy test episode as `Test/cumulative_reward`.
pub fn log_test<F>(
    run: &mut Run,
    common: &StandardArgs,
    global_step: usize,
    policy: F,
) -> Result<()>
where
    F: FnMut(&[f32]) -> Vec<f32>,
{
    let reward = test_episode(common, policy)?;
    run.log_scalar("Test/cumulative_reward", reward, global_step);
    Ok(())
}
