//! Checkpoint directories for training runs.
//!
//! Every checkpoint is a directory `ckpt_<step>/` under the configured root
//! holding any number of named files: modules and optimizer records as
//! `<name>.bin` (burn `BinFileRecorder`, full precision) and plain state as
//! `<name>.json`.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Record, Recorder};
use burn::tensor::backend::Backend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CKPT_PREFIX: &str = "ckpt_";

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Directory holding the `ckpt_<step>` directories.
    pub checkpoint_dir: PathBuf,
    /// Number of recent checkpoints to keep (0 = keep all).
    pub keep_last_n: usize,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoint"),
            keep_last_n: 5,
        }
    }
}

impl CheckpointerConfig {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }
}

/// Error type for checkpointing operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No checkpoints found")]
    NoCheckpoints,
}

/// Checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// The `ckpt_<step>` directory.
    pub path: PathBuf,
    pub step: usize,
}

/// Writes and reads `ckpt_<step>` directories, pruning old ones.
pub struct Checkpointer {
    config: CheckpointerConfig,
}

impl Checkpointer {
    /// Create a new checkpointer.
    ///
    /// Creates the checkpoint directory if it doesn't exist.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// Directory of the checkpoint taken at `step`.
    pub fn checkpoint_path(&self, step: usize) -> PathBuf {
        self.config
            .checkpoint_dir
            .join(format!("{CKPT_PREFIX}{step}"))
    }

    fn prepare(&self, step: usize) -> Result<PathBuf, CheckpointError> {
        let dir = self.checkpoint_path(step);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Save a module as `<name>.bin`.
    pub fn save_module<B: Backend, M: Module<B>>(
        &self,
        step: usize,
        name: &str,
        module: &M,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.prepare(step)?.join(format!("{name}.bin"));
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        module
            .clone()
            .save_file(&path, &recorder)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        Ok(path)
    }

    /// Save any record (e.g. an optimizer state) as `<name>.bin`.
    pub fn save_record<B: Backend, R: Record<B>>(
        &self,
        step: usize,
        name: &str,
        record: R,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.prepare(step)?.join(format!("{name}.bin"));
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        Recorder::<B>::record(&recorder, record, path.clone())
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        Ok(path)
    }

    /// Save serializable state as `<name>.json`.
    pub fn save_json<T: Serialize + ?Sized>(
        &self,
        step: usize,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.prepare(step)?.join(format!("{name}.json"));
        let file = io::BufWriter::new(fs::File::create(&path)?);
        serde_json::to_writer(file, value)?;
        Ok(path)
    }

    /// Mark the checkpoint at `step` complete and prune old ones.
    pub fn finish(&self, step: usize) -> Result<CheckpointInfo, CheckpointError> {
        let info = CheckpointInfo {
            path: self.prepare(step)?,
            step,
        };
        log::info!("saved checkpoint {}", info.path.display());
        self.cleanup_old_checkpoints()?;
        Ok(info)
    }

    /// Load a module saved with [`save_module`](Self::save_module).
    pub fn load_module<B: Backend, M: Module<B>>(
        model_template: M,
        dir: &Path,
        name: &str,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model_template
            .load_file(dir.join(format!("{name}.bin")), &recorder, device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    pub fn load_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T, CheckpointError> {
        let file = io::BufReader::new(fs::File::open(dir.join(format!("{name}.json")))?);
        Ok(serde_json::from_reader(file)?)
    }

    /// List all checkpoints, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if !path.is_dir() {
                    return None;
                }
                let step = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix(CKPT_PREFIX)?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo { path, step })
            })
            .collect();

        checkpoints.sort_by_key(|c| c.step);
        Ok(checkpoints)
    }

    pub fn find_latest_checkpoint(&self) -> Result<CheckpointInfo, CheckpointError> {
        self.list_checkpoints()?
            .pop()
            .ok_or(CheckpointError::NoCheckpoints)
    }

    /// Cleanup old checkpoints, keeping only the last N.
    fn cleanup_old_checkpoints(&self) -> Result<(), CheckpointError> {
        if self.config.keep_last_n == 0 {
            return Ok(());
        }

        let checkpoints = self.list_checkpoints()?;
        let excess = checkpoints.len().saturating_sub(self.config.keep_last_n);
        for old in &checkpoints[..excess] {
            if let Err(e) = fs::remove_dir_all(&old.path) {
                log::warn!("failed to remove {}: {e}", old.path.display());
            }
        }
        Ok(())
    }
}
