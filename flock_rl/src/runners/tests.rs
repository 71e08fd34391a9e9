//! Dry runs of every training loop against the dummy environments.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

use super::*;
use crate::algorithms::ppo::{PPOArgs, PPODecoupledArgs};
use crate::algorithms::sac::{DroQArgs, SACArgs, SACDecoupledArgs};
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::config::{ConfigError, StandardArgs};
use crate::error::Error;

fn dry_common(root: &Path, env_id: &str) -> StandardArgs {
    StandardArgs {
        env_id: Some(env_id.to_string()),
        num_envs: 2,
        root_dir: root.to_path_buf(),
        run_name: Some("dry".to_string()),
        dry_run: true,
        log_every: 1,
        ..Default::default()
    }
}

fn small_ppo(root: &Path) -> PPOArgs {
    PPOArgs {
        common: dry_common(root, "discrete_dummy"),
        rollout_steps: 8,
        update_epochs: 2,
        per_rank_batch_size: 4,
        hidden_size: 8,
        ..Default::default()
    }
}

fn small_sac(root: &Path) -> SACArgs {
    SACArgs {
        common: dry_common(root, "continuous_dummy"),
        per_rank_batch_size: 4,
        buffer_size: 64,
        learning_starts: 4,
        hidden_size: 8,
        checkpoint_buffer: true,
        ..Default::default()
    }
}

fn run_dir(root: &Path) -> PathBuf {
    root.join("dry").join("version_0")
}

/// Assert the run layout and return the latest checkpoint directory.
fn latest_checkpoint(run: &Path, files: &[&str]) -> (PathBuf, TrainState) {
    assert!(run.join("args.json").is_file());
    assert!(run.join("metrics.csv").is_file());
    #[cfg(feature = "tensorboard")]
    let has_events = fs::read_dir(run)
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("events.out.tfevents.")
        });
    #[cfg(feature = "tensorboard")]
    assert!(has_events, "no tensorboard event file in {}", run.display());

    let checkpointer =
        Checkpointer::new(CheckpointerConfig::new(run.join("checkpoint"))).unwrap();
    let latest = checkpointer.find_latest_checkpoint().unwrap();
    for file in files {
        assert!(
            latest.path.join(file).is_file(),
            "{file} missing from {}",
            latest.path.display()
        );
    }
    let state: TrainState = Checkpointer::load_json(&latest.path, "state").unwrap();
    assert_eq!(state.global_step, latest.step);
    (latest.path, state)
}

// =============================================================================
// PPO
// =============================================================================

#[test]
fn test_ppo_dry_run() {
    let root = tempdir().unwrap();
    ppo::main(small_ppo(root.path())).unwrap();

    let (_, state) = latest_checkpoint(
        &run_dir(root.path()),
        &["agent.bin", "optimizer.bin", "state.json"],
    );
    assert_eq!(state.update, 1);
    assert_eq!(state.global_step, 16);

    let args: PPOArgs =
        serde_json::from_reader(fs::File::open(run_dir(root.path()).join("args.json")).unwrap())
            .unwrap();
    assert_eq!(args.common.run_name.as_deref(), Some("dry"));
    assert_eq!(args.rollout_steps, 8);
}

#[test]
fn test_ppo_decoupled_dry_run() {
    let root = tempdir().unwrap();
    let args = PPODecoupledArgs {
        ppo: small_ppo(root.path()),
        num_trainers: 2,
    };
    ppo_decoupled::main(args).unwrap();

    let (_, state) = latest_checkpoint(
        &run_dir(root.path()),
        &["agent.bin", "optimizer.bin", "state.json"],
    );
    assert_eq!(state.update, 1);
}

#[test]
fn test_ppo_decoupled_rejects_uneven_split() {
    let root = tempdir().unwrap();
    let mut ppo = small_ppo(root.path());
    ppo.rollout_steps = 5;
    ppo.common.num_envs = 1;
    let args = PPODecoupledArgs {
        ppo,
        num_trainers: 2,
    };

    let err = ppo_decoupled::main(args).unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::NotDivisible { .. })
    ));
    assert!(!root.path().join("dry").exists());
}

// =============================================================================
// SAC
// =============================================================================

const SAC_FILES: &[&str] = &[
    "agent.bin",
    "actor_optimizer.bin",
    "critic_optimizer.bin",
    "alpha_optimizer.bin",
    "state.json",
    "rb.json",
];

#[test]
fn test_sac_dry_run() {
    let root = tempdir().unwrap();
    sac::main(small_sac(root.path())).unwrap();

    // learning starts on the second vector step; the dry run stops after the third
    let (_, state) = latest_checkpoint(&run_dir(root.path()), SAC_FILES);
    assert_eq!(state.update, 3);
    assert_eq!(state.global_step, 6);
}

#[test]
fn test_sac_decoupled_dry_run() {
    let root = tempdir().unwrap();
    let args = SACDecoupledArgs {
        sac: small_sac(root.path()),
        num_trainers: 2,
    };
    sac_decoupled::main(args).unwrap();

    let (_, state) = latest_checkpoint(&run_dir(root.path()), SAC_FILES);
    assert_eq!(state.global_step, 6);
}

fn checkpoint_steps(run: &Path) -> Vec<usize> {
    Checkpointer::new(CheckpointerConfig::new(run.join("checkpoint")))
        .unwrap()
        .list_checkpoints()
        .unwrap()
        .iter()
        .map(|c| c.step)
        .collect()
}

#[test]
fn test_sac_loops_checkpoint_before_learning_starts() {
    let coupled = tempdir().unwrap();
    sac::main(small_sac(coupled.path())).unwrap();

    let decoupled = tempdir().unwrap();
    let args = SACDecoupledArgs {
        sac: small_sac(decoupled.path()),
        num_trainers: 2,
    };
    sac_decoupled::main(args).unwrap();

    // the first vector step only collects, and is still checkpointed
    let run = run_dir(decoupled.path());
    assert_eq!(checkpoint_steps(&run), vec![2, 4, 6]);
    assert_eq!(checkpoint_steps(&run_dir(coupled.path())), vec![2, 4, 6]);

    let first = run.join("checkpoint").join("ckpt_2");
    for file in SAC_FILES {
        assert!(first.join(file).is_file(), "{file} missing");
    }
    let state: TrainState = Checkpointer::load_json(&first, "state").unwrap();
    assert_eq!((state.update, state.global_step), (1, 2));
}

#[test]
fn test_droq_dry_run() {
    let root = tempdir().unwrap();
    let mut sac = small_sac(root.path());
    sac.gradient_steps = 3;
    let args = DroQArgs {
        sac,
        ..Default::default()
    };
    droq::main(args).unwrap();

    let run = run_dir(root.path());
    let (_, state) = latest_checkpoint(&run, SAC_FILES);
    assert_eq!(state.update, 3);
    assert_eq!(state.global_step, 6);
    let saved: DroQArgs = Checkpointer::load_json(&run, "args").unwrap();
    assert!(saved.layer_norm);
    assert_eq!(saved.sac.gradient_steps, 3);
}

#[test]
fn test_sac_rejects_discrete_actions() {
    let root = tempdir().unwrap();
    let mut args = small_sac(root.path());
    args.common.env_id = Some("discrete_dummy".to_string());

    let err = sac::main(args).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::Unsupported(_))));
    assert!(!root.path().join("dry").exists());
}

// =============================================================================
// EVALUATION
// =============================================================================

#[test]
fn test_episode_runs_to_completion() {
    let root = tempdir().unwrap();
    let mut common = dry_common(root.path(), "discrete_dummy");
    common.max_episode_steps = Some(10);
    let reward = test_episode(&common, |_| vec![0.0]).unwrap();
    assert_eq!(reward, 10.0);
}

#[test]
fn test_checkpoint_schedule() {
    let root = tempdir().unwrap();
    let mut args = dry_common(root.path(), "discrete_dummy");
    args.dry_run = false;
    args.checkpoint_every = 3;
    let due: Vec<usize> = (1..=7)
        .filter(|&u| common::should_checkpoint(&args, u, 7))
        .collect();
    assert_eq!(due, vec![3, 6, 7]);
}
