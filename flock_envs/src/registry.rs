//! Environment registry.

use serde::{Deserialize, Serialize};

use crate::cartpole::CartPole;
use crate::dummy::DummyEnv;
use crate::env::VectorizedEnv;
use crate::error::{EnvError, Result};
use crate::pendulum::Pendulum;
use crate::vector::{AutoResetEnv, VecEnv};
use crate::wrappers::{ActionRepeat, ActionStack, ClipReward, TimeLimit};

/// Ids accepted by [`make_env`].
pub const ENV_IDS: &[&str] = &[
    "CartPole-v1",
    "Pendulum-v1",
    "discrete_dummy",
    "multidiscrete_dummy",
    "continuous_dummy",
];

/// Options applied on top of the base environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvOptions {
    pub num_envs: usize,
    /// Repeat each action this many times (1 = off).
    pub action_repeat: usize,
    /// Episode cap in agent steps before action repeat; `None` uses the
    /// environment default.
    pub max_episode_steps: Option<usize>,
    /// Squash rewards with `tanh`.
    pub clip_rewards: bool,
    /// Number of past actions appended to the observation (0 = off).
    pub actions_stack: usize,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            num_envs: 1,
            action_repeat: 1,
            max_episode_steps: None,
            clip_rewards: false,
            actions_stack: 0,
        }
    }
}

impl EnvOptions {
    pub fn new(num_envs: usize) -> Self {
        Self {
            num_envs,
            ..Default::default()
        }
    }

    pub fn with_action_repeat(mut self, action_repeat: usize) -> Self {
        self.action_repeat = action_repeat;
        self
    }

    pub fn with_max_episode_steps(mut self, max_episode_steps: Option<usize>) -> Self {
        self.max_episode_steps = max_episode_steps;
        self
    }

    pub fn with_clip_rewards(mut self, clip_rewards: bool) -> Self {
        self.clip_rewards = clip_rewards;
        self
    }

    pub fn with_actions_stack(mut self, actions_stack: usize) -> Self {
        self.actions_stack = actions_stack;
        self
    }
}

fn default_max_episode_steps(env_id: &str) -> Option<usize> {
    match env_id {
        "CartPole-v1" => Some(500),
        "Pendulum-v1" => Some(200),
        _ => None,
    }
}

fn base_env(env_id: &str, num_envs: usize) -> Result<Box<dyn VectorizedEnv>> {
    Ok(match env_id {
        "CartPole-v1" => Box::new(CartPole::new(num_envs)?),
        "Pendulum-v1" => Box::new(Pendulum::new(num_envs)?),
        "discrete_dummy" => Box::new(DummyEnv::discrete(num_envs)?),
        "multidiscrete_dummy" => Box::new(DummyEnv::multi_discrete(num_envs)?),
        "continuous_dummy" => Box::new(DummyEnv::continuous(num_envs)?),
        other => return Err(EnvError::UnknownEnv(other.to_string())),
    })
}

/// Build a wrapped, auto-resetting vector environment.
///
/// The wrappers stack on a `Box<dyn VectorizedEnv>`; the returned
/// [`VecEnv`] adds auto-reset and episode statistics on top.
///
/// `max_episode_steps` counts raw environment steps, so it is divided by
/// `action_repeat` before the time limit is applied.
pub fn make_env(env_id: &str, options: &EnvOptions) -> Result<VecEnv> {
    let mut env = base_env(env_id, options.num_envs)?;

    if options.action_repeat > 1 {
        env = Box::new(ActionRepeat::new(env, options.action_repeat)?);
    }

    let max_steps = options
        .max_episode_steps
        .or_else(|| default_max_episode_steps(env_id));
    if let Some(max_steps) = max_steps {
        let limit = (max_steps / options.action_repeat.max(1)).max(1);
        env = Box::new(TimeLimit::new(env, limit)?);
    }

    if options.clip_rewards {
        env = Box::new(ClipReward::new(env));
    }

    if options.actions_stack > 0 {
        env = Box::new(ActionStack::new(env, options.actions_stack)?);
    }

    env.action_space().validate()?;
    log::debug!(
        "built {} x{} (obs {}, actions {:?})",
        env_id,
        env.n_envs(),
        env.obs_size(),
        env.action_space()
    );
    Ok(AutoResetEnv::new(env))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::ActionSpace;

    #[test]
    fn test_every_id_builds() {
        for id in ENV_IDS {
            let env = make_env(id, &EnvOptions::new(2)).unwrap();
            assert_eq!(env.n_envs(), 2);
        }
    }

    #[test]
    fn test_unknown_id() {
        assert_eq!(
            make_env("MountainCar-v0", &EnvOptions::new(1)).err(),
            Some(EnvError::UnknownEnv("MountainCar-v0".into()))
        );
    }

    #[test]
    fn test_action_repeat_scales_time_limit() {
        let options = EnvOptions::new(1)
            .with_action_repeat(2)
            .with_max_episode_steps(Some(8));
        let mut env = make_env("discrete_dummy", &options).unwrap();
        env.reset(0);
        for _ in 0..3 {
            assert!(env.step(&[0.0]).unwrap().episodes.is_empty());
        }
        let step = env.step(&[0.0]).unwrap();
        assert_eq!(step.truncations, vec![true]);
        assert_eq!(step.episodes[0].ret, 8.0);
    }

    #[test]
    fn test_actions_stack_extends_observation() {
        let options = EnvOptions::new(1).with_actions_stack(3);
        let env = make_env("multidiscrete_dummy", &options).unwrap();
        assert_eq!(env.obs_size(), 3 + 3 * 4);
        assert_eq!(env.action_space(), ActionSpace::MultiDiscrete(vec![2, 2]));
    }

    #[test]
    fn test_make_env_auto_resets_and_records_episodes() {
        let options = EnvOptions::new(1).with_max_episode_steps(Some(2));
        let mut env: VecEnv = make_env("continuous_dummy", &options).unwrap();
        let first = env.reset(0);
        env.step(&[0.0, 0.0]).unwrap();
        let step = env.step(&[0.0, 0.0]).unwrap();
        assert_eq!(step.episodes.len(), 1);
        assert_eq!(step.episodes[0].ret, 2.0);
        // the finished env restarts from its initial observation
        assert_eq!(step.observations, first);
    }
}
