//! Tests for the PPO agent and update.

use std::thread;

use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use flock_envs::ActionSpace;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::*;
use crate::algorithms::tensor_to_vec;
use crate::buffers::TensorDict;
use crate::distributed::{module_from_bytes, module_to_bytes, world};

type TestBackend = Autodiff<NdArray<f32>>;

const OBS_SIZE: usize = 3;

fn params(lr: f64) -> UpdateParams {
    UpdateParams {
        lr,
        clip_coef: 0.2,
        ent_coef: 0.0,
        vf_coef: 1.0,
        update_epochs: 4,
        batch_size: 4,
        normalize_advantages: false,
        clip_vloss: false,
    }
}

/// Batch where action 1 always has advantage +1.
fn favour_action_one(agent: &PPOAgent<TestBackend>, space: &ActionSpace, n: usize) -> TensorDict {
    let obs = vec![0.5; n * OBS_SIZE];
    let mut rng = StdRng::seed_from_u64(0);
    let step = agent.act(space, &obs, OBS_SIZE, false, &mut rng);
    let actions = vec![1.0; n];

    let device = Default::default();
    let action_tensor = Tensor::<TestBackend, 1>::from_floats(actions.as_slice(), &device).reshape([n, 1]);
    let obs_tensor = Tensor::<TestBackend, 1>::from_floats(obs.as_slice(), &device).reshape([n, OBS_SIZE]);
    let logprobs = tensor_to_vec(agent.distribution(space, obs_tensor).log_prob(action_tensor));

    TensorDict::new(vec![n])
        .with(keys::OBSERVATIONS, &[OBS_SIZE], obs)
        .and_then(|d| d.with(keys::ACTIONS, &[1], actions))
        .and_then(|d| d.with(keys::LOGPROBS, &[], logprobs))
        .and_then(|d| d.with(keys::VALUES, &[], step.values.clone()))
        .and_then(|d| d.with(keys::ADVANTAGES, &[], vec![1.0; n]))
        .and_then(|d| d.with(keys::RETURNS, &[], step.values))
        .unwrap()
}

fn prob_of_one(agent: &PPOAgent<TestBackend>, space: &ActionSpace) -> f32 {
    let device = Default::default();
    let obs = Tensor::<TestBackend, 1>::from_floats([0.5; OBS_SIZE], &device).reshape([1, OBS_SIZE]);
    let action = Tensor::<TestBackend, 1>::from_floats([1.0], &device).reshape([1, 1]);
    tensor_to_vec(agent.distribution(space, obs).log_prob(action))[0].exp()
}

// =============================================================================
// AGENT
// =============================================================================

#[test]
fn test_act_shapes_per_space() {
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(1);
    for space in [
        ActionSpace::Discrete(3),
        ActionSpace::MultiDiscrete(vec![2, 4]),
        ActionSpace::symmetric_box(2, 1.0),
    ] {
        let agent: PPOAgent<TestBackend> = PPOAgentConfig::new(OBS_SIZE, space.clone()).init(&device);
        let step = agent.act(&space, &[0.1; 5 * OBS_SIZE], OBS_SIZE, false, &mut rng);
        assert_eq!(step.actions.len(), 5 * space.action_dim());
        assert_eq!(step.log_probs.len(), 5);
        assert_eq!(step.values.len(), 5);
        assert!(step.log_probs.iter().all(|lp| lp.is_finite()));
    }
}

#[test]
fn test_greedy_is_deterministic() {
    let device = Default::default();
    let space = ActionSpace::Discrete(4);
    let agent: PPOAgent<TestBackend> = PPOAgentConfig::new(OBS_SIZE, space.clone()).init(&device);
    let obs = [0.3; 2 * OBS_SIZE];
    let a = agent.act(&space, &obs, OBS_SIZE, true, &mut StdRng::seed_from_u64(1));
    let b = agent.act(&space, &obs, OBS_SIZE, true, &mut StdRng::seed_from_u64(2));
    assert_eq!(a.actions, b.actions);
}

#[test]
fn test_continuous_agent_has_log_std() {
    let device = Default::default();
    let continuous: PPOAgent<TestBackend> =
        PPOAgentConfig::new(OBS_SIZE, ActionSpace::symmetric_box(2, 1.0)).init(&device);
    let discrete: PPOAgent<TestBackend> =
        PPOAgentConfig::new(OBS_SIZE, ActionSpace::Discrete(2)).init(&device);
    assert_eq!(continuous.num_params(), discrete.num_params() + 2);
}

// =============================================================================
// TRAIN
// =============================================================================

#[test]
fn test_train_moves_towards_advantaged_action() {
    let device = Default::default();
    let space = ActionSpace::Discrete(2);
    let agent: PPOAgent<TestBackend> = PPOAgentConfig::new(OBS_SIZE, space.clone()).init(&device);
    let data = favour_action_one(&agent, &space, 8);
    let before = prob_of_one(&agent, &space);

    let mut optimizer = ppo_optimizer::<TestBackend>(0.5);
    let mut rng = StdRng::seed_from_u64(3);
    let (agent, metrics) =
        train(agent, &mut optimizer, &space, &data, &params(1e-2), None, &mut rng, &device).unwrap();

    assert!(prob_of_one(&agent, &space) > before);
    for key in ["Loss/policy_loss", "Loss/value_loss", "Loss/entropy_loss"] {
        assert!(metrics.contains_key(key), "missing {key}");
    }
}

#[test]
fn test_train_rejects_missing_keys() {
    let device = Default::default();
    let space = ActionSpace::Discrete(2);
    let agent: PPOAgent<TestBackend> = PPOAgentConfig::new(OBS_SIZE, space.clone()).init(&device);
    let data = TensorDict::new(vec![2])
        .with(keys::OBSERVATIONS, &[OBS_SIZE], vec![0.0; 2 * OBS_SIZE])
        .unwrap();
    let mut optimizer = ppo_optimizer::<TestBackend>(0.0);
    let mut rng = StdRng::seed_from_u64(0);
    let result = train(agent, &mut optimizer, &space, &data, &params(1e-3), None, &mut rng, &device);
    assert!(result.is_err());
}

#[test]
fn test_all_reduced_trainers_stay_identical() {
    let device = Default::default();
    let space = ActionSpace::Discrete(2);
    let agent: PPOAgent<TestBackend> = PPOAgentConfig::new(OBS_SIZE, space.clone()).init(&device);
    let weights = module_to_bytes(&agent).unwrap();
    let data = favour_action_one(&agent, &space, 8);
    let chunks = data.split(2).unwrap();

    let handles: Vec<_> = world::<Vec<f32>>(2)
        .into_iter()
        .zip(chunks)
        .map(|(group, chunk)| {
            let (space, weights) = (space.clone(), weights.clone());
            thread::spawn(move || {
                let device = Default::default();
                let template: PPOAgent<TestBackend> =
                    PPOAgentConfig::new(OBS_SIZE, space.clone()).init(&device);
                let agent = module_from_bytes(template, weights, &device).unwrap();
                let mut optimizer = ppo_optimizer::<TestBackend>(0.0);
                let mut rng = StdRng::seed_from_u64(group.rank() as u64);
                let (agent, _) = train(
                    agent,
                    &mut optimizer,
                    &space,
                    &chunk,
                    &params(1e-2),
                    Some(&group),
                    &mut rng,
                    &device,
                )
                .unwrap();
                module_to_bytes(&agent).unwrap()
            })
        })
        .collect();

    let results: Vec<Vec<u8>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_ne!(results[0], weights);
    assert_eq!(results[0], results[1]);
}
