//! Tests for the SAC agent and update.

use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use flock_envs::ActionSpace;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::*;
use crate::algorithms::tensor_to_vec;
use crate::buffers::TensorDict;
use crate::config::ConfigError;
use crate::distributed::module_to_bytes;

type TestBackend = Autodiff<NdArray<f32>>;

const OBS_SIZE: usize = 3;

fn bounds() -> ActionBounds {
    ActionBounds::from_space(&ActionSpace::Continuous {
        low: vec![-2.0, 0.0],
        high: vec![2.0, 1.0],
    })
    .unwrap()
}

fn small_agent() -> SACAgent<TestBackend> {
    SACAgentConfig::new(OBS_SIZE, 2)
        .with_hidden_size(16)
        .with_alpha(0.5)
        .init(&Default::default())
}

fn batch(n: usize) -> TensorDict {
    let obs: Vec<f32> = (0..n * OBS_SIZE).map(|i| (i % 7) as f32 * 0.1).collect();
    TensorDict::new(vec![n])
        .with(keys::OBSERVATIONS, &[OBS_SIZE], obs.clone())
        .and_then(|d| d.with(keys::NEXT_OBSERVATIONS, &[OBS_SIZE], obs))
        .and_then(|d| d.with(keys::ACTIONS, &[2], vec![0.5; n * 2]))
        .and_then(|d| d.with(keys::REWARDS, &[1], vec![1.0; n]))
        .and_then(|d| d.with(keys::DONES, &[1], vec![0.0; n]))
        .unwrap()
}

fn params() -> UpdateParams {
    UpdateParams {
        gamma: 0.99,
        tau: 0.005,
        actor_lr: 1e-3,
        critic_lr: 1e-3,
        alpha_lr: 1e-3,
        target_entropy: -2.0,
    }
}

// =============================================================================
// BOUNDS AND ACTOR
// =============================================================================

#[test]
fn test_bounds_from_space() {
    let b = bounds();
    assert_eq!(b.scale, vec![2.0, 0.5]);
    assert_eq!(b.bias, vec![0.0, 0.5]);

    assert!(matches!(
        ActionBounds::from_space(&ActionSpace::Discrete(2)),
        Err(ConfigError::Unsupported(_))
    ));
}

#[test]
fn test_actions_respect_bounds() {
    let agent = small_agent();
    let mut rng = StdRng::seed_from_u64(0);
    let actions = agent.actor.act(&[3.0; 16 * OBS_SIZE], OBS_SIZE, &bounds(), false, &mut rng);
    assert_eq!(actions.len(), 32);
    for pair in actions.chunks(2) {
        assert!((-2.0..=2.0).contains(&pair[0]));
        assert!((0.0..=1.0).contains(&pair[1]));
    }
}

#[test]
fn test_log_prob_finite_and_shaped() {
    let agent = small_agent();
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(1);
    let obs = Tensor::<TestBackend, 2>::ones([5, OBS_SIZE], &device);
    let noise = standard_normal(&mut rng, 5, 2, &device);
    let (actions, log_prob) = agent.actor.sample_with_log_prob(obs, &bounds(), noise);
    assert_eq!(actions.dims(), [5, 2]);
    assert_eq!(log_prob.dims(), [5, 1]);
    assert!(tensor_to_vec(log_prob).iter().all(|v| v.is_finite()));
}

#[test]
fn test_initial_alpha() {
    assert!((small_agent().temperature.alpha() - 0.5).abs() < 1e-6);
}

#[test]
fn test_critic_ensemble_shape() {
    let agent: SACAgent<TestBackend> = SACAgentConfig::new(OBS_SIZE, 2)
        .with_hidden_size(8)
        .with_num_critics(3)
        .init(&Default::default());
    let device = Default::default();
    let q = agent.critics.forward(
        Tensor::zeros([4, OBS_SIZE], &device),
        Tensor::zeros([4, 2], &device),
    );
    assert_eq!(q.dims(), [4, 3]);
    assert_eq!(agent.critics.len(), 3);
}

// =============================================================================
// TRAIN STEP
// =============================================================================

#[test]
fn test_train_step_updates_every_part() {
    let agent = small_agent();
    let device = Default::default();
    let before_actor = module_to_bytes(&agent.actor).unwrap();
    let before_target = module_to_bytes(&agent.target_critics).unwrap();
    let alpha = agent.temperature.alpha();

    let mut optimizers = sac_optimizers::<TestBackend>();
    let mut rng = StdRng::seed_from_u64(2);
    let (agent, metrics) = train_step(
        agent,
        &mut optimizers,
        &bounds(),
        &batch(8),
        &params(),
        true,
        None,
        &mut rng,
        &device,
    )
    .unwrap();

    assert_ne!(module_to_bytes(&agent.actor).unwrap(), before_actor);
    assert_ne!(module_to_bytes(&agent.target_critics).unwrap(), before_target);
    assert!((agent.temperature.alpha() - alpha).abs() > 0.0);
    for key in ["Loss/value_loss", "Loss/policy_loss", "Loss/alpha_loss"] {
        assert!(metrics[key].is_finite(), "{key}");
    }
}

#[test]
fn test_target_untouched_without_update() {
    let agent = small_agent();
    let before_target = module_to_bytes(&agent.target_critics).unwrap();
    let mut optimizers = sac_optimizers::<TestBackend>();
    let mut rng = StdRng::seed_from_u64(3);
    let (agent, _) = train_step(
        agent,
        &mut optimizers,
        &bounds(),
        &batch(4),
        &params(),
        false,
        None,
        &mut rng,
        &Default::default(),
    )
    .unwrap();
    assert_eq!(module_to_bytes(&agent.target_critics).unwrap(), before_target);
}

#[test]
fn test_sac_networks_use_relu() {
    let config = SACAgentConfig::new(OBS_SIZE, 2);
    assert_eq!(config.activation, crate::nn::Activation::Relu);
    assert_eq!(config.critic_dropout, 0.0);
    assert!(!config.critic_layer_norm);
}

#[test]
fn test_mean_q_between_min_and_max() {
    let agent: SACAgent<TestBackend> = SACAgentConfig::new(OBS_SIZE, 2)
        .with_hidden_size(8)
        .with_num_critics(3)
        .init(&Default::default());
    let device = Default::default();
    let obs = Tensor::<TestBackend, 2>::ones([5, OBS_SIZE], &device);
    let actions = Tensor::<TestBackend, 2>::ones([5, 2], &device);
    let qs = tensor_to_vec(agent.critics.forward(obs.clone(), actions.clone()));
    let means = tensor_to_vec(agent.critics.mean_q(obs.clone(), actions.clone()));
    let mins = tensor_to_vec(agent.critics.min_q(obs, actions));
    for (row, (&mean, &min)) in qs.chunks(3).zip(means.iter().zip(&mins)) {
        let expected = row.iter().sum::<f32>() / 3.0;
        assert!((mean - expected).abs() < 1e-5);
        assert!(min <= mean + 1e-6);
    }
}

// =============================================================================
// DROQ CRITICS
// =============================================================================

fn droq_agent() -> SACAgent<TestBackend> {
    SACAgentConfig::new(OBS_SIZE, 2)
        .with_hidden_size(16)
        .with_critic_regularization(0.01, true)
        .init(&Default::default())
}

#[test]
fn test_regularized_critics_add_layer_norm_parameters() {
    let plain = small_agent();
    let droq = droq_agent();
    // actor unchanged, each critic gains gamma and beta for two [16] layers
    assert_eq!(plain.actor.num_params(), droq.actor.num_params());
    assert_eq!(
        droq.critics.num_params(),
        plain.critics.num_params() + 2 * 2 * 2 * 16
    );
}

#[test]
fn test_critic_step_leaves_actor_and_alpha() {
    let agent = droq_agent();
    let before_actor = module_to_bytes(&agent.actor).unwrap();
    let before_critics = module_to_bytes(&agent.critics).unwrap();
    let alpha = agent.temperature.alpha();
    let mut optimizers = sac_optimizers::<TestBackend>();
    let mut rng = StdRng::seed_from_u64(4);

    let (agent, loss) = critic_step(
        agent,
        &mut optimizers,
        &bounds(),
        &batch(8),
        &params(),
        true,
        None,
        &mut rng,
        &Default::default(),
    )
    .unwrap();
    assert!(loss.is_finite());
    assert_ne!(module_to_bytes(&agent.critics).unwrap(), before_critics);
    assert_eq!(module_to_bytes(&agent.actor).unwrap(), before_actor);
    assert_eq!(agent.temperature.alpha(), alpha);
}

#[test]
fn test_actor_step_with_mean_reduction() {
    let agent = droq_agent();
    let before_actor = module_to_bytes(&agent.actor).unwrap();
    let before_critics = module_to_bytes(&agent.critics).unwrap();
    let alpha = agent.temperature.alpha();
    let mut optimizers = sac_optimizers::<TestBackend>();
    let mut rng = StdRng::seed_from_u64(5);

    let (agent, pi_loss, a_loss) = actor_step(
        agent,
        &mut optimizers,
        &bounds(),
        &batch(8),
        &params(),
        QReduction::Mean,
        None,
        &mut rng,
        &Default::default(),
    )
    .unwrap();
    assert!(pi_loss.is_finite() && a_loss.is_finite());
    assert_ne!(module_to_bytes(&agent.actor).unwrap(), before_actor);
    assert_eq!(module_to_bytes(&agent.critics).unwrap(), before_critics);
    assert!((agent.temperature.alpha() - alpha).abs() > 0.0);
}
