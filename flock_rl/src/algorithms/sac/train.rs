//! One SAC gradient step.

use std::collections::BTreeMap;

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use rand::Rng;

use super::agent::{
    standard_normal, ActionBounds, CriticEnsemble, SACActor, SACAgent, SACOptimizers, Temperature,
};
use super::loss::{alpha_loss, critic_loss, policy_loss, td_target};
use crate::algorithms::tensor_to_scalar;
use crate::buffers::TensorDict;
use crate::core::soft_update;
use crate::distributed::{all_reduce_grads, Communicator};
use crate::error::Result;

/// Keys of a SAC training batch.
pub mod keys {
    pub const OBSERVATIONS: &str = "observations";
    pub const NEXT_OBSERVATIONS: &str = "next_observations";
    pub const ACTIONS: &str = "actions";
    pub const REWARDS: &str = "rewards";
    pub const DONES: &str = "dones";
}

/// Coefficients of a SAC update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    pub gamma: f32,
    pub tau: f32,
    pub actor_lr: f64,
    pub critic_lr: f64,
    pub alpha_lr: f64,
    /// `-action_dim` by convention.
    pub target_entropy: f32,
}

fn reduce<B, M>(
    module: &M,
    grads: GradientsParams,
    group: Option<&Communicator<Vec<f32>>>,
) -> Result<GradientsParams>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    match group {
        Some(group) => all_reduce_grads(module, grads, group),
        None => Ok(grads),
    }
}

/// How the actor objective aggregates the critic ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QReduction {
    /// Pessimistic minimum, as in SAC.
    #[default]
    Min,
    /// Ensemble mean, as in DroQ.
    Mean,
}

/// Critic regression on one batch, then the optional target update.
///
/// Returns the critic loss.
#[allow(clippy::too_many_arguments)]
pub fn critic_step<B, AO, CO, TO, R>(
    mut agent: SACAgent<B>,
    optimizers: &mut SACOptimizers<AO, CO, TO>,
    bounds: &ActionBounds,
    batch: &TensorDict,
    params: &UpdateParams,
    update_target: bool,
    group: Option<&Communicator<Vec<f32>>>,
    rng: &mut R,
    device: &B::Device,
) -> Result<(SACAgent<B>, f32)>
where
    B: AutodiffBackend,
    AO: Optimizer<SACActor<B>, B>,
    CO: Optimizer<CriticEnsemble<B>, B>,
    TO: Optimizer<Temperature<B>, B>,
    R: Rng + ?Sized,
{
    let n = batch.len();
    let obs = batch.to_tensor2::<B>(keys::OBSERVATIONS, device)?;
    let next_obs = batch.to_tensor2::<B>(keys::NEXT_OBSERVATIONS, device)?;
    let actions = batch.to_tensor2::<B>(keys::ACTIONS, device)?;
    let rewards = batch.to_tensor2::<B>(keys::REWARDS, device)?;
    let dones = batch.to_tensor2::<B>(keys::DONES, device)?;
    let alpha = agent.temperature.alpha();

    let noise = standard_normal(rng, n, bounds.action_dim(), device);
    let (next_actions, next_log_prob) =
        agent.actor.sample_with_log_prob(next_obs.clone(), bounds, noise);
    let min_next_q = agent
        .target_critics
        .min_q(next_obs, next_actions.detach())
        .detach();
    let target = td_target(
        rewards,
        dones,
        min_next_q,
        next_log_prob.detach(),
        params.gamma,
        alpha,
    );
    let q_loss = critic_loss(agent.critics.forward(obs, actions), target);
    let q_loss_value = tensor_to_scalar(q_loss.clone());

    let grads = GradientsParams::from_grads(q_loss.backward(), &agent.critics);
    let grads = reduce(&agent.critics, grads, group)?;
    agent.critics = optimizers
        .critic
        .step(params.critic_lr, agent.critics, grads);

    if update_target {
        agent.target_critics = soft_update(&agent.critics, agent.target_critics, params.tau);
    }
    Ok((agent, q_loss_value))
}

/// Actor and temperature updates on one batch.
///
/// Returns the policy loss and the temperature loss.
#[allow(clippy::too_many_arguments)]
pub fn actor_step<B, AO, CO, TO, R>(
    mut agent: SACAgent<B>,
    optimizers: &mut SACOptimizers<AO, CO, TO>,
    bounds: &ActionBounds,
    batch: &TensorDict,
    params: &UpdateParams,
    reduction: QReduction,
    group: Option<&Communicator<Vec<f32>>>,
    rng: &mut R,
    device: &B::Device,
) -> Result<(SACAgent<B>, f32, f32)>
where
    B: AutodiffBackend,
    AO: Optimizer<SACActor<B>, B>,
    CO: Optimizer<CriticEnsemble<B>, B>,
    TO: Optimizer<Temperature<B>, B>,
    R: Rng + ?Sized,
{
    let n = batch.len();
    let obs = batch.to_tensor2::<B>(keys::OBSERVATIONS, device)?;
    let alpha = agent.temperature.alpha();

    // ====================================================================
    // ACTOR UPDATE
    // ====================================================================
    let noise = standard_normal(rng, n, bounds.action_dim(), device);
    let (new_actions, log_prob) = agent.actor.sample_with_log_prob(obs.clone(), bounds, noise);
    let q = match reduction {
        QReduction::Min => agent.critics.min_q(obs, new_actions),
        QReduction::Mean => agent.critics.mean_q(obs, new_actions),
    };
    let actor_loss = policy_loss(alpha, log_prob.clone(), q);
    let actor_loss_value = tensor_to_scalar(actor_loss.clone());

    let grads = GradientsParams::from_grads(actor_loss.backward(), &agent.actor);
    let grads = reduce(&agent.actor, grads, group)?;
    agent.actor = optimizers.actor.step(params.actor_lr, agent.actor, grads);

    // ====================================================================
    // ALPHA UPDATE
    // ====================================================================
    let a_loss = alpha_loss(agent.temperature.log_alpha(), log_prob, params.target_entropy);
    let alpha_loss_value = tensor_to_scalar(a_loss.clone());

    let grads = GradientsParams::from_grads(a_loss.backward(), &agent.temperature);
    let grads = reduce(&agent.temperature, grads, group)?;
    agent.temperature = optimizers
        .alpha
        .step(params.alpha_lr, agent.temperature, grads);

    Ok((agent, actor_loss_value, alpha_loss_value))
}

/// Loss and temperature metrics under the shared metric names.
pub fn train_metrics(
    value_loss: f32,
    policy_loss: f32,
    alpha_loss: f32,
    alpha: f32,
) -> BTreeMap<String, f32> {
    let mut metrics = BTreeMap::new();
    metrics.insert("Loss/value_loss".to_string(), value_loss);
    metrics.insert("Loss/policy_loss".to_string(), policy_loss);
    metrics.insert("Loss/alpha_loss".to_string(), alpha_loss);
    metrics.insert("Params/alpha".to_string(), alpha);
    metrics
}

/// Critic, actor and temperature updates on one batch.
///
/// The target critics move towards the critics when `update_target` is set.
/// With a `group`, each gradient is averaged over its ranks before the step.
#[allow(clippy::too_many_arguments)]
pub fn train_step<B, AO, CO, TO, R>(
    agent: SACAgent<B>,
    optimizers: &mut SACOptimizers<AO, CO, TO>,
    bounds: &ActionBounds,
    batch: &TensorDict,
    params: &UpdateParams,
    update_target: bool,
    group: Option<&Communicator<Vec<f32>>>,
    rng: &mut R,
    device: &B::Device,
) -> Result<(SACAgent<B>, BTreeMap<String, f32>)>
where
    B: AutodiffBackend,
    AO: Optimizer<SACActor<B>, B>,
    CO: Optimizer<CriticEnsemble<B>, B>,
    TO: Optimizer<Temperature<B>, B>,
    R: Rng + ?Sized,
{
    let alpha = agent.temperature.alpha();
    let (agent, q_loss) = critic_step(
        agent,
        optimizers,
        bounds,
        batch,
        params,
        update_target,
        group,
        rng,
        device,
    )?;
    let (agent, pi_loss, a_loss) = actor_step(
        agent,
        optimizers,
        bounds,
        batch,
        params,
        QReduction::Min,
        group,
        rng,
        device,
    )?;
    Ok((agent, train_metrics(q_loss, pi_loss, a_loss, alpha)))
}
