//! PPO update over a flattened rollout.

use std::collections::BTreeMap;

use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use flock_envs::ActionSpace;
use rand::seq::SliceRandom;
use rand::Rng;

use super::agent::PPOAgent;
use crate::algorithms::gae::normalize_advantages;
use crate::algorithms::policy_loss::{entropy_loss, ppo_clip_loss, value_loss};
use crate::algorithms::tensor_to_scalar;
use crate::buffers::TensorDict;
use crate::distributed::{all_reduce_grads, Communicator};
use crate::error::Result;
use crate::metrics::MetricAggregator;

/// Keys of a PPO training batch.
pub mod keys {
    pub const OBSERVATIONS: &str = "observations";
    pub const ACTIONS: &str = "actions";
    pub const LOGPROBS: &str = "logprobs";
    pub const VALUES: &str = "values";
    pub const REWARDS: &str = "rewards";
    pub const DONES: &str = "dones";
    pub const ADVANTAGES: &str = "advantages";
    pub const RETURNS: &str = "returns";
}

/// Coefficients of one update, after annealing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    pub lr: f64,
    pub clip_coef: f32,
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub update_epochs: usize,
    pub batch_size: usize,
    pub normalize_advantages: bool,
    pub clip_vloss: bool,
}

/// Run `update_epochs` passes of shuffled minibatch updates over `data`.
///
/// `data` must be flat (`[N]`) and carry observations, actions, logprobs,
/// values, advantages and returns. With a `group`, gradients are averaged
/// over its ranks after every backward pass; every rank must then hold a
/// chunk of the same size.
///
/// Returns the updated agent and the mean `Loss/*` metrics.
#[allow(clippy::too_many_arguments)]
pub fn train<B, O, R>(
    mut agent: PPOAgent<B>,
    optimizer: &mut O,
    space: &ActionSpace,
    data: &TensorDict,
    params: &UpdateParams,
    group: Option<&Communicator<Vec<f32>>>,
    rng: &mut R,
    device: &B::Device,
) -> Result<(PPOAgent<B>, BTreeMap<String, f32>)>
where
    B: AutodiffBackend,
    O: Optimizer<PPOAgent<B>, B>,
    R: Rng + ?Sized,
{
    let n = data.len();
    let batch_size = params.batch_size.max(1);
    let mut aggregator = MetricAggregator::new();
    let mut indices: Vec<usize> = (0..n).collect();

    for _ in 0..params.update_epochs {
        indices.shuffle(rng);
        for chunk in indices.chunks(batch_size) {
            let batch = data.select(chunk);
            let obs = batch.to_tensor2::<B>(keys::OBSERVATIONS, device)?;
            let actions = batch.to_tensor2::<B>(keys::ACTIONS, device)?;
            let old_logprobs = batch.to_tensor1::<B>(keys::LOGPROBS, device)?;
            let old_values = batch.to_tensor1::<B>(keys::VALUES, device)?;
            let returns = batch.to_tensor1::<B>(keys::RETURNS, device)?;

            let mut advantages = batch.data(keys::ADVANTAGES)?.to_vec();
            if params.normalize_advantages {
                normalize_advantages(&mut advantages);
            }
            let advantages = Tensor::<B, 1>::from_floats(advantages.as_slice(), device);

            let dist = agent.distribution(space, obs.clone());
            let new_logprobs = dist.log_prob(actions);
            let entropy = dist.entropy();
            let new_values = agent.value(obs);

            let pg_loss = ppo_clip_loss(new_logprobs, old_logprobs, advantages, params.clip_coef);
            let v_loss = value_loss(
                new_values,
                old_values,
                returns,
                params.clip_vloss.then_some(params.clip_coef),
            );
            let ent_loss = entropy_loss(entropy);

            aggregator.update("Loss/policy_loss", tensor_to_scalar(pg_loss.clone()));
            aggregator.update("Loss/value_loss", tensor_to_scalar(v_loss.clone()));
            aggregator.update("Loss/entropy_loss", tensor_to_scalar(ent_loss.clone()));

            let loss = pg_loss
                + v_loss.mul_scalar(params.vf_coef)
                + ent_loss.mul_scalar(params.ent_coef);
            let grads = GradientsParams::from_grads(loss.backward(), &agent);
            let grads = match group {
                Some(group) => all_reduce_grads(&agent, grads, group)?,
                None => grads,
            };
            agent = optimizer.step(params.lr, agent, grads);
        }
    }

    Ok((agent, aggregator.compute()))
}
