//! Actor-critic agent for PPO.

use burn::module::{Module, Param};
use burn::grad_clipping::GradientClippingConfig;
use burn::optim::{AdamConfig, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use flock_envs::ActionSpace;
use rand::Rng;

use crate::algorithms::distribution::ActionDistribution;
use crate::algorithms::tensor_to_vec;
use crate::nn::{Mlp, MlpConfig};

/// Builds a [`PPOAgent`].
#[derive(Debug, Clone)]
pub struct PPOAgentConfig {
    pub obs_size: usize,
    pub action_space: ActionSpace,
    pub hidden_size: usize,
    pub n_layers: usize,
}

impl PPOAgentConfig {
    pub fn new(obs_size: usize, action_space: ActionSpace) -> Self {
        Self {
            obs_size,
            action_space,
            hidden_size: 64,
            n_layers: 2,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_n_layers(mut self, n_layers: usize) -> Self {
        self.n_layers = n_layers;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> PPOAgent<B> {
        let mlp = |d_output| {
            MlpConfig::new(self.obs_size, d_output)
                .with_hidden_size(self.hidden_size)
                .with_n_layers(self.n_layers)
        };
        let log_std = self
            .action_space
            .is_continuous()
            .then(|| Param::from_tensor(Tensor::zeros([self.action_space.action_dim()], device)));
        PPOAgent {
            actor: mlp(self.action_space.n_outputs()).init(device),
            critic: mlp(1).init(device),
            log_std,
        }
    }
}

/// Separate actor and critic MLPs.
///
/// Continuous spaces carry a state-independent learnable `log_std`.
#[derive(Module, Debug)]
pub struct PPOAgent<B: Backend> {
    actor: Mlp<B>,
    critic: Mlp<B>,
    log_std: Option<Param<Tensor<B, 1>>>,
}

/// Actions chosen for one vector step, with their statistics.
#[derive(Debug, Clone, Default)]
pub struct PolicyStep {
    /// `[n_envs * action_dim]`
    pub actions: Vec<f32>,
    /// `[n_envs]`
    pub log_probs: Vec<f32>,
    /// `[n_envs]`
    pub values: Vec<f32>,
}

impl<B: Backend> PPOAgent<B> {
    pub fn distribution(&self, space: &ActionSpace, obs: Tensor<B, 2>) -> ActionDistribution<B> {
        let log_std = self.log_std.as_ref().map(|p| p.val());
        ActionDistribution::new(space, self.actor.forward(obs), log_std)
    }

    /// Critic estimate per row: `[N]`.
    pub fn value(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        self.critic.forward(obs).flatten(0, 1)
    }

    /// Critic estimates for a flat `[n * obs_size]` observation buffer.
    pub fn values(&self, observations: &[f32], obs_size: usize) -> Vec<f32> {
        let device = self.devices().into_iter().next().unwrap_or_default();
        let n = observations.len() / obs_size.max(1);
        let obs = Tensor::<B, 1>::from_floats(observations, &device).reshape([n, obs_size]);
        tensor_to_vec(self.value(obs))
    }

    /// Choose actions for a flat `[n * obs_size]` observation buffer.
    ///
    /// With `greedy` the distribution mode is taken.
    pub fn act<R: Rng + ?Sized>(
        &self,
        space: &ActionSpace,
        observations: &[f32],
        obs_size: usize,
        greedy: bool,
        rng: &mut R,
    ) -> PolicyStep {
        let device = self.devices().into_iter().next().unwrap_or_default();
        let n = observations.len() / obs_size.max(1);
        let obs = Tensor::<B, 1>::from_floats(observations, &device).reshape([n, obs_size]);

        let dist = self.distribution(space, obs.clone());
        let actions = if greedy { dist.mode() } else { dist.sample(rng) };
        let action_tensor = Tensor::<B, 1>::from_floats(actions.as_slice(), &device)
            .reshape([n, space.action_dim()]);

        PolicyStep {
            log_probs: tensor_to_vec(dist.log_prob(action_tensor)),
            values: tensor_to_vec(self.value(obs)),
            actions,
        }
    }
}

/// Adam with `eps = 1e-4`, clipping the gradient norm when `max_grad_norm > 0`.
pub fn ppo_optimizer<B: AutodiffBackend>(
    max_grad_norm: f32,
) -> impl Optimizer<PPOAgent<B>, B> {
    let mut adam_config = AdamConfig::new().with_epsilon(1e-4);
    if max_grad_norm > 0.0 {
        adam_config =
            adam_config.with_grad_clipping(Some(GradientClippingConfig::Norm(max_grad_norm)));
    }
    adam_config.init()
}
