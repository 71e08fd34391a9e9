//! SAC networks: squashed Gaussian actor, critic ensemble and temperature.

use burn::module::{Module, Param};
use burn::optim::{AdamConfig, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::tanh;
use burn::tensor::backend::AutodiffBackend;
use flock_envs::ActionSpace;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::algorithms::tensor_to_vec;
use crate::config::ConfigError;
use crate::nn::{Activation, Mlp, MlpConfig};

// Constants for numerical stability
const LOG_STD_MIN: f32 = -5.0;
const LOG_STD_MAX: f32 = 2.0;
const EPSILON: f32 = 1e-6;
const HALF_LOG_2PI: f32 = 0.918_938_5;

// ============================================================================
// Action bounds
// ============================================================================

/// Affine map from `(-1, 1)` to the action box: `a = y * scale + bias`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionBounds {
    pub scale: Vec<f32>,
    pub bias: Vec<f32>,
}

impl ActionBounds {
    /// Bounds of a continuous space; other spaces are rejected.
    pub fn from_space(space: &ActionSpace) -> Result<Self, ConfigError> {
        match space {
            ActionSpace::Continuous { low, high } => Ok(Self {
                scale: low.iter().zip(high).map(|(l, h)| (h - l) / 2.0).collect(),
                bias: low.iter().zip(high).map(|(l, h)| (h + l) / 2.0).collect(),
            }),
            other => Err(ConfigError::Unsupported(format!(
                "SAC only supports continuous action spaces, got {other:?}"
            ))),
        }
    }

    pub fn action_dim(&self) -> usize {
        self.scale.len()
    }

    /// `(scale, bias)` as `[1, D]` tensors for broadcasting.
    fn tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let d = self.action_dim();
        (
            Tensor::<B, 1>::from_floats(self.scale.as_slice(), device).reshape([1, d]),
            Tensor::<B, 1>::from_floats(self.bias.as_slice(), device).reshape([1, d]),
        )
    }
}

/// `[rows, cols]` standard normal noise drawn from `rng`.
pub fn standard_normal<B: Backend, R: Rng + ?Sized>(
    rng: &mut R,
    rows: usize,
    cols: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let noise: Vec<f32> = (0..rows * cols)
        .map(|_| rng.sample::<f32, _>(StandardNormal))
        .collect();
    Tensor::<B, 1>::from_floats(noise.as_slice(), device).reshape([rows, cols])
}

// ============================================================================
// Configuration
// ============================================================================

/// Builds a [`SACAgent`].
#[derive(Debug, Clone)]
pub struct SACAgentConfig {
    pub obs_size: usize,
    pub action_dim: usize,
    pub hidden_size: usize,
    pub n_layers: usize,
    pub num_critics: usize,
    /// Initial temperature.
    pub alpha: f32,
    pub activation: Activation,
    /// Dropout probability inside the critics.
    pub critic_dropout: f64,
    /// Layer norm after every hidden critic layer.
    pub critic_layer_norm: bool,
}

impl SACAgentConfig {
    pub fn new(obs_size: usize, action_dim: usize) -> Self {
        Self {
            obs_size,
            action_dim,
            hidden_size: 256,
            n_layers: 2,
            num_critics: 2,
            alpha: 1.0,
            activation: Activation::Relu,
            critic_dropout: 0.0,
            critic_layer_norm: false,
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

    pub fn with_num_critics(mut self, num_critics: usize) -> Self {
        self.num_critics = num_critics;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// DroQ critics: dropout and layer norm in every hidden block.
    pub fn with_critic_regularization(mut self, dropout: f64, layer_norm: bool) -> Self {
        self.critic_dropout = dropout;
        self.critic_layer_norm = layer_norm;
        self
    }

    fn mlp(&self, d_input: usize, d_output: usize) -> MlpConfig {
        MlpConfig::new(d_input, d_output)
            .with_hidden_size(self.hidden_size)
            .with_n_layers(self.n_layers)
            .with_activation(self.activation)
    }

    pub fn init_actor<B: Backend>(&self, device: &B::Device) -> SACActor<B> {
        SACActor {
            net: self.mlp(self.obs_size, 2 * self.action_dim).init(device),
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> SACAgent<B> {
        let critics = CriticEnsemble {
            critics: (0..self.num_critics)
                .map(|_| Critic {
                    net: self
                        .mlp(self.obs_size + self.action_dim, 1)
                        .with_dropout(self.critic_dropout)
                        .with_layer_norm(self.critic_layer_norm)
                        .init(device),
                })
                .collect(),
        };
        let log_alpha = Tensor::from_floats([self.alpha.max(EPSILON).ln()], device);
        SACAgent {
            actor: self.init_actor(device),
            target_critics: critics.clone().no_grad(),
            critics,
            temperature: Temperature {
                log_alpha: Param::from_tensor(log_alpha),
            },
        }
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Tanh-squashed diagonal Gaussian policy.
#[derive(Module, Debug)]
pub struct SACActor<B: Backend> {
    net: Mlp<B>,
}

impl<B: Backend> SACActor<B> {
    /// Mean and log standard deviation, each `[N, D]`.
    ///
    /// `log_std` is squashed into `[LOG_STD_MIN, LOG_STD_MAX]`.
    pub fn forward(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let out = self.net.forward(obs);
        let d = out.dims()[1] / 2;
        let mean = out.clone().narrow(1, 0, d);
        let log_std = tanh(out.narrow(1, d, d))
            .add_scalar(1.0)
            .mul_scalar(0.5 * (LOG_STD_MAX - LOG_STD_MIN))
            .add_scalar(LOG_STD_MIN);
        (mean, log_std)
    }

    /// Reparameterized actions and their log-probabilities `[N, 1]`.
    ///
    /// ```text
    /// x = μ + σ ε,  y = tanh(x),  a = y * scale + bias
    /// log π(a|s) = Σ [log N(x; μ, σ) - log(scale (1 - y²) + ε)]
    /// ```
    pub fn sample_with_log_prob(
        &self,
        obs: Tensor<B, 2>,
        bounds: &ActionBounds,
        noise: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let device = obs.device();
        let (mean, log_std) = self.forward(obs);
        let (scale, bias) = bounds.tensors::<B>(&device);

        let x = mean + log_std.clone().exp() * noise.clone();
        let y = tanh(x);
        let actions = y.clone() * scale.clone() + bias;

        let normal_log_prob =
            (noise.powf_scalar(2.0).mul_scalar(-0.5) - log_std).sub_scalar(HALF_LOG_2PI);
        let correction = (scale * (y.powf_scalar(2.0).neg().add_scalar(1.0)))
            .add_scalar(EPSILON)
            .log();
        let log_prob = (normal_log_prob - correction).sum_dim(1);
        (actions, log_prob)
    }

    /// Actions for a flat `[n * obs_size]` buffer, flattened `[n * D]`.
    ///
    /// With `greedy` the squashed mean is taken.
    pub fn act<R: Rng + ?Sized>(
        &self,
        observations: &[f32],
        obs_size: usize,
        bounds: &ActionBounds,
        greedy: bool,
        rng: &mut R,
    ) -> Vec<f32> {
        let device = self.devices().into_iter().next().unwrap_or_default();
        let n = observations.len() / obs_size.max(1);
        let obs = Tensor::<B, 1>::from_floats(observations, &device).reshape([n, obs_size]);
        let noise = if greedy {
            Tensor::zeros([n, bounds.action_dim()], &device)
        } else {
            standard_normal(rng, n, bounds.action_dim(), &device)
        };
        let (actions, _) = self.sample_with_log_prob(obs, bounds, noise);
        tensor_to_vec(actions)
    }
}

// ============================================================================
// Critics
// ============================================================================

/// Q network over `obs ++ action`.
#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    net: Mlp<B>,
}

impl<B: Backend> Critic<B> {
    pub fn forward(&self, obs: Tensor<B, 2>, actions: Tensor<B, 2>) -> Tensor<B, 2> {
        self.net.forward(Tensor::cat(vec![obs, actions], 1))
    }
}

/// Independent Q networks evaluated side by side.
#[derive(Module, Debug)]
pub struct CriticEnsemble<B: Backend> {
    critics: Vec<Critic<B>>,
}

impl<B: Backend> CriticEnsemble<B> {
    pub fn len(&self) -> usize {
        self.critics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.critics.is_empty()
    }

    /// Q values of every critic: `[N, num_critics]`.
    pub fn forward(&self, obs: Tensor<B, 2>, actions: Tensor<B, 2>) -> Tensor<B, 2> {
        let qs = self
            .critics
            .iter()
            .map(|c| c.forward(obs.clone(), actions.clone()))
            .collect();
        Tensor::cat(qs, 1)
    }

    /// Pessimistic estimate over the ensemble: `[N, 1]`.
    pub fn min_q(&self, obs: Tensor<B, 2>, actions: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(obs, actions).min_dim(1)
    }

    /// Ensemble average: `[N, 1]`.
    pub fn mean_q(&self, obs: Tensor<B, 2>, actions: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(obs, actions).mean_dim(1)
    }
}

// ============================================================================
// Temperature and agent
// ============================================================================

/// Learnable entropy temperature, stored as `log α`.
#[derive(Module, Debug)]
pub struct Temperature<B: Backend> {
    log_alpha: Param<Tensor<B, 1>>,
}

impl<B: Backend> Temperature<B> {
    pub fn log_alpha(&self) -> Tensor<B, 1> {
        self.log_alpha.val()
    }

    pub fn alpha(&self) -> f32 {
        tensor_to_vec(self.log_alpha().exp())
            .first()
            .copied()
            .unwrap_or(1.0)
    }
}

/// Every network SAC trains, plus the target critics.
#[derive(Module, Debug)]
pub struct SACAgent<B: Backend> {
    pub actor: SACActor<B>,
    pub critics: CriticEnsemble<B>,
    pub target_critics: CriticEnsemble<B>,
    pub temperature: Temperature<B>,
}

/// One Adam optimizer per trained part.
pub struct SACOptimizers<AO, CO, TO> {
    pub actor: AO,
    pub critic: CO,
    pub alpha: TO,
}

/// Adam optimizers for actor, critics and temperature.
pub fn sac_optimizers<B: AutodiffBackend>() -> SACOptimizers<
    impl Optimizer<SACActor<B>, B>,
    impl Optimizer<CriticEnsemble<B>, B>,
    impl Optimizer<Temperature<B>, B>,
> {
    SACOptimizers {
        actor: AdamConfig::new().init(),
        critic: AdamConfig::new().init(),
        alpha: AdamConfig::new().init(),
    }
}
