//! Action distributions for on-policy agents.
//!
//! The distribution family follows the action space:
//!
//! | space           | distribution                             |
//! |-----------------|------------------------------------------|
//! | `Discrete`      | categorical over logits                  |
//! | `MultiDiscrete` | product of categoricals, one per branch  |
//! | `Continuous`    | diagonal Normal, state-independent σ     |
//!
//! Actions are `[N, action_dim]` float tensors; categorical branches hold the
//! chosen index as a float.

use burn::prelude::*;
use burn::tensor::activation::{log_softmax, softmax};
use flock_envs::ActionSpace;
use rand::Rng;
use rand_distr::StandardNormal;

use super::tensor_to_vec;

const HALF_LOG_2PI: f32 = 0.918_938_5;

/// Distribution over a batch of actions.
#[derive(Debug, Clone)]
pub enum ActionDistribution<B: Backend> {
    /// One `[N, n_i]` logits tensor per branch.
    Categorical { logits: Vec<Tensor<B, 2>> },
    /// `[N, D]` means and log standard deviations.
    Normal {
        mean: Tensor<B, 2>,
        log_std: Tensor<B, 2>,
    },
}

impl<B: Backend> ActionDistribution<B> {
    /// Build the distribution for `space` from the actor output `[N, n_outputs]`.
    ///
    /// `log_std` (shape `[D]`) is only used by continuous spaces; `None` means
    /// unit variance.
    pub fn new(
        space: &ActionSpace,
        actor_out: Tensor<B, 2>,
        log_std: Option<Tensor<B, 1>>,
    ) -> Self {
        match space.branches() {
            Some(branches) => {
                let mut logits = Vec::with_capacity(branches.len());
                let mut offset = 0;
                for n in branches {
                    logits.push(actor_out.clone().narrow(1, offset, n));
                    offset += n;
                }
                Self::Categorical { logits }
            }
            None => {
                let [n, d] = actor_out.dims();
                let log_std = match log_std {
                    Some(log_std) => log_std.unsqueeze_dim::<2>(0).repeat_dim(0, n),
                    None => Tensor::zeros([n, d], &actor_out.device()),
                };
                Self::Normal {
                    mean: actor_out,
                    log_std,
                }
            }
        }
    }

    /// Log-probability of `actions`, summed over branches or dimensions: `[N]`.
    pub fn log_prob(&self, actions: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            Self::Categorical { logits } => {
                let mut total: Option<Tensor<B, 2>> = None;
                for (i, branch) in logits.iter().enumerate() {
                    let index = actions.clone().narrow(1, i, 1).int();
                    let lp = log_softmax(branch.clone(), 1).gather(1, index);
                    total = Some(match total {
                        Some(t) => t + lp,
                        None => lp,
                    });
                }
                match total {
                    Some(t) => t.flatten(0, 1),
                    None => Tensor::zeros([actions.dims()[0]], &actions.device()),
                }
            }
            Self::Normal { mean, log_std } => {
                let z = (actions - mean.clone()) / log_std.clone().exp();
                let per_dim = (z.powf_scalar(2.0).mul_scalar(-0.5) - log_std.clone())
                    .sub_scalar(HALF_LOG_2PI);
                per_dim.sum_dim(1).flatten(0, 1)
            }
        }
    }

    /// Entropy per sample: `[N]`.
    pub fn entropy(&self) -> Tensor<B, 1> {
        match self {
            Self::Categorical { logits } => {
                let mut total: Option<Tensor<B, 2>> = None;
                for branch in logits {
                    let logp = log_softmax(branch.clone(), 1);
                    let h = -(logp.clone().exp() * logp).sum_dim(1);
                    total = Some(match total {
                        Some(t) => t + h,
                        None => h,
                    });
                }
                match total {
                    Some(t) => t.flatten(0, 1),
                    None => Tensor::zeros([0], &Default::default()),
                }
            }
            Self::Normal { log_std, .. } => log_std
                .clone()
                .add_scalar(0.5 + HALF_LOG_2PI)
                .sum_dim(1)
                .flatten(0, 1),
        }
    }

    /// Draw one action per row, flattened `[N * action_dim]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f32> {
        match self {
            Self::Categorical { logits } => {
                let probs: Vec<(usize, Vec<f32>)> = logits
                    .iter()
                    .map(|l| (l.dims()[1], tensor_to_vec(softmax(l.clone(), 1))))
                    .collect();
                let rows = logits.first().map_or(0, |l| l.dims()[0]);
                let mut out = Vec::with_capacity(rows * probs.len());
                for row in 0..rows {
                    for (n, p) in &probs {
                        let p = &p[row * n..(row + 1) * n];
                        let u: f32 = rng.gen();
                        out.push(categorical_index(p, u) as f32);
                    }
                }
                out
            }
            Self::Normal { mean, log_std } => {
                let mean = tensor_to_vec(mean.clone());
                let std = tensor_to_vec(log_std.clone().exp());
                mean.iter()
                    .zip(&std)
                    .map(|(m, s)| m + s * rng.sample::<f32, _>(StandardNormal))
                    .collect()
            }
        }
    }

    /// Most likely action per row, flattened `[N * action_dim]`.
    pub fn mode(&self) -> Vec<f32> {
        match self {
            Self::Categorical { logits } => {
                let rows = logits.first().map_or(0, |l| l.dims()[0]);
                let argmax: Vec<Vec<f32>> = logits
                    .iter()
                    .map(|l| tensor_to_vec(l.clone().argmax(1).float()))
                    .collect();
                (0..rows)
                    .flat_map(|row| argmax.iter().map(move |a| a[row]))
                    .collect()
            }
            Self::Normal { mean, .. } => tensor_to_vec(mean.clone()),
        }
    }
}

/// Inverse CDF lookup; falls back to the last index on rounding error.
fn categorical_index(probs: &[f32], u: f32) -> usize {
    let mut acc = 0.0;
    for (i, p) in probs.iter().enumerate() {
        acc += p;
        if u < acc {
            return i;
        }
    }
    probs.len().saturating_sub(1)
}
