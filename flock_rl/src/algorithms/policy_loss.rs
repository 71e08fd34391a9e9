//! PPO loss terms.
//!
//! # Numerical Stability
//!
//! The log ratio is clamped to [-20, 20] before `exp()`, limiting importance
//! ratios to roughly [2e-9, 4.9e8].

use burn::tensor::{backend::Backend, Tensor};

/// Maximum log ratio before exp() to prevent overflow.
const MAX_LOG_RATIO: f32 = 20.0;

/// Negative clipped surrogate objective.
///
/// `L = -mean(min(r A, clip(r, 1-ε, 1+ε) A))` with `r = exp(logp - old_logp)`.
pub fn ppo_clip_loss<B: Backend>(
    log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_coef: f32,
) -> Tensor<B, 1> {
    let ratio = (log_probs - old_log_probs)
        .clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO)
        .exp();
    let clipped = ratio.clone().clamp(1.0 - clip_coef, 1.0 + clip_coef);

    let surr1 = ratio * advantages.clone();
    let surr2 = clipped * advantages;
    -surr1.min_pair(surr2).mean()
}

/// Mean squared error of the value predictions.
///
/// With `clip` set, predictions are first limited to `old_values ± clip`.
pub fn value_loss<B: Backend>(
    values: Tensor<B, 1>,
    old_values: Tensor<B, 1>,
    returns: Tensor<B, 1>,
    clip: Option<f32>,
) -> Tensor<B, 1> {
    let pred = match clip {
        Some(clip) => old_values.clone() + (values - old_values).clamp(-clip, clip),
        None => values,
    };
    (pred - returns).powf_scalar(2.0).mean()
}

/// Negative mean entropy; add with a positive coefficient to encourage exploration.
pub fn entropy_loss<B: Backend>(entropy: Tensor<B, 1>) -> Tensor<B, 1> {
    -entropy.mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::tensor_to_scalar;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn t(values: &[f32]) -> Tensor<TestBackend, 1> {
        Tensor::from_floats(values, &Default::default())
    }

    #[test]
    fn test_unchanged_policy_is_minus_mean_advantage() {
        let loss = ppo_clip_loss(t(&[-1.0, -2.0]), t(&[-1.0, -2.0]), t(&[1.0, 3.0]), 0.2);
        assert!((tensor_to_scalar(loss) + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_ratio_is_clipped_for_positive_advantage() {
        // ratio = e ≈ 2.718, clipped to 1.2
        let loss = ppo_clip_loss(t(&[0.0]), t(&[-1.0]), t(&[1.0]), 0.2);
        assert!((tensor_to_scalar(loss) + 1.2).abs() < 1e-5);
    }

    #[test]
    fn test_value_loss_clip() {
        let unclipped = value_loss(t(&[3.0]), t(&[0.0]), t(&[3.0]), None);
        assert!(tensor_to_scalar(unclipped).abs() < 1e-6);

        // prediction limited to 0 + 0.5
        let clipped = value_loss(t(&[3.0]), t(&[0.0]), t(&[3.0]), Some(0.5));
        assert!((tensor_to_scalar(clipped) - 6.25).abs() < 1e-5);
    }

    #[test]
    fn test_entropy_loss_sign() {
        assert!((tensor_to_scalar(entropy_loss(t(&[1.0, 3.0]))) + 2.0).abs() < 1e-6);
    }
}
