//! SAC loss functions.

use burn::prelude::*;

/// Soft TD target `r + γ (1 - d) (min Q'(s', a') - α log π(a'|s'))`.
///
/// All inputs are `[N, 1]`.
pub fn td_target<B: Backend>(
    rewards: Tensor<B, 2>,
    dones: Tensor<B, 2>,
    min_next_q: Tensor<B, 2>,
    next_log_prob: Tensor<B, 2>,
    gamma: f32,
    alpha: f32,
) -> Tensor<B, 2> {
    let soft_value = min_next_q - next_log_prob.mul_scalar(alpha);
    rewards + dones.neg().add_scalar(1.0) * soft_value.mul_scalar(gamma)
}

/// Sum over critics of the mean squared TD error.
///
/// `q_values` is `[N, num_critics]`, `target` is `[N, 1]`.
pub fn critic_loss<B: Backend>(q_values: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    let num_critics = q_values.dims()[1] as f32;
    (q_values - target)
        .powf_scalar(2.0)
        .mean()
        .mul_scalar(num_critics)
}

/// `mean(α log π - min Q)`.
pub fn policy_loss<B: Backend>(
    alpha: f32,
    log_prob: Tensor<B, 2>,
    min_q: Tensor<B, 2>,
) -> Tensor<B, 1> {
    (log_prob.mul_scalar(alpha) - min_q).mean()
}

/// `mean(-log α (log π + H_target))` with a detached `log π`.
pub fn alpha_loss<B: Backend>(
    log_alpha: Tensor<B, 1>,
    log_prob: Tensor<B, 2>,
    target_entropy: f32,
) -> Tensor<B, 1> {
    let n = log_prob.dims()[0];
    let log_alpha = log_alpha.reshape([1, 1]).repeat_dim(0, n);
    (log_alpha.neg() * log_prob.detach().add_scalar(target_entropy)).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::tensor_to_scalar;
    use crate::algorithms::tensor_to_vec;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn col(values: &[f32]) -> Tensor<TestBackend, 2> {
        Tensor::<TestBackend, 1>::from_floats(values, &Default::default())
            .reshape([values.len(), 1])
    }

    #[test]
    fn test_td_target_cuts_on_done() {
        let target = td_target(
            col(&[1.0, 1.0]),
            col(&[0.0, 1.0]),
            col(&[10.0, 10.0]),
            col(&[-1.0, -1.0]),
            0.5,
            2.0,
        );
        // 1 + 0.5 * (10 + 2)
        assert_eq!(tensor_to_vec(target), vec![7.0, 1.0]);
    }

    #[test]
    fn test_critic_loss_sums_critics() {
        let q = Tensor::<TestBackend, 1>::from_floats([1.0, 3.0], &Default::default())
            .reshape([1, 2]);
        // (1 - 2)^2 + (3 - 2)^2
        assert!((tensor_to_scalar(critic_loss(q, col(&[2.0]))) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_policy_and_alpha_loss() {
        let pl = policy_loss(0.5, col(&[-2.0, 0.0]), col(&[1.0, 1.0]));
        assert!((tensor_to_scalar(pl) + 1.5).abs() < 1e-6);

        let log_alpha = Tensor::<TestBackend, 1>::from_floats([2.0], &Default::default());
        // -2 * (-1 + -1)
        let al = alpha_loss(log_alpha, col(&[-1.0, -1.0]), -1.0);
        assert!((tensor_to_scalar(al) - 4.0).abs() < 1e-6);
    }
}
