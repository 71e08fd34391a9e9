//! Generalized Advantage Estimation over a `(T, B)` rollout.
//!
//! Inputs are flat, interleaved by environment:
//!
//! ```text
//! index = t * n_envs + env
//! ```
//!
//! `dones[t]` marks that the episode ended with the transition at `t`, so the
//! value of step `t + 1` is not bootstrapped into it.
//!
//! ```text
//! δ_t = r_t + γ (1 - d_t) V_{t+1} - V_t
//! A_t = δ_t + γ λ (1 - d_t) A_{t+1}
//! R_t = A_t + V_t
//! ```

/// Advantages and returns for every `(t, env)` of the rollout.
///
/// `next_values` are the critic values of the observations following the last
/// step, one per environment.
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[f32],
    next_values: &[f32],
    n_envs: usize,
    gamma: f32,
    gae_lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let total = rewards.len();
    debug_assert_eq!(values.len(), total);
    debug_assert_eq!(dones.len(), total);
    debug_assert_eq!(next_values.len(), n_envs);
    if n_envs == 0 {
        return (Vec::new(), Vec::new());
    }

    let steps = total / n_envs;
    let mut advantages = vec![0.0f32; total];
    for env in 0..n_envs {
        let mut gae = 0.0f32;
        let mut next_value = next_values[env];
        for t in (0..steps).rev() {
            let i = t * n_envs + env;
            let not_done = 1.0 - dones[i];
            let delta = rewards[i] + gamma * next_value * not_done - values[i];
            gae = delta + gamma * gae_lambda * not_done * gae;
            advantages[i] = gae;
            next_value = values[i];
        }
    }

    let returns = advantages.iter().zip(values).map(|(a, v)| a + v).collect();
    (advantages, returns)
}

/// Normalize to zero mean and unit variance in place.
pub fn normalize_advantages(advantages: &mut [f32]) {
    let n = advantages.len();
    if n == 0 {
        return;
    }
    if n == 1 {
        advantages[0] = 0.0;
        return;
    }

    let mean = advantages.iter().sum::<f32>() / n as f32;
    // unbiased, matching torch.std
    let var = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / (n - 1) as f32;
    let std = var.sqrt() + 1e-8;
    for a in advantages.iter_mut() {
        *a = (*a - mean) / std;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_single_step_bootstraps() {
        let (adv, ret) = compute_gae(&[1.0], &[0.5], &[0.0], &[2.0], 1, 0.9, 0.95);
        assert!((adv[0] - (1.0 + 0.9 * 2.0 - 0.5)).abs() < EPS);
        assert!((ret[0] - (1.0 + 0.9 * 2.0)).abs() < EPS);
    }

    #[test]
    fn test_done_cuts_bootstrap() {
        let (adv, _) = compute_gae(&[1.0], &[0.5], &[1.0], &[100.0], 1, 0.99, 0.95);
        assert!((adv[0] - 0.5).abs() < EPS);
    }

    #[test]
    fn test_envs_are_independent() {
        // env 0 ends at t=0, env 1 never ends
        let rewards = [1.0, 1.0, 1.0, 1.0];
        let values = [0.0; 4];
        let dones = [1.0, 0.0, 0.0, 0.0];
        let (adv, _) = compute_gae(&rewards, &values, &dones, &[0.0, 0.0], 2, 1.0, 1.0);
        assert!((adv[0] - 1.0).abs() < EPS);
        assert!((adv[1] - 2.0).abs() < EPS);
        assert!((adv[2] - 1.0).abs() < EPS);
        assert!((adv[3] - 1.0).abs() < EPS);
    }

    #[test]
    fn test_lambda_zero_is_td_error() {
        let rewards = [1.0, 2.0];
        let values = [0.5, 0.25];
        let (adv, _) = compute_gae(&rewards, &values, &[0.0, 0.0], &[1.0], 1, 0.5, 0.0);
        assert!((adv[0] - (1.0 + 0.5 * 0.25 - 0.5)).abs() < EPS);
        assert!((adv[1] - (2.0 + 0.5 * 1.0 - 0.25)).abs() < EPS);
    }

    #[test]
    fn test_normalize() {
        let mut adv = vec![1.0, 2.0, 3.0];
        normalize_advantages(&mut adv);
        assert!(adv.iter().sum::<f32>().abs() < EPS);
        assert!((adv[2] - 1.0).abs() < 1e-4);

        let mut single = vec![5.0];
        normalize_advantages(&mut single);
        assert_eq!(single, vec![0.0]);
    }
}
