//! Target networks for off-policy learning.
//!
//! Target networks provide stable TD targets by slowly tracking the online
//! network with Polyak averaging:
//!
//! ```text
//! θ_target = τ * θ_online + (1 - τ) * θ_target
//! ```

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;

// ============================================================================
// Soft Update Implementation via ModuleMapper
// ============================================================================

/// Collects every float parameter of a module, flattened, in traversal order.
///
/// Traversal order is deterministic for modules of the same architecture,
/// which lets parameters of two independently created models be matched.
struct ParamExtractor<B: Backend> {
    params: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for ParamExtractor<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let numel = val.shape().num_elements();
        self.params.push(val.detach().reshape([numel]));
        param
    }
}

/// Interpolates target parameters towards the extracted online ones.
struct SoftUpdateMapper<B: Backend> {
    online_params: Vec<Tensor<B, 1>>,
    tau: f32,
    index: usize,
}

impl<B: Backend> ModuleMapper<B> for SoftUpdateMapper<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let idx = self.index;
        self.index += 1;

        let Some(online) = self.online_params.get(idx) else {
            return param;
        };
        let target = param.val().detach();
        let dims = target.dims();
        let numel = target.shape().num_elements();
        let mixed = online.clone().mul_scalar(self.tau)
            + target.reshape([numel]).mul_scalar(1.0 - self.tau);
        Param::initialized(param.id.clone(), mixed.reshape(dims))
    }
}

/// Polyak update of `target` towards `online`.
///
/// `tau = 1` copies the online weights, `tau = 0` leaves the target as is.
/// The result is detached from any autodiff graph.
pub fn soft_update<B, M>(online: &M, target: M, tau: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    if tau <= 0.0 {
        return target;
    }

    let mut extractor = ParamExtractor { params: Vec::new() };
    let _ = online.clone().map(&mut extractor);

    let mut updater = SoftUpdateMapper {
        online_params: extractor.params,
        tau: tau.min(1.0),
        index: 0,
    };
    target.map(&mut updater).no_grad()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = NdArray<f32>;

    fn weights(model: &Linear<TestBackend>) -> Vec<f32> {
        model.weight.val().into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_soft_update_interpolates() {
        let device = Default::default();
        let online: Linear<TestBackend> = LinearConfig::new(2, 2).init(&device);
        let target: Linear<TestBackend> = LinearConfig::new(2, 2).init(&device);
        let (w_on, w_tg) = (weights(&online), weights(&target));

        let updated = soft_update(&online, target, 0.25);
        for ((u, o), t) in weights(&updated).iter().zip(&w_on).zip(&w_tg) {
            assert!((u - (0.25 * o + 0.75 * t)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_tau_extremes() {
        let device = Default::default();
        let online: Linear<TestBackend> = LinearConfig::new(3, 1).init(&device);
        let target: Linear<TestBackend> = LinearConfig::new(3, 1).init(&device);
        let w_tg = weights(&target);

        let kept = soft_update(&online, target, 0.0);
        assert_eq!(weights(&kept), w_tg);

        let copied = soft_update(&online, kept, 1.0);
        for (c, o) in weights(&copied).iter().zip(weights(&online)) {
            assert!((c - o).abs() < 1e-6);
        }
    }
}
