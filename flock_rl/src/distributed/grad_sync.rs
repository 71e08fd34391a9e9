//! Gradient averaging across trainer ranks.
//!
//! Gradients are flattened in module traversal order, which is identical on
//! every rank since all trainers build the same architecture. A parameter
//! without a gradient contributes zeros.

use burn::module::{AutodiffModule, ModuleMapper, Param};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use super::collective::{Communicator, ReduceOp};
use crate::error::Result;

// ============================================================================
// Flatten
// ============================================================================

struct GradFlattener<'g> {
    grads: &'g GradientsParams,
    flat: Vec<f32>,
}

impl<B: AutodiffBackend> ModuleMapper<B> for GradFlattener<'_> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        match self.grads.get::<B::InnerBackend, D>(param.id.clone()) {
            Some(grad) => self.flat.extend(grad.into_data().iter::<f32>()),
            None => {
                let numel = param.val().shape().num_elements();
                self.flat.extend(std::iter::repeat(0.0).take(numel));
            }
        }
        param
    }
}

// ============================================================================
// Write back
// ============================================================================

struct GradWriter<'g> {
    grads: &'g mut GradientsParams,
    flat: Vec<f32>,
    offset: usize,
}

impl<B: AutodiffBackend> ModuleMapper<B> for GradWriter<'_> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let numel = param.val().shape().num_elements();
        let start = self.offset;
        self.offset += numel;

        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(param.id.clone()) {
            let dims = grad.dims();
            let device = grad.device();
            let averaged = Tensor::<B::InnerBackend, 1>::from_floats(
                &self.flat[start..start + numel],
                &device,
            )
            .reshape(dims);
            self.grads.register(param.id.clone(), averaged);
        }
        param
    }
}

/// Replace `grads` with their mean over every rank of `group`.
///
/// All ranks must call this with a model of the same architecture.
pub fn all_reduce_grads<B, M>(
    module: &M,
    mut grads: GradientsParams,
    group: &Communicator<Vec<f32>>,
) -> Result<GradientsParams>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    if group.world_size() == 1 {
        return Ok(grads);
    }

    let mut flattener = GradFlattener {
        grads: &grads,
        flat: Vec::new(),
    };
    let _ = module.clone().map(&mut flattener);
    let mut flat = flattener.flat;

    group.all_reduce(&mut flat, ReduceOp::Mean)?;

    let mut writer = GradWriter {
        grads: &mut grads,
        flat,
        offset: 0,
    };
    let _ = module.clone().map(&mut writer);
    Ok(grads)
}
