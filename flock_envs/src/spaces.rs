//! Action spaces.
//!
//! Actions always travel as flat `f32` buffers laid out `[n_envs * action_dim]`.
//! Discrete branches are encoded as the integer index stored in an `f32`.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EnvError, Result};

/// Action space of a vectorized environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionSpace {
    /// A single categorical choice among `n` actions.
    Discrete(usize),
    /// Several independent categorical branches.
    MultiDiscrete(Vec<usize>),
    /// A box in R^d with per-dimension bounds.
    Continuous { low: Vec<f32>, high: Vec<f32> },
}

impl ActionSpace {
    /// Symmetric continuous box `[-bound, bound]^dim`.
    pub fn symmetric_box(dim: usize, bound: f32) -> Self {
        Self::Continuous {
            low: vec![-bound; dim],
            high: vec![bound; dim],
        }
    }

    /// Reject spaces with no actions: empty categorical branches, no
    /// branches or dimensions at all, or boxes with `low > high`.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Discrete(0) => Err(EnvError::invalid(
                "action_space",
                "Discrete(0) has no actions",
            )),
            Self::Discrete(_) => Ok(()),
            Self::MultiDiscrete(nvec) if nvec.is_empty() => {
                Err(EnvError::invalid("action_space", "MultiDiscrete has no branches"))
            }
            Self::MultiDiscrete(nvec) => match nvec.iter().position(|&n| n == 0) {
                Some(i) => Err(EnvError::invalid(
                    "action_space",
                    format!("MultiDiscrete branch {i} has no actions"),
                )),
                None => Ok(()),
            },
            Self::Continuous { low, high } => {
                if low.is_empty() || low.len() != high.len() {
                    return Err(EnvError::invalid(
                        "action_space",
                        format!("box bounds of lengths {} and {}", low.len(), high.len()),
                    ));
                }
                if low.iter().zip(high).any(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi) {
                    return Err(EnvError::invalid("action_space", "box has low > high"));
                }
                Ok(())
            }
        }
    }

    /// Floats per action in the flat action buffer.
    pub fn action_dim(&self) -> usize {
        match self {
            Self::Discrete(_) => 1,
            Self::MultiDiscrete(nvec) => nvec.len(),
            Self::Continuous { low, .. } => low.len(),
        }
    }

    /// Width of the policy head (logits or means).
    pub fn n_outputs(&self) -> usize {
        match self {
            Self::Discrete(n) => *n,
            Self::MultiDiscrete(nvec) => nvec.iter().sum(),
            Self::Continuous { low, .. } => low.len(),
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Continuous { .. })
    }

    /// Branch sizes for the categorical spaces, `None` for continuous ones.
    pub fn branches(&self) -> Option<Vec<usize>> {
        match self {
            Self::Discrete(n) => Some(vec![*n]),
            Self::MultiDiscrete(nvec) => Some(nvec.clone()),
            Self::Continuous { .. } => None,
        }
    }

    /// Append one uniformly random action to `out`.
    pub fn sample_into<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut Vec<f32>) {
        match self {
            Self::Discrete(n) => out.push(rng.gen_range(0..*n) as f32),
            Self::MultiDiscrete(nvec) => {
                out.extend(nvec.iter().map(|&n| rng.gen_range(0..n) as f32));
            }
            Self::Continuous { low, high } => {
                out.extend(
                    low.iter()
                        .zip(high)
                        .map(|(&lo, &hi)| lo + rng.gen::<f32>() * (hi - lo)),
                );
            }
        }
    }

    /// Whether a single action lies inside the space.
    pub fn contains(&self, action: &[f32]) -> bool {
        if action.len() != self.action_dim() {
            return false;
        }
        match self {
            Self::Discrete(n) => in_range(action[0], *n),
            Self::MultiDiscrete(nvec) => action.iter().zip(nvec).all(|(&a, &n)| in_range(a, n)),
            Self::Continuous { low, high } => action
                .iter()
                .zip(low.iter().zip(high))
                .all(|(&a, (&lo, &hi))| a >= lo && a <= hi),
        }
    }

    /// Clamp a flat `[n * action_dim]` buffer to the bounds of a continuous
    /// space. Categorical actions are left untouched.
    pub fn clip(&self, actions: &mut [f32]) {
        if let Self::Continuous { low, high } = self {
            let dim = low.len();
            for (i, a) in actions.iter_mut().enumerate() {
                *a = a.clamp(low[i % dim], high[i % dim]);
            }
        }
    }

    /// Encode a single action as a `n_outputs()`-wide feature vector.
    ///
    /// The space must have passed [`validate`](Self::validate).
    ///
    /// Categorical branches become one-hot blocks, continuous actions are
    /// copied as is.
    pub fn encode(&self, action: &[f32], out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.n_outputs());
        out.iter_mut().for_each(|x| *x = 0.0);
        match self {
            Self::Continuous { .. } => out.copy_from_slice(action),
            Self::Discrete(n) => {
                let idx = (action[0].max(0.0) as usize).min(n - 1);
                out[idx] = 1.0;
            }
            Self::MultiDiscrete(nvec) => {
                let mut offset = 0;
                for (&a, &n) in action.iter().zip(nvec) {
                    let idx = (a.max(0.0) as usize).min(n - 1);
                    out[offset + idx] = 1.0;
                    offset += n;
                }
            }
        }
    }
}

fn in_range(a: f32, n: usize) -> bool {
    a >= 0.0 && a.fract() == 0.0 && (a as usize) < n
}
