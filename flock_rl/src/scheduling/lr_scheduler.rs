//! Step-indexed schedules for learning rates and loss coefficients.
//!
//! - `ConstantLR`: fixed value
//! - `LinearDecay`: linear interpolation from start to end
//! - `PolynomialDecay`: `(base - end) * (1 - t/T)^power + end`
//!
//! # Data Integrity
//!
//! Constructors reject non-finite or negative values with a debug panic and
//! sanitize them to `0.0` in release builds. `total_steps = 0` yields the
//! start value for every step.

/// Step-indexed schedule.
pub trait LRScheduler: Send + Sync {
    /// Value at `step`.
    fn get_lr(&self, step: usize) -> f64;
}

fn sanitize(name: &str, value: f64) -> f64 {
    debug_assert!(
        value.is_finite() && value >= 0.0,
        "{name} must be finite and non-negative, got {value}"
    );
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        0.0
    }
}

/// Constant value (no scheduling).
#[derive(Debug, Clone)]
pub struct ConstantLR {
    lr: f64,
}

impl ConstantLR {
    pub fn new(lr: f64) -> Self {
        Self {
            lr: sanitize("ConstantLR: lr", lr),
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }
}

impl LRScheduler for ConstantLR {
    fn get_lr(&self, _step: usize) -> f64 {
        self.lr
    }
}

/// Linear decay from `start_lr` to `end_lr` over `total_steps`, then flat.
#[derive(Debug, Clone)]
pub struct LinearDecay {
    start_lr: f64,
    end_lr: f64,
    total_steps: usize,
}

impl LinearDecay {
    pub fn new(start_lr: f64, end_lr: f64, total_steps: usize) -> Self {
        debug_assert!(total_steps > 0, "LinearDecay: total_steps must be > 0");
        Self {
            start_lr: sanitize("LinearDecay: start_lr", start_lr),
            end_lr: sanitize("LinearDecay: end_lr", end_lr),
            total_steps,
        }
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}

impl LRScheduler for LinearDecay {
    fn get_lr(&self, step: usize) -> f64 {
        if self.total_steps == 0 {
            return self.start_lr;
        }
        let progress = (step as f64 / self.total_steps as f64).min(1.0);
        self.start_lr + (self.end_lr - self.start_lr) * progress
    }
}

/// Polynomial decay; `power = 1` is linear.
///
/// Used to anneal the PPO clip and entropy coefficients.
#[derive(Debug, Clone)]
pub struct PolynomialDecay {
    base_lr: f64,
    end_lr: f64,
    total_steps: usize,
    power: f64,
}

impl PolynomialDecay {
    pub fn new(base_lr: f64, end_lr: f64, total_steps: usize, power: f64) -> Self {
        debug_assert!(total_steps > 0, "PolynomialDecay: total_steps must be > 0");
        debug_assert!(
            power.is_finite() && power > 0.0,
            "PolynomialDecay: power must be > 0 (got {power}). Use power=1.0 for linear decay."
        );
        let power = if power.is_finite() && power > 0.0 {
            power
        } else {
            1.0
        };
        Self {
            base_lr: sanitize("PolynomialDecay: base_lr", base_lr),
            end_lr: sanitize("PolynomialDecay: end_lr", end_lr),
            total_steps,
            power,
        }
    }
}

impl LRScheduler for PolynomialDecay {
    fn get_lr(&self, step: usize) -> f64 {
        if self.total_steps == 0 {
            return self.base_lr;
        }
        if step > self.total_steps || self.base_lr == self.end_lr {
            return self.end_lr;
        }
        let progress = step as f64 / self.total_steps as f64;
        let lr = (self.base_lr - self.end_lr) * (1.0 - progress).powf(self.power) + self.end_lr;
        lr.clamp(0.0, self.base_lr.max(self.end_lr))
    }
}

/// Constant schedule unless `anneal` is set, in which case a linear decay
/// to zero over `total_steps`.
pub fn annealed(value: f64, anneal: bool, total_steps: usize) -> Box<dyn LRScheduler> {
    if anneal && total_steps > 0 {
        Box::new(PolynomialDecay::new(value, 0.0, total_steps, 1.0))
    } else {
        Box::new(ConstantLR::new(value))
    }
}
