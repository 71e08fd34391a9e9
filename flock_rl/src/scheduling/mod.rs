//! Learning rate and coefficient scheduling.
//!
//! ## Available Schedulers
//!
//! - [`ConstantLR`]: No scheduling (constant rate)
//! - [`LinearDecay`]: Linear interpolation from start to end LR
//! - [`PolynomialDecay`]: Polynomial decay with configurable power
//!
//! ## Example
//!
//! ```rust,ignore
//! let scheduler = LinearDecay::new(1e-3, 0.0, num_updates);
//! let lr = scheduler.get_lr(update - 1);
//! model = optimizer.step(lr, model, grads);
//! ```

pub mod lr_scheduler;

#[cfg(test)]
mod tests;

pub use lr_scheduler::{annealed, ConstantLR, LRScheduler, LinearDecay, PolynomialDecay};
