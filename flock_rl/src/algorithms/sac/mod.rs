//! Soft Actor-Critic for continuous action spaces.
//!
//! ```text
//! 1. CRITIC:  minimize Σ_i MSE(Q_i(s, a), r + γ(1-d)(min Q'(s', a') - α log π(a'|s')))
//! 2. TARGET:  θ' ← τ θ + (1 - τ) θ'          every target_network_frequency steps
//! 3. ACTOR:   minimize E[α log π(a|s) - min Q(s, a)]
//! 4. ALPHA:   minimize E[-log α (log π(a|s) + H_target)]
//! ```
//!
//! DroQ reuses these updates with regularized critics (see [`DroQArgs`]) and
//! the ensemble mean in the actor objective.

pub mod agent;
pub mod args;
pub mod loss;
pub mod train;

pub use agent::{
    sac_optimizers, standard_normal, ActionBounds, Critic, CriticEnsemble, SACActor, SACAgent,
    SACAgentConfig, SACOptimizers, Temperature,
};
pub use args::{DroQArgs, SACArgs, SACDecoupledArgs};
pub use train::{
    actor_step, critic_step, keys, train_metrics, train_step, QReduction, UpdateParams,
};

#[cfg(test)]
mod tests;
