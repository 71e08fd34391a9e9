//! Thread-based process groups for decoupled training.
//!
//! Rank 0 is the player, ranks `1..=N` are trainers. The player and the
//! trainers talk over a [`Communicator<Packet>`](crate::messages::Packet);
//! trainers additionally share an optimization group of size `N` used to
//! average gradients.

pub mod collective;
pub mod grad_sync;
pub mod launcher;
pub mod weights;

pub use collective::{world, CollectiveError, Communicator, ReduceOp};
pub use grad_sync::all_reduce_grads;
pub use launcher::{rank_name, run_ranks, RankJob};
pub use weights::{module_from_bytes, module_to_bytes};

#[cfg(test)]
mod tests;
