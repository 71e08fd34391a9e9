//! Packets exchanged between the player and the trainers.
//!
//! ```text
//!   player (rank 0)                         trainers (ranks 1..=N)
//!   ───────────────                         ──────────────────────
//!   broadcast Setup ──────────────────────► build agent + optimizer
//!   loop:
//!     scatter [Idle, Data, Data, ...] ────► train on chunk
//!     recv broadcast from rank 1 ◄───────── Weights (rank 1)
//!     gather ◄──────────────────────────── Metrics (every trainer)
//!   (SAC before learning starts, when a checkpoint is due:)
//!     scatter [Idle, Checkpoint, ...] ────► rank 1 saves untrained state
//!     gather ◄──────────────────────────── Idle (every trainer)
//!   scatter [Idle, Stop, Stop, ...] ──────► return
//! ```

use std::collections::BTreeMap;

use flock_envs::ActionSpace;

use crate::buffers::TensorDict;

/// Message on the player/trainer world.
#[derive(Debug, Clone)]
pub enum Packet {
    /// Environment description and initial agent weights.
    Setup {
        obs_size: usize,
        action_space: ActionSpace,
        weights: Vec<u8>,
    },

    /// One chunk of training data.
    Data {
        update: usize,
        global_step: usize,
        /// Rank 1 writes a checkpoint after this update.
        checkpoint: bool,
        batch: TensorDict,
    },

    /// Save a checkpoint without training; rank 1 writes it.
    Checkpoint { update: usize, global_step: usize },

    /// Shut down after the current step.
    Stop,

    /// Placeholder for the player's own slot in a scatter.
    Idle,

    /// Serialized agent (or actor) weights.
    Weights(Vec<u8>),

    /// Per-trainer training metrics.
    Metrics(BTreeMap<String, f32>),
}

impl Packet {
    /// Variant name, for protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "Setup",
            Self::Data { .. } => "Data",
            Self::Checkpoint { .. } => "Checkpoint",
            Self::Stop => "Stop",
            Self::Idle => "Idle",
            Self::Weights(_) => "Weights",
            Self::Metrics(_) => "Metrics",
        }
    }

    /// Scatter payload: `Idle` for the player followed by `chunks`.
    pub fn data_scatter(
        update: usize,
        global_step: usize,
        checkpoint: bool,
        chunks: Vec<TensorDict>,
    ) -> Vec<Packet> {
        std::iter::once(Packet::Idle)
            .chain(chunks.into_iter().map(|batch| Packet::Data {
                update,
                global_step,
                checkpoint,
                batch,
            }))
            .collect()
    }

    /// Scatter payload asking the trainers for a checkpoint.
    pub fn checkpoint_scatter(update: usize, global_step: usize, world_size: usize) -> Vec<Packet> {
        std::iter::once(Packet::Idle)
            .chain((1..world_size).map(|_| Packet::Checkpoint {
                update,
                global_step,
            }))
            .collect()
    }

    /// Scatter payload telling every trainer to stop.
    pub fn stop_scatter(world_size: usize) -> Vec<Packet> {
        std::iter::once(Packet::Idle)
            .chain((1..world_size).map(|_| Packet::Stop))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_scatter_reserves_player_slot() {
        let chunks = vec![TensorDict::new(vec![2]), TensorDict::new(vec![2])];
        let packets = Packet::data_scatter(3, 96, true, chunks);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].kind(), "Idle");
        match &packets[2] {
            Packet::Data {
                update,
                global_step,
                checkpoint,
                batch,
            } => {
                assert_eq!((*update, *global_step, *checkpoint), (3, 96, true));
                assert_eq!(batch.len(), 2);
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn test_stop_scatter() {
        let kinds: Vec<_> = Packet::stop_scatter(3).iter().map(Packet::kind).collect();
        assert_eq!(kinds, vec!["Idle", "Stop", "Stop"]);
    }

    #[test]
    fn test_checkpoint_scatter() {
        let packets = Packet::checkpoint_scatter(2, 4, 3);
        let kinds: Vec<_> = packets.iter().map(Packet::kind).collect();
        assert_eq!(kinds, vec!["Idle", "Checkpoint", "Checkpoint"]);
        assert!(matches!(
            packets[1],
            Packet::Checkpoint {
                update: 2,
                global_step: 4
            }
        ));
    }
}
