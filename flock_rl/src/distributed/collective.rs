//! In-process collectives over crossbeam channels.
//!
//! A world of `n` ranks is a full matrix of unbounded channels: every rank
//! owns one sender per destination and one receiver per source. Messages
//! between a fixed pair of ranks are delivered in order, so the collectives
//! below are safe to interleave as long as all ranks issue them in the same
//! sequence.
//!
//! ```text
//!            rank 0          rank 1          rank 2
//! broadcast  send x ──────►  recv x
//!                   └─────────────────────►  recv x
//! scatter    [a,b,c]   ──►   b          ──►  c   (rank 0 keeps a)
//! gather     [a,b,c]   ◄──   b          ◄──  c
//! ```
//!
//! Dropping a [`Communicator`] disconnects it; peers blocked on it get
//! [`CollectiveError::Disconnected`] instead of hanging.

use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;

/// Failures of point-to-point and collective operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectiveError {
    #[error("peer rank {peer} disconnected")]
    Disconnected { peer: usize },

    #[error("rank {rank} is outside a world of size {world_size}")]
    InvalidRank { rank: usize, world_size: usize },

    #[error("expected {expected} items, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The root of a collective was called without its payload.
    #[error("rank {0} is the root but provided no payload")]
    MissingPayload(usize),
}

/// Reduction applied by [`Communicator::all_reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
}

/// One rank's endpoint in a world of ranks.
pub struct Communicator<T> {
    rank: usize,
    world_size: usize,
    /// `senders[dst]` delivers to `dst`. The self slot is never used.
    senders: Vec<Sender<T>>,
    /// `receivers[src]` yields what `src` sent to this rank.
    receivers: Vec<Receiver<T>>,
}

/// Create a fully connected world of `world_size` ranks.
///
/// The returned vector is indexed by rank.
pub fn world<T>(world_size: usize) -> Vec<Communicator<T>> {
    // channels[src][dst]
    let mut senders: Vec<Vec<Sender<T>>> = (0..world_size).map(|_| Vec::new()).collect();
    let mut receivers: Vec<Vec<Receiver<T>>> = (0..world_size).map(|_| Vec::new()).collect();
    for src_senders in senders.iter_mut() {
        for dst_receivers in receivers.iter_mut() {
            let (tx, rx) = unbounded();
            src_senders.push(tx);
            dst_receivers.push(rx);
        }
    }

    senders
        .into_iter()
        .zip(receivers)
        .enumerate()
        .map(|(rank, (senders, receivers))| Communicator {
            rank,
            world_size,
            senders,
            receivers,
        })
        .collect()
}

impl<T> Communicator<T> {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    fn check_rank(&self, rank: usize) -> Result<(), CollectiveError> {
        if rank >= self.world_size {
            return Err(CollectiveError::InvalidRank {
                rank,
                world_size: self.world_size,
            });
        }
        Ok(())
    }

    /// Point-to-point send. Never blocks.
    pub fn send(&self, dst: usize, msg: T) -> Result<(), CollectiveError> {
        self.check_rank(dst)?;
        self.senders[dst]
            .send(msg)
            .map_err(|_| CollectiveError::Disconnected { peer: dst })
    }

    /// Block until `src` sends to this rank.
    pub fn recv(&self, src: usize) -> Result<T, CollectiveError> {
        self.check_rank(src)?;
        self.receivers[src]
            .recv()
            .map_err(|_| CollectiveError::Disconnected { peer: src })
    }

    /// Distribute `items[i]` to rank `i`; the root keeps its own item.
    ///
    /// `items` is only read on the root and must hold `world_size` entries.
    pub fn scatter(&self, src: usize, items: Option<Vec<T>>) -> Result<T, CollectiveError> {
        self.check_rank(src)?;
        if self.rank != src {
            return self.recv(src);
        }

        let items = items.ok_or(CollectiveError::MissingPayload(self.rank))?;
        if items.len() != self.world_size {
            return Err(CollectiveError::LengthMismatch {
                expected: self.world_size,
                actual: items.len(),
            });
        }
        let mut own = None;
        for (dst, item) in items.into_iter().enumerate() {
            if dst == self.rank {
                own = Some(item);
            } else {
                self.send(dst, item)?;
            }
        }
        own.ok_or(CollectiveError::MissingPayload(self.rank))
    }

    /// Collect one item from every rank on `dst`, ordered by rank.
    ///
    /// Returns `Some` on `dst` and `None` elsewhere.
    pub fn gather(&self, dst: usize, item: T) -> Result<Option<Vec<T>>, CollectiveError> {
        self.check_rank(dst)?;
        if self.rank != dst {
            self.send(dst, item)?;
            return Ok(None);
        }

        let mut own = Some(item);
        let mut out = Vec::with_capacity(self.world_size);
        for src in 0..self.world_size {
            if src == self.rank {
                out.extend(own.take());
            } else {
                out.push(self.recv(src)?);
            }
        }
        Ok(Some(out))
    }
}

impl<T: Clone> Communicator<T> {
    /// Send the root's value to every rank.
    ///
    /// `value` is only read on the root; every rank returns the root's value.
    pub fn broadcast(&self, src: usize, value: Option<T>) -> Result<T, CollectiveError> {
        self.check_rank(src)?;
        if self.rank != src {
            return self.recv(src);
        }

        let value = value.ok_or(CollectiveError::MissingPayload(self.rank))?;
        for dst in (0..self.world_size).filter(|&dst| dst != self.rank) {
            self.send(dst, value.clone())?;
        }
        Ok(value)
    }
}

impl Communicator<Vec<f32>> {
    /// Reduce `values` elementwise across all ranks, in place.
    ///
    /// Rank 0 gathers, reduces and broadcasts the result back. Every rank
    /// must pass a slice of the same length.
    pub fn all_reduce(&self, values: &mut [f32], op: ReduceOp) -> Result<(), CollectiveError> {
        if self.world_size == 1 {
            return Ok(());
        }

        let reduced = match self.gather(0, values.to_vec())? {
            Some(parts) => {
                let mut acc = vec![0.0f32; values.len()];
                for part in &parts {
                    if part.len() != acc.len() {
                        return Err(CollectiveError::LengthMismatch {
                            expected: acc.len(),
                            actual: part.len(),
                        });
                    }
                    for (a, v) in acc.iter_mut().zip(part) {
                        *a += v;
                    }
                }
                if op == ReduceOp::Mean {
                    let n = self.world_size as f32;
                    acc.iter_mut().for_each(|a| *a /= n);
                }
                self.broadcast(0, Some(acc))?
            }
            None => self.broadcast(0, None)?,
        };

        if reduced.len() != values.len() {
            return Err(CollectiveError::LengthMismatch {
                expected: values.len(),
                actual: reduced.len(),
            });
        }
        values.copy_from_slice(&reduced);
        Ok(())
    }
}
