//! Run one named thread per rank and collect their results.

use std::any::Any;
use std::thread;

use crate::error::{Error, Result};

/// Work executed by one rank.
pub type RankJob<'a> = Box<dyn FnOnce() -> Result<()> + Send + 'a>;

/// Thread name of a rank: the player is rank 0, trainers follow.
pub fn rank_name(rank: usize) -> String {
    if rank == 0 {
        "player-0".to_string()
    } else {
        format!("trainer-{rank}")
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}

/// Run `jobs[rank]` on its own thread and wait for all of them.
///
/// A failing rank drops its communicators, so its peers fail with
/// disconnect errors. The first error that is not a disconnect is
/// returned; disconnects are only reported when nothing else failed.
pub fn run_ranks(jobs: Vec<RankJob<'_>>) -> Result<()> {
    let results: Vec<Result<()>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(jobs.len());
        for (rank, job) in jobs.into_iter().enumerate() {
            let spawned = thread::Builder::new()
                .name(rank_name(rank))
                .spawn_scoped(scope, job);
            handles.push((rank, spawned));
        }

        handles
            .into_iter()
            .map(|(rank, spawned)| match spawned {
                Err(e) => Err(Error::Rank {
                    rank,
                    message: format!("failed to spawn thread: {e}"),
                }),
                Ok(handle) => handle.join().unwrap_or_else(|payload| {
                    Err(Error::Rank {
                        rank,
                        message: panic_message(payload),
                    })
                }),
            })
            .collect()
    });

    let mut first_disconnect = None;
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(()) => {}
            Err(e) if e.is_disconnect() => {
                log::debug!("{} stopped on disconnect: {e}", rank_name(rank));
                first_disconnect.get_or_insert(e);
            }
            Err(e) => {
                log::error!("{} failed: {e}", rank_name(rank));
                return Err(e);
            }
        }
    }
    match first_disconnect {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
