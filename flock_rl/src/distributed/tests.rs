//! Tests for collectives, the rank launcher and gradient averaging.

use std::thread;

use burn::backend::{Autodiff, NdArray};
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::optim::GradientsParams;
use burn::prelude::*;

use super::*;
use crate::error::Error;

type TestBackend = Autodiff<NdArray<f32>>;

/// Run `f(comm)` for every rank of a fresh world and return results by rank.
fn on_world<T, R, F>(n: usize, f: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(Communicator<T>) -> R + Send + Sync + Clone + 'static,
{
    let handles: Vec<_> = world::<T>(n)
        .into_iter()
        .map(|comm| {
            let f = f.clone();
            thread::spawn(move || f(comm))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

// =============================================================================
// COLLECTIVES
// =============================================================================

#[test]
fn test_world_ranks() {
    let comms = world::<u8>(3);
    for (i, c) in comms.iter().enumerate() {
        assert_eq!(c.rank(), i);
        assert_eq!(c.world_size(), 3);
    }
}

#[test]
fn test_broadcast_from_nonzero_root() {
    let out = on_world(4, |c: Communicator<String>| {
        let payload = (c.rank() == 2).then(|| "weights".to_string());
        c.broadcast(2, payload).unwrap()
    });
    assert!(out.iter().all(|s| s == "weights"));
}

#[test]
fn test_scatter_delivers_by_rank() {
    let out = on_world(3, |c: Communicator<usize>| {
        let items = (c.rank() == 0).then(|| vec![10, 11, 12]);
        c.scatter(0, items).unwrap()
    });
    assert_eq!(out, vec![10, 11, 12]);
}

#[test]
fn test_scatter_rejects_wrong_length() {
    let comms = world::<usize>(3);
    let err = comms[0].scatter(0, Some(vec![1, 2])).unwrap_err();
    assert_eq!(
        err,
        CollectiveError::LengthMismatch {
            expected: 3,
            actual: 2
        }
    );
}

#[test]
fn test_gather_orders_by_rank() {
    let out = on_world(4, |c: Communicator<usize>| c.gather(1, c.rank() * 100).unwrap());
    assert_eq!(out[1], Some(vec![0, 100, 200, 300]));
    assert!(out[0].is_none() && out[2].is_none() && out[3].is_none());
}

#[test]
fn test_all_reduce_mean_and_sum() {
    let out = on_world(3, |c: Communicator<Vec<f32>>| {
        let r = c.rank() as f32;
        let mut mean = vec![r, 2.0 * r];
        c.all_reduce(&mut mean, ReduceOp::Mean).unwrap();
        let mut sum = vec![r];
        c.all_reduce(&mut sum, ReduceOp::Sum).unwrap();
        (mean, sum)
    });
    for (mean, sum) in out {
        assert_eq!(mean, vec![1.0, 2.0]);
        assert_eq!(sum, vec![3.0]);
    }
}

#[test]
fn test_invalid_rank() {
    let comms = world::<u8>(2);
    assert_eq!(
        comms[0].send(5, 1).unwrap_err(),
        CollectiveError::InvalidRank {
            rank: 5,
            world_size: 2
        }
    );
}

#[test]
fn test_dropped_peer_disconnects() {
    let mut comms = world::<u8>(2);
    let peer = comms.pop().unwrap();
    drop(peer);
    assert_eq!(
        comms[0].recv(1).unwrap_err(),
        CollectiveError::Disconnected { peer: 1 }
    );
    assert_eq!(
        comms[0].send(1, 0).unwrap_err(),
        CollectiveError::Disconnected { peer: 1 }
    );
}

// =============================================================================
// LAUNCHER
// =============================================================================

#[test]
fn test_rank_names() {
    assert_eq!(rank_name(0), "player-0");
    assert_eq!(rank_name(3), "trainer-3");
}

#[test]
fn test_run_ranks_names_threads() {
    let jobs: Vec<RankJob<'_>> = (0..3)
        .map(|rank| {
            Box::new(move || {
                assert_eq!(thread::current().name(), Some(rank_name(rank).as_str()));
                Ok(())
            }) as RankJob<'_>
        })
        .collect();
    run_ranks(jobs).unwrap();
}

#[test]
fn test_run_ranks_reports_root_cause_over_disconnects() {
    let mut comms = world::<u8>(2);
    let trainer = comms.pop().unwrap();
    let player = comms.pop().unwrap();

    let jobs: Vec<RankJob<'_>> = vec![
        Box::new(move || {
            player.recv(1)?;
            Ok(())
        }),
        Box::new(move || {
            drop(trainer);
            Err(crate::error::Error::protocol(1, "bad packet"))
        }),
    ];
    let err = run_ranks(jobs).unwrap_err();
    assert!(matches!(err, Error::Protocol { rank: 1, .. }), "{err}");
}

#[test]
fn test_run_ranks_turns_panics_into_errors() {
    let jobs: Vec<RankJob<'_>> = vec![Box::new(|| Ok(())), Box::new(|| panic!("boom"))];
    match run_ranks(jobs).unwrap_err() {
        Error::Rank { rank, message } => {
            assert_eq!(rank, 1);
            assert!(message.contains("boom"));
        }
        other => panic!("unexpected error {other}"),
    }
}

// =============================================================================
// GRADIENTS AND WEIGHTS
// =============================================================================

fn linear_grads(model: &Linear<TestBackend>, scale: f32) -> GradientsParams {
    let device = Default::default();
    let input = Tensor::<TestBackend, 2>::ones([1, 2], &device);
    let loss = model.forward(input).sum().mul_scalar(scale);
    GradientsParams::from_grads(loss.backward(), model)
}

#[test]
fn test_all_reduce_grads_averages_across_ranks() {
    let device = Default::default();
    let model: Linear<TestBackend> = LinearConfig::new(2, 1).init(&device);
    let bytes = module_to_bytes(&model).unwrap();

    let out = on_world(2, move |group: Communicator<Vec<f32>>| {
        let device = Default::default();
        let template: Linear<TestBackend> = LinearConfig::new(2, 1).init(&device);
        let model = module_from_bytes(template, bytes.clone(), &device).unwrap();
        // rank 0 scales the loss by 1, rank 1 by 3
        let scale = 1.0 + 2.0 * group.rank() as f32;
        let grads = linear_grads(&model, scale);
        let mut grads = all_reduce_grads(&model, grads, &group).unwrap();
        let weight_grad = grads
            .remove::<NdArray<f32>, 2>(model.weight.id.clone())
            .unwrap();
        weight_grad.into_data().iter::<f32>().collect::<Vec<_>>()
    });

    // d(sum(xW + b))/dW = x = 1, so the mean over scales 1 and 3 is 2
    for grads in out {
        for g in grads {
            assert!((g - 2.0).abs() < 1e-6, "{g}");
        }
    }
}

#[test]
fn test_weights_roundtrip_through_bytes() {
    let device = Default::default();
    let a: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
    let b: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
    let restored = module_from_bytes(b, module_to_bytes(&a).unwrap(), &device).unwrap();

    let x = Tensor::<TestBackend, 2>::ones([1, 3], &device);
    let diff = (a.forward(x.clone()) - restored.forward(x))
        .abs()
        .sum()
        .into_scalar();
    assert!(diff < 1e-6);
}
