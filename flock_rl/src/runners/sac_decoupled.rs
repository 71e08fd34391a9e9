//! Decoupled SAC: the player owns the environments and the replay buffer,
//! trainers run gradient steps on sampled chunks.

use burn::module::AutodiffModule;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::common::{log_test, should_checkpoint, InferBackend, Run, TrainBackend, TrainState};
use super::sac::{agent_config, save_checkpoint, update_params, TransitionCollector};
use crate::algorithms::sac::{sac_optimizers, train_step, ActionBounds, SACAgent, SACDecoupledArgs};
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::distributed::{
    module_from_bytes, module_to_bytes, run_ranks, world, Communicator, RankJob,
};
use crate::error::{Error, Result};
use crate::messages::Packet;
use crate::metrics::MetricAggregator;

/// Train SAC with a player thread and `num_trainers` trainer threads.
pub fn main(mut args: SACDecoupledArgs) -> Result<()> {
    args.sac.resolve("sac_decoupled");
    args.validate()?;

    let collector = TransitionCollector::new(&args.sac)?;
    let run = Run::create(&args.sac.common, &args)?;
    let checkpoint_config = run.checkpointer().config().clone();
    let args = &args;

    let mut links = world::<Packet>(args.num_trainers + 1).into_iter();
    let player_link = links
        .next()
        .ok_or_else(|| Error::protocol(0, "empty world"))?;
    let mut jobs: Vec<RankJob<'_>> = Vec::with_capacity(args.num_trainers + 1);
    jobs.push(Box::new(move || player(args, run, collector, player_link)));
    for (link, group) in links.zip(world::<Vec<f32>>(args.num_trainers)) {
        let config = checkpoint_config.clone();
        jobs.push(Box::new(move || trainer(args, link, group, config)));
    }
    run_ranks(jobs)
}

fn player(
    args: &SACDecoupledArgs,
    mut run: Run,
    mut collector: TransitionCollector,
    link: Communicator<Packet>,
) -> Result<()> {
    let sac = &args.sac;
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(sac.common.seed);

    let bounds = collector.bounds().clone();
    let obs_size = collector.obs_size();
    let agent: SACAgent<InferBackend> =
        agent_config(sac, obs_size, bounds.action_dim()).init(&device);
    link.broadcast(
        0,
        Some(Packet::Setup {
            obs_size,
            action_space: collector.action_space().clone(),
            weights: module_to_bytes(&agent)?,
        }),
    )?;
    let mut actor = agent.actor;

    let learning_starts = sac.learning_starts_iteration();
    let num_iterations = sac.num_iterations();
    let sample_size = sac.gradient_steps * sac.per_rank_batch_size * args.num_trainers;
    log::info!(
        "SAC decoupled: {} trainers, {} iterations, {} samples per update",
        args.num_trainers,
        num_iterations,
        sample_size
    );

    let mut global_step = 0;
    for iteration in 1..=num_iterations {
        let policy = (iteration > learning_starts).then_some(&actor);
        collector.step(policy, &mut run, &mut global_step, &mut rng)?;

        let checkpoint = should_checkpoint(&sac.common, iteration, num_iterations);
        if iteration >= learning_starts {
            let chunks = collector
                .sample(sample_size, &mut rng)?
                .split(args.num_trainers)?;
            link.scatter(
                0,
                Some(Packet::data_scatter(iteration, global_step, checkpoint, chunks)),
            )?;

            actor = match link.broadcast(1, None)? {
                Packet::Weights(bytes) => module_from_bytes(actor, bytes, &device)?,
                other => {
                    return Err(Error::protocol(
                        0,
                        format!("expected Weights, got {}", other.kind()),
                    ))
                }
            };
            let gathered = link.gather(0, Packet::Idle)?.unwrap_or_default();
            for packet in gathered.into_iter().skip(1) {
                match packet {
                    Packet::Metrics(metrics) => run.record_train(&metrics),
                    other => {
                        return Err(Error::protocol(
                            0,
                            format!("expected Metrics, got {}", other.kind()),
                        ))
                    }
                }
            }
        } else if checkpoint {
            link.scatter(
                0,
                Some(Packet::checkpoint_scatter(
                    iteration,
                    global_step,
                    link.world_size(),
                )),
            )?;
            link.gather(0, Packet::Idle)?;
        }

        // Rank 1 has written this checkpoint before answering the gather.
        if checkpoint && sac.checkpoint_buffer {
            run.checkpointer().save_json(global_step, "rb", collector.buffer())?;
        }
        run.log(global_step, iteration == num_iterations);
    }

    link.scatter(0, Some(Packet::stop_scatter(link.world_size())))?;
    log_test(&mut run, &sac.common, global_step, |obs| {
        actor.act(obs, obs_size, &bounds, true, &mut rng)
    })?;
    run.finish()
}

fn trainer(
    args: &SACDecoupledArgs,
    link: Communicator<Packet>,
    group: Communicator<Vec<f32>>,
    checkpoint_config: CheckpointerConfig,
) -> Result<()> {
    let sac = &args.sac;
    let rank = link.rank();
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(sac.common.seed.wrapping_add(rank as u64));

    let (obs_size, bounds, weights) = match link.broadcast(0, None)? {
        Packet::Setup {
            obs_size,
            action_space,
            weights,
        } => (obs_size, ActionBounds::from_space(&action_space)?, weights),
        other => {
            return Err(Error::protocol(
                rank,
                format!("expected Setup, got {}", other.kind()),
            ))
        }
    };
    let template: SACAgent<TrainBackend> =
        agent_config(sac, obs_size, bounds.action_dim()).init(&device);
    let mut agent = module_from_bytes(template, weights, &device)?;
    let mut optimizers = sac_optimizers::<TrainBackend>();
    let params = update_params(sac, bounds.action_dim());
    let checkpointer = (rank == 1)
        .then(|| Checkpointer::new(checkpoint_config))
        .transpose()?;

    let mut grad_step = 0;
    loop {
        match link.scatter(0, None)? {
            Packet::Data {
                update,
                global_step,
                checkpoint,
                batch,
            } => {
                let mut aggregator = MetricAggregator::new();
                for minibatch in batch.split(sac.gradient_steps)? {
                    grad_step += 1;
                    let (trained, metrics) = train_step(
                        agent,
                        &mut optimizers,
                        &bounds,
                        &minibatch,
                        &params,
                        grad_step % sac.target_network_frequency == 0,
                        Some(&group),
                        &mut rng,
                        &device,
                    )?;
                    agent = trained;
                    aggregator.extend(&metrics);
                }

                let weights = match rank {
                    1 => Some(Packet::Weights(module_to_bytes(&agent.actor.valid())?)),
                    _ => None,
                };
                link.broadcast(1, weights)?;

                if checkpoint {
                    if let Some(checkpointer) = &checkpointer {
                        let state = TrainState {
                            update,
                            global_step,
                        };
                        save_checkpoint(checkpointer, state, &agent, &optimizers)?;
                        checkpointer.finish(global_step)?;
                    }
                }
                link.gather(0, Packet::Metrics(aggregator.compute()))?;
            }
            Packet::Checkpoint {
                update,
                global_step,
            } => {
                if let Some(checkpointer) = &checkpointer {
                    let state = TrainState {
                        update,
                        global_step,
                    };
                    save_checkpoint(checkpointer, state, &agent, &optimizers)?;
                    checkpointer.finish(global_step)?;
                }
                link.gather(0, Packet::Idle)?;
            }
            Packet::Stop => {
                log::debug!("trainer {rank} stopping");
                return Ok(());
            }
            other => {
                return Err(Error::protocol(
                    rank,
                    format!("unexpected {} packet", other.kind()),
                ))
            }
        }
    }
}
