//! Decoupled PPO: one player collects, `num_trainers` trainers optimize.
//!
//! The player blocks after every scatter until rank 1 broadcasts the new
//! weights, so every rollout is collected with the latest policy.

use burn::module::AutodiffModule;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::common::{log_test, should_checkpoint, InferBackend, Run, TrainBackend, TrainState};
use super::ppo::{agent_config, save_checkpoint, RolloutCollector, Schedules};
use crate::algorithms::ppo::{ppo_optimizer, train, PPOAgent, PPODecoupledArgs};
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::distributed::{
    module_from_bytes, module_to_bytes, run_ranks, world, Communicator, RankJob,
};
use crate::error::{Error, Result};
use crate::messages::Packet;

/// Train PPO with a player thread and `num_trainers` trainer threads.
pub fn main(mut args: PPODecoupledArgs) -> Result<()> {
    args.ppo.resolve("ppo_decoupled");
    args.validate()?;

    let collector = RolloutCollector::new(&args.ppo)?;
    let run = Run::create(&args.ppo.common, &args)?;
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
    args: &PPODecoupledArgs,
    mut run: Run,
    mut collector: RolloutCollector,
    link: Communicator<Packet>,
) -> Result<()> {
    let ppo = &args.ppo;
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(ppo.common.seed);

    let space = collector.action_space().clone();
    let obs_size = collector.obs_size();
    let mut agent: PPOAgent<InferBackend> =
        agent_config(ppo, obs_size, space.clone()).init(&device);
    link.broadcast(
        0,
        Some(Packet::Setup {
            obs_size,
            action_space: space.clone(),
            weights: module_to_bytes(&agent)?,
        }),
    )?;

    let num_updates = ppo.num_updates();
    log::info!(
        "PPO decoupled: {} trainers, {} updates x {} steps",
        args.num_trainers,
        num_updates,
        ppo.rollout_size()
    );

    let mut global_step = 0;
    for update in 1..=num_updates {
        let data = collector.collect(&agent, &mut run, &mut global_step, &mut rng)?;
        let chunks = data.split(args.num_trainers)?;
        let checkpoint = should_checkpoint(&ppo.common, update, num_updates);
        link.scatter(
            0,
            Some(Packet::data_scatter(update, global_step, checkpoint, chunks)),
        )?;

        agent = match link.broadcast(1, None)? {
            Packet::Weights(bytes) => module_from_bytes(agent, bytes, &device)?,
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
        run.log(global_step, update == num_updates);
    }

    link.scatter(0, Some(Packet::stop_scatter(link.world_size())))?;
    log_test(&mut run, &ppo.common, global_step, |obs| {
        agent.act(&space, obs, obs_size, true, &mut rng).actions
    })?;
    run.finish()
}

fn trainer(
    args: &PPODecoupledArgs,
    link: Communicator<Packet>,
    group: Communicator<Vec<f32>>,
    checkpoint_config: CheckpointerConfig,
) -> Result<()> {
    let rank = link.rank();
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(args.ppo.common.seed.wrapping_add(rank as u64));

    let (obs_size, space, weights) = match link.broadcast(0, None)? {
        Packet::Setup {
            obs_size,
            action_space,
            weights,
        } => (obs_size, action_space, weights),
        other => {
            return Err(Error::protocol(
                rank,
                format!("expected Setup, got {}", other.kind()),
            ))
        }
    };
    let template: PPOAgent<TrainBackend> =
        agent_config(&args.ppo, obs_size, space.clone()).init(&device);
    let mut agent = module_from_bytes(template, weights, &device)?;
    let mut optimizer = ppo_optimizer::<TrainBackend>(args.ppo.max_grad_norm);
    let schedules = Schedules::new(&args.ppo);
    let checkpointer = (rank == 1)
        .then(|| Checkpointer::new(checkpoint_config))
        .transpose()?;

    loop {
        match link.scatter(0, None)? {
            Packet::Data {
                update,
                global_step,
                checkpoint,
                batch,
            } => {
                let params = schedules.at(update);
                let (trained, metrics) = train(
                    agent,
                    &mut optimizer,
                    &space,
                    &batch,
                    &params,
                    Some(&group),
                    &mut rng,
                    &device,
                )?;
                agent = trained;

                let weights = match rank {
                    1 => Some(Packet::Weights(module_to_bytes(&agent.valid())?)),
                    _ => None,
                };
                link.broadcast(1, weights)?;

                if checkpoint {
                    if let Some(checkpointer) = &checkpointer {
                        let state = TrainState {
                            update,
                            global_step,
                        };
                        save_checkpoint(checkpointer, state, &agent, &optimizer)?;
                    }
                }
                link.gather(0, Packet::Metrics(metrics))?;
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
