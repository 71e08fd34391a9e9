//! Coupled DroQ: SAC with regularized critics and a high update ratio.

use burn::module::AutodiffModule;
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::common::{log_test, should_checkpoint, Run, TrainBackend, TrainState};
use super::sac::{agent_config, save_checkpoint, update_params, TransitionCollector};
use crate::algorithms::sac::{
    actor_step, critic_step, sac_optimizers, train_metrics, DroQArgs, QReduction, SACAgent,
};
use crate::error::Result;

/// Train DroQ with a single process collecting and optimizing.
///
/// Every vector step after `learning_starts` runs `gradient_steps` critic
/// updates on fresh batches, then one actor and temperature update.
pub fn main(mut args: DroQArgs) -> Result<()> {
    args.sac.resolve("droq");
    args.validate()?;
    let sac = &args.sac;

    let mut collector = TransitionCollector::new(sac)?;
    let mut run = Run::create(&sac.common, &args)?;
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(sac.common.seed);

    let bounds = collector.bounds().clone();
    let obs_size = collector.obs_size();
    let mut agent: SACAgent<TrainBackend> = agent_config(sac, obs_size, bounds.action_dim())
        .with_critic_regularization(args.dropout, args.layer_norm)
        .init(&device);
    let mut optimizers = sac_optimizers::<TrainBackend>();
    let params = update_params(sac, bounds.action_dim());

    let learning_starts = sac.learning_starts_iteration();
    let num_iterations = sac.num_iterations();
    log::info!(
        "DroQ: {} iterations, {} critic updates per step, {} parameters",
        num_iterations,
        sac.gradient_steps,
        agent.num_params()
    );

    let mut global_step = 0;
    let mut grad_step = 0;
    for iteration in 1..=num_iterations {
        let actor = (iteration > learning_starts).then(|| agent.actor.valid());
        collector.step(actor.as_ref(), &mut run, &mut global_step, &mut rng)?;

        if iteration >= learning_starts {
            let alpha = agent.temperature.alpha();
            let mut q_loss = 0.0;
            for _ in 0..sac.gradient_steps {
                let batch = collector.sample(sac.per_rank_batch_size, &mut rng)?;
                grad_step += 1;
                let (trained, loss) = critic_step(
                    agent,
                    &mut optimizers,
                    &bounds,
                    &batch,
                    &params,
                    grad_step % sac.target_network_frequency == 0,
                    None,
                    &mut rng,
                    &device,
                )?;
                agent = trained;
                q_loss += loss;
            }

            let batch = collector.sample(sac.per_rank_batch_size, &mut rng)?;
            let (trained, pi_loss, a_loss) = actor_step(
                agent,
                &mut optimizers,
                &bounds,
                &batch,
                &params,
                QReduction::Mean,
                None,
                &mut rng,
                &device,
            )?;
            agent = trained;
            let q_loss = q_loss / sac.gradient_steps as f32;
            run.record_train(&train_metrics(q_loss, pi_loss, a_loss, alpha));
        }

        run.log(global_step, iteration == num_iterations);
        if should_checkpoint(&sac.common, iteration, num_iterations) {
            let state = TrainState {
                update: iteration,
                global_step,
            };
            let checkpointer = run.checkpointer();
            save_checkpoint(checkpointer, state, &agent, &optimizers)?;
            if sac.checkpoint_buffer {
                checkpointer.save_json(global_step, "rb", collector.buffer())?;
            }
            checkpointer.finish(global_step)?;
        }
    }

    let actor = agent.actor.valid();
    log_test(&mut run, &sac.common, global_step, |obs| {
        actor.act(obs, obs_size, &bounds, true, &mut rng)
    })?;
    run.finish()
}
