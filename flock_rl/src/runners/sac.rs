//! Coupled SAC: one loop steps the environments and trains from replay.

use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::prelude::*;
use flock_envs::{make_env, ActionSpace, VecEnv};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::common::{log_test, should_checkpoint, Run, TrainBackend, TrainState};
use crate::algorithms::sac::{
    keys, sac_optimizers, train_step, ActionBounds, CriticEnsemble, SACActor, SACAgent,
    SACAgentConfig, SACArgs, SACOptimizers, Temperature, UpdateParams,
};
use crate::buffers::{ReplayBuffer, TensorDict};
use crate::checkpoint::Checkpointer;
use crate::error::Result;

// ============================================================================
// Transition collection
// ============================================================================

/// Environments plus the replay buffer they fill.
pub(crate) struct TransitionCollector {
    env: VecEnv,
    space: ActionSpace,
    bounds: ActionBounds,
    obs_size: usize,
    obs: Vec<f32>,
    rb: ReplayBuffer,
}

impl TransitionCollector {
    /// Fails with a config error on non-continuous action spaces.
    pub(crate) fn new(args: &SACArgs) -> Result<Self> {
        let common = &args.common;
        let mut env = make_env(common.env_id(), &common.env_options())?;
        let space = env.action_space();
        let bounds = ActionBounds::from_space(&space)?;
        let obs = env.reset(common.seed);
        Ok(Self {
            obs_size: env.obs_size(),
            rb: ReplayBuffer::new(args.buffer_steps(), env.n_envs())?,
            env,
            space,
            bounds,
            obs,
        })
    }

    pub(crate) fn action_space(&self) -> &ActionSpace {
        &self.space
    }

    pub(crate) fn bounds(&self) -> &ActionBounds {
        &self.bounds
    }

    pub(crate) fn obs_size(&self) -> usize {
        self.obs_size
    }

    pub(crate) fn buffer(&self) -> &ReplayBuffer {
        &self.rb
    }

    /// Step every environment once and store the transitions.
    ///
    /// Without an `actor` the actions are drawn uniformly from the box.
    pub(crate) fn step<B: Backend, R: Rng + ?Sized>(
        &mut self,
        actor: Option<&SACActor<B>>,
        run: &mut Run,
        global_step: &mut usize,
        rng: &mut R,
    ) -> Result<()> {
        let n_envs = self.env.n_envs();
        let actions = match actor {
            Some(actor) => actor.act(&self.obs, self.obs_size, &self.bounds, false, rng),
            None => {
                let mut actions = Vec::with_capacity(n_envs * self.bounds.action_dim());
                for _ in 0..n_envs {
                    self.space.sample_into(rng, &mut actions);
                }
                actions
            }
        };

        let step = self.env.step(&actions)?;
        *global_step += n_envs;

        let next_obs = step.next_observations();
        let dones: Vec<f32> = step.terminals.iter().map(|&t| f32::from(t)).collect();
        let obs = std::mem::replace(&mut self.obs, step.observations);
        let row = TensorDict::new(vec![1, n_envs])
            .with(keys::OBSERVATIONS, &[self.obs_size], obs)?
            .with(keys::NEXT_OBSERVATIONS, &[self.obs_size], next_obs)?
            .with(keys::ACTIONS, &[self.bounds.action_dim()], actions)?
            .with(keys::REWARDS, &[1], step.rewards)?
            .with(keys::DONES, &[1], dones)?;
        self.rb.add(&row)?;
        run.record_episodes(&step.episodes);
        Ok(())
    }

    pub(crate) fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<TensorDict> {
        Ok(self.rb.sample(batch_size, rng)?)
    }
}

// ============================================================================
// Shared setup
// ============================================================================

pub(crate) fn agent_config(args: &SACArgs, obs_size: usize, action_dim: usize) -> SACAgentConfig {
    SACAgentConfig::new(obs_size, action_dim)
        .with_hidden_size(args.hidden_size)
        .with_n_layers(args.n_layers)
        .with_num_critics(args.num_critics)
        .with_alpha(args.alpha)
}

/// Update coefficients with `target_entropy = -action_dim`.
pub(crate) fn update_params(args: &SACArgs, action_dim: usize) -> UpdateParams {
    UpdateParams {
        gamma: args.gamma,
        tau: args.tau,
        actor_lr: args.actor_lr,
        critic_lr: args.critic_lr,
        alpha_lr: args.alpha_lr,
        target_entropy: -(action_dim as f32),
    }
}

/// Write the agent, the three optimizer records and `state.json`.
///
/// The checkpoint is not finished so the caller can add the buffer.
pub(crate) fn save_checkpoint<AO, CO, TO>(
    checkpointer: &Checkpointer,
    state: TrainState,
    agent: &SACAgent<TrainBackend>,
    optimizers: &SACOptimizers<AO, CO, TO>,
) -> Result<()>
where
    AO: Optimizer<SACActor<TrainBackend>, TrainBackend>,
    CO: Optimizer<CriticEnsemble<TrainBackend>, TrainBackend>,
    TO: Optimizer<Temperature<TrainBackend>, TrainBackend>,
{
    let step = state.global_step;
    checkpointer.save_module(step, "agent", agent)?;
    checkpointer.save_record::<TrainBackend, _>(
        step,
        "actor_optimizer",
        optimizers.actor.to_record(),
    )?;
    checkpointer.save_record::<TrainBackend, _>(
        step,
        "critic_optimizer",
        optimizers.critic.to_record(),
    )?;
    checkpointer.save_record::<TrainBackend, _>(
        step,
        "alpha_optimizer",
        optimizers.alpha.to_record(),
    )?;
    checkpointer.save_json(step, "state", &state)?;
    Ok(())
}

// ============================================================================
// Main loop
// ============================================================================

/// Train SAC with a single process collecting and optimizing.
pub fn main(mut args: SACArgs) -> Result<()> {
    args.resolve("sac");
    args.validate()?;

    let mut collector = TransitionCollector::new(&args)?;
    let mut run = Run::create(&args.common, &args)?;
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(args.common.seed);

    let bounds = collector.bounds().clone();
    let obs_size = collector.obs_size();
    let mut agent: SACAgent<TrainBackend> =
        agent_config(&args, obs_size, bounds.action_dim()).init(&device);
    let mut optimizers = sac_optimizers::<TrainBackend>();
    let params = update_params(&args, bounds.action_dim());

    let learning_starts = args.learning_starts_iteration();
    let num_iterations = args.num_iterations();
    log::info!(
        "SAC: {} iterations, learning starts at {}, {} parameters",
        num_iterations,
        learning_starts,
        agent.num_params()
    );

    let mut global_step = 0;
    let mut grad_step = 0;
    for iteration in 1..=num_iterations {
        let actor = (iteration > learning_starts).then(|| agent.actor.valid());
        collector.step(actor.as_ref(), &mut run, &mut global_step, &mut rng)?;

        if iteration >= learning_starts {
            for _ in 0..args.gradient_steps {
                let batch = collector.sample(args.per_rank_batch_size, &mut rng)?;
                grad_step += 1;
                let (trained, metrics) = train_step(
                    agent,
                    &mut optimizers,
                    &bounds,
                    &batch,
                    &params,
                    grad_step % args.target_network_frequency == 0,
                    None,
                    &mut rng,
                    &device,
                )?;
                agent = trained;
                run.record_train(&metrics);
            }
        }

        run.log(global_step, iteration == num_iterations);
        if should_checkpoint(&args.common, iteration, num_iterations) {
            let state = TrainState {
                update: iteration,
                global_step,
            };
            let checkpointer = run.checkpointer();
            save_checkpoint(checkpointer, state, &agent, &optimizers)?;
            if args.checkpoint_buffer {
                checkpointer.save_json(global_step, "rb", collector.buffer())?;
            }
            checkpointer.finish(global_step)?;
        }
    }

    let actor = agent.actor.valid();
    log_test(&mut run, &args.common, global_step, |obs| {
        actor.act(obs, obs_size, &bounds, true, &mut rng)
    })?;
    run.finish()
}
