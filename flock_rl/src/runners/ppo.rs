//! Coupled PPO: a single loop collects rollouts and trains on them.

use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::prelude::*;
use flock_envs::{make_env, ActionSpace, VecEnv};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::common::{log_test, should_checkpoint, Run, TrainBackend, TrainState};
use crate::algorithms::compute_gae;
use crate::algorithms::ppo::{
    keys, ppo_optimizer, train, PPOAgent, PPOAgentConfig, PPOArgs, UpdateParams,
};
use crate::buffers::{ReplayBuffer, TensorDict};
use crate::checkpoint::Checkpointer;
use crate::error::Result;
use crate::scheduling::{annealed, LRScheduler};

// ============================================================================
// Rollout collection
// ============================================================================

/// Environments plus the `(rollout_steps, num_envs)` buffer they fill.
pub(crate) struct RolloutCollector {
    env: VecEnv,
    space: ActionSpace,
    obs_size: usize,
    obs: Vec<f32>,
    rb: ReplayBuffer,
    rollout_steps: usize,
    gamma: f32,
    gae_lambda: f32,
}

impl RolloutCollector {
    pub(crate) fn new(args: &PPOArgs) -> Result<Self> {
        let common = &args.common;
        let mut env = make_env(common.env_id(), &common.env_options())?;
        let obs = env.reset(common.seed);
        Ok(Self {
            space: env.action_space(),
            obs_size: env.obs_size(),
            rb: ReplayBuffer::new(args.rollout_steps, env.n_envs())?,
            env,
            obs,
            rollout_steps: args.rollout_steps,
            gamma: args.gamma,
            gae_lambda: args.gae_lambda,
        })
    }

    pub(crate) fn action_space(&self) -> &ActionSpace {
        &self.space
    }

    pub(crate) fn obs_size(&self) -> usize {
        self.obs_size
    }

    /// Play `rollout_steps` vector steps with `agent` and return the flat
    /// training batch, advantages and returns included.
    ///
    /// Truncated episodes get `gamma * V(final_obs)` added to their last
    /// reward so the time limit does not look like a terminal state.
    pub(crate) fn collect<B: Backend, R: Rng + ?Sized>(
        &mut self,
        agent: &PPOAgent<B>,
        run: &mut Run,
        global_step: &mut usize,
        rng: &mut R,
    ) -> Result<TensorDict> {
        let n_envs = self.env.n_envs();
        let action_dim = self.space.action_dim();

        for _ in 0..self.rollout_steps {
            let policy = agent.act(&self.space, &self.obs, self.obs_size, false, rng);
            let mut env_actions = policy.actions.clone();
            self.space.clip(&mut env_actions);
            let step = self.env.step(&env_actions)?;
            *global_step += n_envs;

            let mut rewards = step.rewards.clone();
            let truncated: Vec<(usize, &Vec<f32>)> = step
                .final_observations
                .iter()
                .enumerate()
                .filter(|&(i, _)| step.truncations[i] && !step.terminals[i])
                .filter_map(|(i, last)| last.as_ref().map(|last| (i, last)))
                .collect();
            if !truncated.is_empty() {
                let last_obs: Vec<f32> = truncated
                    .iter()
                    .flat_map(|(_, last)| last.iter().copied())
                    .collect();
                let bootstrap = agent.values(&last_obs, self.obs_size);
                for ((i, _), value) in truncated.iter().zip(bootstrap) {
                    rewards[*i] += self.gamma * value;
                }
            }
            let dones: Vec<f32> = step.dones().into_iter().map(f32::from).collect();

            let obs = std::mem::replace(&mut self.obs, step.observations);
            let row = TensorDict::new(vec![1, n_envs])
                .with(keys::OBSERVATIONS, &[self.obs_size], obs)?
                .with(keys::ACTIONS, &[action_dim], policy.actions)?
                .with(keys::LOGPROBS, &[1], policy.log_probs)?
                .with(keys::VALUES, &[1], policy.values)?
                .with(keys::REWARDS, &[1], rewards)?
                .with(keys::DONES, &[1], dones)?;
            self.rb.add(&row)?;
            run.record_episodes(&step.episodes);
        }

        let next_values = agent.values(&self.obs, self.obs_size);
        let rollout = self.rb.to_dict()?;
        let (advantages, returns) = compute_gae(
            rollout.data(keys::REWARDS)?,
            rollout.data(keys::VALUES)?,
            rollout.data(keys::DONES)?,
            &next_values,
            n_envs,
            self.gamma,
            self.gae_lambda,
        );
        let mut data = rollout.flatten_batch();
        data.insert(keys::ADVANTAGES, &[1], advantages)?;
        data.insert(keys::RETURNS, &[1], returns)?;
        Ok(data)
    }
}

// ============================================================================
// Schedules
// ============================================================================

/// Annealed learning rate and loss coefficients, indexed by update.
pub(crate) struct Schedules {
    lr: Box<dyn LRScheduler>,
    clip_coef: Box<dyn LRScheduler>,
    ent_coef: Box<dyn LRScheduler>,
    base: UpdateParams,
}

impl Schedules {
    pub(crate) fn new(args: &PPOArgs) -> Self {
        let num_updates = args.num_updates();
        Self {
            lr: annealed(args.lr, args.anneal_lr, num_updates),
            clip_coef: annealed(args.clip_coef.into(), args.anneal_clip_coef, num_updates),
            ent_coef: annealed(args.ent_coef.into(), args.anneal_ent_coef, num_updates),
            base: UpdateParams {
                lr: args.lr,
                clip_coef: args.clip_coef,
                ent_coef: args.ent_coef,
                vf_coef: args.vf_coef,
                update_epochs: args.update_epochs,
                batch_size: args.per_rank_batch_size,
                normalize_advantages: args.normalize_advantages,
                clip_vloss: args.clip_vloss,
            },
        }
    }

    /// Parameters of the 1-based `update`.
    pub(crate) fn at(&self, update: usize) -> UpdateParams {
        let step = update.saturating_sub(1);
        UpdateParams {
            lr: self.lr.get_lr(step),
            clip_coef: self.clip_coef.get_lr(step) as f32,
            ent_coef: self.ent_coef.get_lr(step) as f32,
            ..self.base
        }
    }
}

pub(crate) fn agent_config(args: &PPOArgs, obs_size: usize, space: ActionSpace) -> PPOAgentConfig {
    PPOAgentConfig::new(obs_size, space)
        .with_hidden_size(args.hidden_size)
        .with_n_layers(args.n_layers)
}

/// Write `agent.bin`, `optimizer.bin` and `state.json` for `state`.
pub(crate) fn save_checkpoint<O>(
    checkpointer: &Checkpointer,
    state: TrainState,
    agent: &PPOAgent<TrainBackend>,
    optimizer: &O,
) -> Result<()>
where
    O: Optimizer<PPOAgent<TrainBackend>, TrainBackend>,
{
    let step = state.global_step;
    checkpointer.save_module(step, "agent", agent)?;
    checkpointer.save_record::<TrainBackend, _>(step, "optimizer", optimizer.to_record())?;
    checkpointer.save_json(step, "state", &state)?;
    checkpointer.finish(step)?;
    Ok(())
}

// ============================================================================
// Main loop
// ============================================================================

/// Train PPO with a single process collecting and optimizing.
pub fn main(mut args: PPOArgs) -> Result<()> {
    args.resolve("ppo");
    args.validate()?;

    let mut collector = RolloutCollector::new(&args)?;
    let mut run = Run::create(&args.common, &args)?;
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(args.common.seed);

    let space = collector.action_space().clone();
    let obs_size = collector.obs_size();
    let mut agent: PPOAgent<TrainBackend> =
        agent_config(&args, obs_size, space.clone()).init(&device);
    let mut optimizer = ppo_optimizer::<TrainBackend>(args.max_grad_norm);
    let schedules = Schedules::new(&args);

    let num_updates = args.num_updates();
    log::info!(
        "PPO: {} updates x {} steps, {} parameters",
        num_updates,
        args.rollout_size(),
        agent.num_params()
    );

    let mut global_step = 0;
    for update in 1..=num_updates {
        let data = collector.collect(&agent.valid(), &mut run, &mut global_step, &mut rng)?;
        let params = schedules.at(update);
        let (trained, metrics) = train(
            agent,
            &mut optimizer,
            &space,
            &data,
            &params,
            None,
            &mut rng,
            &device,
        )?;
        agent = trained;

        run.record_train(&metrics);
        run.log(global_step, update == num_updates);
        if should_checkpoint(&args.common, update, num_updates) {
            let state = TrainState {
                update,
                global_step,
            };
            save_checkpoint(run.checkpointer(), state, &agent, &optimizer)?;
        }
    }

    let policy = agent.valid();
    log_test(&mut run, &args.common, global_step, |obs| {
        policy.act(&space, obs, obs_size, true, &mut rng).actions
    })?;
    run.finish()
}
