//! `flock` command line: one subcommand per training loop.
//!
//! ```text
//! flock ppo --env-id CartPole-v1 --total-steps 100000
//! flock sac-decoupled --env-id Pendulum-v1 --num-trainers 2
//! flock droq --env-id Pendulum-v1 --gradient-steps 20
//! RUST_LOG=debug flock ppo --dry-run
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flock_rl::algorithms::ppo::{PPOArgs, PPODecoupledArgs};
use flock_rl::algorithms::sac::{DroQArgs, SACArgs, SACDecoupledArgs};
use flock_rl::runners::{droq, ppo, ppo_decoupled, sac, sac_decoupled};

#[derive(Debug, Parser)]
#[command(name = "flock", version, about = "Coupled and decoupled PPO/SAC, and DroQ, on burn")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// PPO with collection and training in one loop
    Ppo(PPOArgs),
    /// PPO with one player and `--num-trainers` trainers
    PpoDecoupled(PPODecoupledArgs),
    /// SAC with collection and training in one loop
    Sac(SACArgs),
    /// SAC with one player and `--num-trainers` trainers
    SacDecoupled(SACDecoupledArgs),
    /// SAC with dropout and layer norm critics, `--gradient-steps` critic updates per step
    Droq(DroQArgs),
}

fn main() -> anyhow::Result<()> {
    // Also bridges the library's `log` records into tracing.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, "parsed arguments");

    match cli.command {
        Command::Ppo(args) => ppo::main(args).context("ppo failed"),
        Command::PpoDecoupled(args) => {
            ppo_decoupled::main(args).context("ppo-decoupled failed")
        }
        Command::Sac(args) => sac::main(args).context("sac failed"),
        Command::SacDecoupled(args) => {
            sac_decoupled::main(args).context("sac-decoupled failed")
        }
        Command::Droq(args) => droq::main(args).context("droq failed"),
    }
}
