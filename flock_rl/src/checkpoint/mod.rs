//! Model checkpointing.
//!
//! ## Layout
//!
//! ```text
//! <run>/checkpoint/
//!   ckpt_<step>/
//!     agent.bin            module weights
//!     <optimizer>.bin      optimizer records
//!     state.json           global step and update
//!     rb.json              replay buffer (optional)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let ckpt = Checkpointer::new(CheckpointerConfig::new(run_dir.join("checkpoint")))?;
//! ckpt.save_module(global_step, "agent", &agent)?;
//! ckpt.save_record::<B, _>(global_step, "optimizer", optimizer.to_record())?;
//! ckpt.finish(global_step)?;
//! ```

pub mod checkpointer;

pub use checkpointer::{CheckpointError, CheckpointInfo, Checkpointer, CheckpointerConfig};
