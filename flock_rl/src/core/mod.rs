//! Core building blocks shared by the algorithms.

pub mod target_network;

pub use target_network::soft_update;
