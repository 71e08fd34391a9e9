//! Training metrics and logging.
//!
//! ## Aggregation
//!
//! - [`MetricAggregator`]: running means between two log points
//!
//! ## Loggers
//!
//! - [`ConsoleLogger`]: `log::info!` lines at a step interval
//! - [`CSVLogger`]: long-format CSV file
//! - [`TensorBoardLogger`]: TFRecord event file (`tensorboard` feature)
//! - [`MultiLogger`]: combine multiple loggers

pub mod aggregator;
pub mod logger;
#[cfg(feature = "tensorboard")]
pub mod tensorboard;

pub use aggregator::MetricAggregator;
pub use logger::{CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger};
#[cfg(feature = "tensorboard")]
pub use tensorboard::TensorBoardLogger;
