#![recursion_limit = "256"]

pub mod config;
pub mod loss;
pub mod stats;
pub mod train;

pub use stats::{LossAggregate, LossAverages, StepStats, TrainReport};
pub use train::{StyleTrainer, style_targets};
