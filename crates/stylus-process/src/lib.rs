#![recursion_limit = "256"]

pub mod config;
pub mod device;
pub mod error;
pub mod message;
pub mod models;
pub mod predict;
pub mod train_stream;

use std::pin::Pin;

use tokio_stream::Stream;

pub use error::StyleError;
pub use predict::{OutputFormat, Prediction, Stylizer, infer, predict, predict_url};

use crate::{
    config::{PredictConfig, ProcessArgs},
    device::{ComputeDevice, CpuBackend, GpuBackend},
    message::ProcessMessage,
    train_stream::{collect_report, into_style_error, train_stream},
};
use stylus_train::TrainReport;

pub type ProcessStream = Pin<Box<dyn Stream<Item = Result<ProcessMessage, anyhow::Error>>>>;

/// Start training on the configured device.
pub fn process_stream(args: ProcessArgs) -> ProcessStream {
    log::info!("Running on {:?}", args.process_config.device);
    match args.process_config.device {
        ComputeDevice::Cpu => Box::pin(train_stream::<CpuBackend>(args, Default::default())),
        ComputeDevice::Gpu => Box::pin(train_stream::<GpuBackend>(args, Default::default())),
    }
}

/// Train to completion and return the final losses.
pub async fn train(args: ProcessArgs) -> Result<TrainReport, StyleError> {
    collect_report(process_stream(args))
        .await
        .map_err(into_style_error)
}

/// Stylize the requested content image on the configured device.
pub fn predict_on_device(config: &PredictConfig) -> Result<Prediction, StyleError> {
    match config.device {
        ComputeDevice::Cpu => predict::<CpuBackend>(config, &Default::default()),
        ComputeDevice::Gpu => predict::<GpuBackend>(config, &Default::default()),
    }
}
