use std::path::PathBuf;

use clap::{Args, Parser};
use stylus_dataset::config::DatasetConfig;
use stylus_train::config::TrainConfig;

use crate::{device::ComputeDevice, predict::OutputFormat};

#[derive(Clone, Debug, Args)]
pub struct ProcessConfig {
    /// Random seed for the backend and the host RNG.
    #[arg(long, help_heading = "Process options", default_value = "4321")]
    pub seed: u64,
    /// Log progress every this many batches.
    #[arg(long, help_heading = "Process options", default_value = "500")]
    pub log_interval: u32,
    /// Directory checkpoints are written to.
    #[arg(long, help_heading = "Process options", default_value = "models")]
    pub model_dir: PathBuf,
    /// Directory holding the style image and the training images.
    #[arg(long, help_heading = "Process options", default_value = "data")]
    pub data_dir: PathBuf,
    /// Pretrained VGG-16 weights (see `stylus-convert vgg`).
    #[arg(
        long,
        help_heading = "Process options",
        default_value = "models/vgg/vgg16.safetensors"
    )]
    pub vgg_weights: PathBuf,
    /// Device to run on.
    #[arg(long, help_heading = "Process options", value_enum, default_value = "gpu")]
    pub device: ComputeDevice,
}

#[derive(Parser, Clone, Debug)]
pub struct ProcessArgs {
    /// File name of the style image in the data directory, eg. `starry.jpg`. The checkpoint is
    /// named after it, up to the first `.`.
    #[arg(long)]
    pub model_name: String,
    #[clap(flatten)]
    pub train_config: TrainConfig,
    #[clap(flatten)]
    pub dataset_config: DatasetConfig,
    #[clap(flatten)]
    pub process_config: ProcessConfig,
}

impl ProcessArgs {
    /// Default arguments to train a model from the given style image.
    pub fn for_model(model_name: &str) -> Self {
        Self::parse_from(["", "--model-name", model_name])
    }
}

#[derive(Clone, Debug, Args)]
pub struct PredictConfig {
    /// Content image to stylize.
    #[arg(long, help_heading = "Predict options")]
    pub content: Option<PathBuf>,
    /// Model to stylize with, eg. `mosaic`.
    #[arg(long, help_heading = "Predict options")]
    pub model_name: Option<String>,
    /// Requested output, `image/png` or `application/pdf`.
    #[arg(long, help_heading = "Predict options", default_value = "image/png")]
    pub accept: OutputFormat,
    /// Directory holding the checkpoints.
    #[arg(long, help_heading = "Predict options", default_value = "models")]
    pub model_dir: PathBuf,
    /// Device to run on.
    #[arg(long, help_heading = "Predict options", value_enum, default_value = "gpu")]
    pub device: ComputeDevice,
}
