use burn::config::Config;
use clap::Args;

#[derive(Config, Debug, Args)]
pub struct TrainConfig {
    /// Number of passes over the training images.
    #[arg(long, help_heading = "Training options", default_value = "2")]
    #[config(default = 2)]
    pub epochs: u32,
    /// Images per optimizer step.
    #[arg(long, help_heading = "Training options", default_value = "4")]
    #[config(default = 4)]
    pub batch_size: usize,
    /// Adam learning rate.
    #[arg(long, help_heading = "Training options", default_value = "1e-3")]
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Weight of the feature reconstruction (content) loss.
    #[arg(long, help_heading = "Training options", default_value = "1e5")]
    #[config(default = 1e5)]
    pub content_weight: f32,
    /// Weight of the Gram matrix (style) loss.
    #[arg(long, help_heading = "Training options", default_value = "1e10")]
    #[config(default = 1e10)]
    pub style_weight: f32,
}
