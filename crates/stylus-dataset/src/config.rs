use burn::config::Config;
use clap::Args;

#[derive(Config, Debug, Args)]
pub struct DatasetConfig {
    /// Training images are resized (shorter side) and center cropped to this size.
    #[arg(long, help_heading = "Dataset Options", default_value = "512")]
    #[config(default = 512)]
    pub image_size: u32,
    /// Size the style image is resized to before computing style targets.
    #[arg(long, help_heading = "Dataset Options", default_value = "512")]
    #[config(default = 512)]
    pub style_size: u32,
    /// Shuffle the training images every epoch (seeded).
    #[arg(long, help_heading = "Dataset Options", default_value = "false")]
    #[config(default = false)]
    pub shuffle: bool,
    /// Only use images under this sub directory of the data dir.
    #[arg(long, help_heading = "Dataset Options")]
    pub dataset_subdir: Option<String>,
    /// Max nr. of images of the dataset to load.
    #[arg(long, help_heading = "Dataset Options")]
    pub max_images: Option<usize>,
}
