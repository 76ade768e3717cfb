#![recursion_limit = "256"]

mod style;
mod vgg;

use std::path::PathBuf;

use burn::backend::NdArray;
use clap::{Parser, Subcommand};
use stylus_net::checkpoint_path;

/// Convert PyTorch weights to the safetensors files used by stylus.
#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// torchvision VGG-16 weights, needed for training.
    Vgg {
        /// PyTorch checkpoint of `torchvision.models.vgg16`.
        input: PathBuf,
        /// Where to write the converted weights.
        #[arg(long, default_value = "models/vgg/vgg16.safetensors")]
        output: PathBuf,
    },
    /// A trained style network, saved as a PyTorch `state_dict`.
    Style {
        /// The `.pth` file, e.g. `mosaic.pth`.
        input: PathBuf,
        /// Name stored in the checkpoint. Defaults to the input file name.
        #[arg(long)]
        model_name: Option<String>,
        /// Directory the checkpoint is written to.
        #[arg(long, default_value = "models")]
        model_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .target(env_logger::Target::Stdout)
        .init();

    let device = Default::default();
    match Cli::parse().command {
        Command::Vgg { input, output } => {
            log::info!("Converting {} to safetensors", input.display());
            vgg::convert_vgg::<NdArray>(&input, &output, &device)
        }
        Command::Style {
            input,
            model_name,
            model_dir,
        } => {
            let model_name = model_name.unwrap_or_else(|| {
                input
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            anyhow::ensure!(!model_name.is_empty(), "Please pass --model-name");

            let output = checkpoint_path(&model_dir, &model_name);
            let dict = style::read_pth(&input)?;
            style::convert_style::<NdArray>(dict, &model_name, &output, &device)
        }
    }
}
