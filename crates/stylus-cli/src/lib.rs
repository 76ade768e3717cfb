#![recursion_limit = "256"]

use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use stylus_process::{
    OutputFormat,
    config::{PredictConfig, ProcessArgs},
    message::ProcessMessage,
    models::available_models,
    predict_on_device, process_stream,
};
use stylus_train::TrainReport;
use tokio_stream::{Stream, StreamExt};

#[derive(Parser)]
#[command(author, version, about = "Stylus - fast neural style transfer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Train a style model from a style image and a folder of content images.
    Train(ProcessArgs),
    /// Stylize a content image with a trained model.
    Predict {
        #[clap(flatten)]
        config: PredictConfig,
        /// Where to write the stylized image.
        #[arg(long, default_value = "result.png")]
        output: PathBuf,
    },
    /// List the available models.
    Models {
        #[arg(long, default_value = "models")]
        model_dir: PathBuf,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Train(args) => {
            let stream = process_stream(args.clone());
            let report = process_ui(stream, &args).await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Predict { config, output } => {
            let prediction = predict_on_device(&config)?;
            if prediction.format == OutputFormat::Pdf {
                log::warn!("PDF documents aren't generated, writing the stylized image only");
            }
            let png = prediction.encode_png()?;
            tokio::fs::write(&output, png)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "{}",
                serde_json::json!({
                    "output": output.display().to_string(),
                    "format": prediction.format.to_string(),
                })
            );
        }
        Command::Models { model_dir } => {
            println!("{}", serde_json::to_string(&available_models(&model_dir))?);
        }
    }
    Ok(())
}

pub async fn process_ui(
    stream: impl Stream<Item = anyhow::Result<ProcessMessage>>,
    process_args: &ProcessArgs,
) -> anyhow::Result<TrainReport> {
    let main_spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .expect("Invalid indicatif config")
            .tick_strings(&["◐", "◓", "◑", "◒"]),
    );

    let stats_spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .expect("Invalid indicatif config")
            .tick_strings(&["ℹ️", "ℹ️"]),
    );

    let train_progress = ProgressBar::new(0)
        .with_style(
            ProgressStyle::with_template(
                "[{elapsed}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg} ({per_sec}, {eta} remaining)",
            )
            .expect("Invalid indicatif config")
            .progress_chars("◍○○"),
        )
        .with_message("Images");

    let sp = indicatif::MultiProgress::new();
    let main_spinner = sp.add(main_spinner);
    let train_progress = sp.add(train_progress);
    let stats_spinner = sp.add(stats_spinner);

    main_spinner.enable_steady_tick(Duration::from_millis(120));
    stats_spinner.set_message(format!(
        "logging every {} batches",
        process_args.process_config.log_interval
    ));

    if cfg!(debug_assertions) {
        let _ =
            sp.println("ℹ️  running in debug mode, compile with --release for best performance");
    }

    let epochs = process_args.train_config.epochs as u64;
    let mut stream = std::pin::pin!(stream);
    let mut duration = Duration::from_secs(0);
    let mut report = None;

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(error) => {
                // The error bubbles up and gets printed by the caller.
                let _ = sp.println("❌ Encountered an error");
                return Err(error);
            }
        };

        match msg {
            ProcessMessage::StartLoading => {
                main_spinner.set_message("Loading data...");
            }
            ProcessMessage::Dataset {
                num_images,
                style_image,
            } => {
                train_progress.set_length(epochs * num_images as u64);
                main_spinner.set_message(format!(
                    "Loaded {num_images} images, style {}",
                    style_image.display()
                ));
            }
            ProcessMessage::DoneLoading => {
                main_spinner.set_message("Computed style targets");
            }
            ProcessMessage::TrainStep {
                epoch,
                images_seen,
                total_images,
                losses,
                total_elapsed,
            } => {
                main_spinner.set_message(format!("Training epoch {epoch}/{epochs}"));
                train_progress
                    .set_position((epoch as u64 - 1) * total_images as u64 + images_seen as u64);
                stats_spinner.set_message(format!(
                    "content {:.6}, style {:.6}, total {:.6}",
                    losses.content, losses.style, losses.total
                ));
                duration = total_elapsed;
            }
            ProcessMessage::EpochDone { epoch, losses } => {
                let _ = sp.println(format!(
                    "✅ Epoch {epoch}: content {:.6}, style {:.6}, total {:.6}",
                    losses.content, losses.style, losses.total
                ));
            }
            ProcessMessage::CheckpointSaved { path } => {
                train_progress.finish();
                main_spinner.set_message(format!("Saved {}", path.display()));
            }
            ProcessMessage::Done { report: done } => {
                report = Some(done);
            }
        }
    }

    let duration_secs = Duration::from_secs(duration.as_secs());
    let _ = sp.println(format!(
        "Training took {}",
        humantime::format_duration(duration_secs)
    ));
    log::info!(
        "Done training! Took {}.",
        humantime::format_duration(duration_secs)
    );

    report.context("Training ended without a report")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_train_command() {
        let cli = Cli::parse_from([
            "stylus",
            "train",
            "--model-name",
            "starry.jpg",
            "--epochs",
            "1",
            "--device",
            "cpu",
        ]);
        let Command::Train(args) = cli.command else {
            panic!("Expected the train command");
        };
        assert_eq!(args.model_name, "starry.jpg");
        assert_eq!(args.train_config.epochs, 1);
        assert_eq!(args.train_config.batch_size, 4);
    }

    #[test]
    fn parses_predict_command() {
        let cli = Cli::parse_from([
            "stylus",
            "predict",
            "--content",
            "cat.png",
            "--model-name",
            "mosaic",
            "--accept",
            "application/pdf",
        ]);
        let Command::Predict { config, output } = cli.command else {
            panic!("Expected the predict command");
        };
        assert_eq!(config.accept, OutputFormat::Pdf);
        assert_eq!(config.model_name.as_deref(), Some("mosaic"));
        assert_eq!(output, PathBuf::from("result.png"));
    }

    #[test]
    fn rejects_unknown_output_format() {
        let res = Cli::try_parse_from([
            "stylus",
            "predict",
            "--accept",
            "text/html",
        ]);
        assert!(res.is_err());
    }
}
