use anyhow::Context;
use async_fn_stream::try_fn_stream;
use burn::{
    backend::Autodiff,
    module::{AutodiffModule, Module},
    prelude::Backend,
};
use stylus_dataset::{
    ImageFolder,
    image_io::{image_to_tensor, load_image_sized},
};
use stylus_net::{TransformerNetConfig, checkpoint_path, save_checkpoint};
use stylus_train::{LossAggregate, StyleTrainer, TrainReport, style_targets};
use stylus_vgg::Vgg16;
use tokio_stream::{Stream, StreamExt};
use tracing::trace_span;
use web_time::{Duration, Instant};

use crate::{
    config::ProcessArgs, error::StyleError, message::ProcessMessage, models::style_image_path,
};

/// Smallest training or style image side: the transformer needs room for its reflection
/// padding, VGG for its pools.
pub const MIN_TRAIN_SIZE: u32 = {
    let net = stylus_net::MIN_INPUT_SIZE;
    let vgg = stylus_vgg::MIN_INPUT_SIZE;
    (if net > vgg { net } else { vgg }) as u32
};

/// Reject settings that can't produce a single training step, before touching the disk.
pub fn check_args(args: &ProcessArgs) -> Result<(), StyleError> {
    if args.train_config.batch_size == 0 {
        return Err(StyleError::InvalidArgument(
            "Batch size must be at least 1".to_owned(),
        ));
    }
    let sizes = [
        ("image size", args.dataset_config.image_size),
        ("style size", args.dataset_config.style_size),
    ];
    for (name, size) in sizes {
        if size < MIN_TRAIN_SIZE {
            return Err(StyleError::InvalidArgument(format!(
                "Training {name} must be at least {MIN_TRAIN_SIZE}, got {size}"
            )));
        }
    }
    Ok(())
}

/// Recover the typed error from a failed training stream. The full context chain is logged.
pub fn into_style_error(err: anyhow::Error) -> StyleError {
    log::error!("Training failed: {err:#}");
    err.downcast::<StyleError>()
        .unwrap_or_else(|err| StyleError::Training(format!("{err:#}")))
}

/// Train a style network, reporting progress between batches. The stream ends after the
/// checkpoint is written, with a [`ProcessMessage::Done`] carrying the final losses.
pub fn train_stream<B: Backend>(
    args: ProcessArgs,
    device: B::Device,
) -> impl Stream<Item = Result<ProcessMessage, anyhow::Error>> + 'static {
    try_fn_stream(|emitter| async move {
        log::info!("Start of training stream for {}", args.model_name);
        emitter.emit(ProcessMessage::StartLoading).await;

        check_args(&args)?;
        let process_config = &args.process_config;
        let train_config = &args.train_config;

        log::info!("Using seed {}", process_config.seed);
        <Autodiff<B> as Backend>::seed(&device, process_config.seed);

        let style_path = style_image_path(&process_config.data_dir, &args.model_name);
        let dataset = ImageFolder::open(
            &process_config.data_dir,
            &args.dataset_config,
            Some(&style_path),
        )
        .map_err(StyleError::from)
        .context("Failed to load the training images")?;

        let style = load_image_sized(&style_path, Some(args.dataset_config.style_size))
            .map_err(StyleError::from)
            .with_context(|| format!("Failed to load style image {}", style_path.display()))?;

        let vgg = Vgg16::<Autodiff<B>>::load_pretrained(&process_config.vgg_weights, &device)
            .map_err(StyleError::from)
            .with_context(|| {
                format!(
                    "Failed to load VGG weights from {}",
                    process_config.vgg_weights.display()
                )
            })?;

        emitter
            .emit(ProcessMessage::Dataset {
                num_images: dataset.len(),
                style_image: style_path.clone(),
            })
            .await;

        let style = image_to_tensor::<Autodiff<B>>(&style, &device).unsqueeze::<4>();
        let targets = style_targets(&vgg, style, train_config.batch_size);
        let mut trainer = StyleTrainer::new(train_config, targets);
        let mut model = TransformerNetConfig::new().init::<Autodiff<B>>(&device);
        log::info!(
            "Training {} parameters on {} images",
            model.num_params(),
            dataset.len()
        );
        emitter.emit(ProcessMessage::DoneLoading).await;

        let mut train_duration = Duration::from_secs(0);
        let mut last_epoch = LossAggregate::default();

        for epoch in 1..=train_config.epochs {
            let shuffle_seed = args
                .dataset_config
                .shuffle
                .then(|| process_config.seed.wrapping_add(epoch as u64));
            let order = dataset.epoch_order(shuffle_seed);

            let mut aggregate = LossAggregate::default();
            for (batch_id, paths) in order.chunks(train_config.batch_size).enumerate() {
                let step_time = Instant::now();

                let batch = dataset
                    .load_batch::<Autodiff<B>>(paths, &device)
                    .map_err(StyleError::from)
                    .with_context(|| format!("Failed to load batch {batch_id} of epoch {epoch}"))?;
                let (new_model, stats) = trainer.step(&vgg, model, batch);
                model = new_model;
                aggregate.push(&stats);

                train_duration += step_time.elapsed();

                if ((batch_id + 1) as u32).is_multiple_of(process_config.log_interval) {
                    let losses = aggregate.averages();
                    log::info!(
                        "Epoch {epoch}: [{}/{}] content: {:.6} style: {:.6} total: {:.6}",
                        aggregate.images(),
                        dataset.len(),
                        losses.content,
                        losses.style,
                        losses.total
                    );
                    emitter
                        .emit(ProcessMessage::TrainStep {
                            epoch,
                            images_seen: aggregate.images(),
                            total_images: dataset.len(),
                            losses,
                            total_elapsed: train_duration,
                        })
                        .await;
                }
            }

            emitter
                .emit(ProcessMessage::EpochDone {
                    epoch,
                    losses: aggregate.averages(),
                })
                .await;
            last_epoch = aggregate;
        }

        let path = checkpoint_path(&process_config.model_dir, &args.model_name);
        trace_span!("Save checkpoint")
            .in_scope(|| save_checkpoint(&model.valid(), &args.model_name, &path))
            .map_err(StyleError::from)
            .with_context(|| format!("Failed to save checkpoint {}", path.display()))?;
        emitter
            .emit(ProcessMessage::CheckpointSaved { path: path.clone() })
            .await;

        log::info!("Trained model saved at {}", path.display());
        emitter
            .emit(ProcessMessage::Done {
                report: TrainReport::ok(last_epoch.averages()),
            })
            .await;
        Ok(())
    })
}

/// Drive a training stream to completion and return its report.
pub async fn collect_report(
    stream: impl Stream<Item = Result<ProcessMessage, anyhow::Error>>,
) -> anyhow::Result<TrainReport> {
    let mut stream = std::pin::pin!(stream);
    let mut report = None;
    while let Some(msg) = stream.next().await {
        if let ProcessMessage::Done { report: done } = msg? {
            report = Some(done);
        }
    }
    report.context("Training ended without a report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ComputeDevice, CpuBackend};
    use image::{Rgb, RgbImage};
    use std::path::{Path, PathBuf};
    use stylus_dataset::DatasetError;
    use stylus_serde::{NamedModule, StateDict};
    use stylus_vgg::Vgg16Config;

    fn write_image(path: &Path, seed: u8) {
        RgbImage::from_fn(40, 36, |x, y| {
            Rgb([
                (x as u8).wrapping_mul(seed),
                (y as u8).wrapping_add(seed),
                seed,
            ])
        })
        .save(path)
        .expect("Failed to write image");
    }

    fn setup(name: &str) -> (PathBuf, ProcessArgs) {
        let root = std::env::temp_dir().join("stylus-train-stream").join(name);
        let _ = std::fs::remove_dir_all(&root);
        let data_dir = root.join("data");
        std::fs::create_dir_all(data_dir.join("content")).expect("Failed to create dir");

        write_image(&data_dir.join("content").join("a.png"), 3);
        write_image(&data_dir.join("content").join("b.png"), 7);
        write_image(&data_dir.join("starry.png"), 11);

        let vgg_weights = root.join("vgg16.safetensors");
        Vgg16Config::new()
            .init::<CpuBackend>(&Default::default())
            .to_state_dict()
            .write(&vgg_weights)
            .expect("Failed to write VGG weights");

        let mut args = ProcessArgs::for_model("starry.png");
        args.train_config.epochs = 1;
        args.train_config.batch_size = 2;
        args.train_config.content_weight = 1e5;
        args.train_config.style_weight = 1e10;
        args.dataset_config.image_size = 32;
        args.dataset_config.style_size = 32;
        args.dataset_config.dataset_subdir = Some("content".to_owned());
        args.process_config.log_interval = 1;
        args.process_config.model_dir = root.join("models");
        args.process_config.data_dir = data_dir;
        args.process_config.vgg_weights = vgg_weights;
        args.process_config.device = ComputeDevice::Cpu;
        (root, args)
    }

    #[tokio::test]
    async fn one_epoch_writes_a_complete_checkpoint() {
        let (root, args) = setup("one-epoch");
        let stream = train_stream::<CpuBackend>(args, Default::default());
        let mut stream = std::pin::pin!(stream);

        let mut steps = 0;
        let mut report = None;
        while let Some(msg) = stream.next().await {
            match msg.expect("Training failed") {
                ProcessMessage::TrainStep {
                    images_seen,
                    total_images,
                    ..
                } => {
                    steps += 1;
                    assert_eq!(images_seen, 2);
                    assert_eq!(total_images, 2);
                }
                ProcessMessage::Done { report: done } => report = Some(done),
                _ => {}
            }
        }
        assert_eq!(steps, 1);

        let report = report.expect("No report");
        assert_eq!(report.status, "ok");
        assert!(report.training[0].total.is_finite());
        assert!(report.training[0].content.is_finite());
        assert!(report.training[0].style.is_finite());

        let checkpoint = StateDict::read(&root.join("models").join("starry.safetensors"))
            .expect("Checkpoint written");
        assert_eq!(checkpoint.metadata("model"), Some("starry.png"));
        let keys: std::collections::BTreeSet<String> = checkpoint.keys().cloned().collect();
        let fresh = TransformerNetConfig::new().init::<CpuBackend>(&Default::default());
        assert_eq!(keys, fresh.param_names());
    }

    #[tokio::test]
    async fn missing_vgg_weights_abort_before_training() {
        let (_, mut args) = setup("missing-vgg");
        args.process_config.vgg_weights = PathBuf::from("/no/such/vgg16.safetensors");
        let res = collect_report(train_stream::<CpuBackend>(args, Default::default())).await;
        let err = res.expect_err("Should fail");
        assert!(format!("{err:#}").contains("VGG"));
        assert!(matches!(
            into_style_error(err),
            StyleError::ModelNotFound(_)
        ));
    }

    #[tokio::test]
    async fn tiny_training_sizes_are_invalid_arguments() {
        for (image_size, style_size) in [(4, 32), (32, 4), (0, 32), (7, 32)] {
            let (_, mut args) = setup("tiny-sizes");
            args.dataset_config.image_size = image_size;
            args.dataset_config.style_size = style_size;
            // Points nowhere, validation must fail before any file is read.
            args.process_config.data_dir = PathBuf::from("/no/such/data");

            let res = crate::train(args).await;
            assert!(
                matches!(res, Err(StyleError::InvalidArgument(_))),
                "{image_size}/{style_size} should be rejected, got {res:?}"
            );
        }
    }

    #[tokio::test]
    async fn smallest_training_size_trains() {
        let (_, mut args) = setup("smallest-size");
        args.dataset_config.image_size = MIN_TRAIN_SIZE;
        args.dataset_config.style_size = MIN_TRAIN_SIZE;
        let report = crate::train(args).await.expect("Trained");
        assert!(report.training[0].total.is_finite());
    }

    #[tokio::test]
    async fn missing_dataset_is_a_dataset_error() {
        let (_, mut args) = setup("missing-dataset");
        args.dataset_config.dataset_subdir = Some("nope".to_owned());
        let res = crate::train(args).await;
        assert!(matches!(
            res,
            Err(StyleError::Dataset(DatasetError::MissingDirectory(_)))
        ));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut args = ProcessArgs::for_model("starry.png");
        args.train_config.batch_size = 0;
        assert!(matches!(
            check_args(&args),
            Err(StyleError::InvalidArgument(_))
        ));
        assert!(check_args(&ProcessArgs::for_model("starry.png")).is_ok());
    }

    #[tokio::test]
    async fn missing_style_image_aborts() {
        let (_, mut args) = setup("missing-style");
        args.model_name = "nope.png".to_owned();
        let res = collect_report(train_stream::<CpuBackend>(args, Default::default())).await;
        assert!(res.is_err());
    }
}
