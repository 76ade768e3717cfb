use std::path::PathBuf;

use stylus_train::{LossAverages, TrainReport};
use web_time::Duration;

pub enum ProcessMessage {
    StartLoading,
    /// Training images were indexed and the style image found.
    Dataset {
        num_images: usize,
        style_image: PathBuf,
    },
    /// Style targets are computed and the networks are ready.
    DoneLoading,
    /// Emitted every `log_interval` batches. Losses are running averages over the epoch so far.
    TrainStep {
        epoch: u32,
        images_seen: usize,
        total_images: usize,
        losses: LossAverages,
        total_elapsed: Duration,
    },
    EpochDone {
        epoch: u32,
        losses: LossAverages,
    },
    CheckpointSaved {
        path: PathBuf,
    },
    Done {
        report: TrainReport,
    },
}
