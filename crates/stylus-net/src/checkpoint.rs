use std::path::{Path, PathBuf};

use burn::prelude::Backend;
use stylus_serde::{CheckpointError, NamedModule, StateDict, migrate};

use crate::{TransformerNet, TransformerNetConfig};

/// Metadata key holding the model name in a checkpoint.
pub const MODEL_METADATA_KEY: &str = "model";

/// Checkpoint base name: the model name up to its first `.` (`starry.jpg` -> `starry`).
pub fn checkpoint_base(model_name: &str) -> &str {
    model_name
        .split_once('.')
        .map_or(model_name, |(base, _)| base)
}

pub fn checkpoint_path(model_dir: &Path, model_name: &str) -> PathBuf {
    model_dir.join(format!("{}.safetensors", checkpoint_base(model_name)))
}

/// Write all network parameters, keyed by name, with the model name as metadata.
pub fn save_checkpoint<B: Backend>(
    model: &TransformerNet<B>,
    model_name: &str,
    path: &Path,
) -> Result<(), CheckpointError> {
    let dict = model
        .to_state_dict()
        .with_metadata(MODEL_METADATA_KEY, model_name);
    dict.write(path)?;
    log::info!("Saved {} parameters to {}", dict.len(), path.display());
    Ok(())
}

/// Load a checkpoint into a fresh network, dropping obsolete entries first.
/// Whatever is left must match the network's parameters exactly.
pub fn load_checkpoint<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<TransformerNet<B>, CheckpointError> {
    let mut dict = StateDict::read(path)?;
    load_state(&mut dict, device)
}

pub fn load_state<B: Backend>(
    dict: &mut StateDict,
    device: &B::Device,
) -> Result<TransformerNet<B>, CheckpointError> {
    let dropped = migrate(dict);
    if !dropped.is_empty() {
        log::warn!("Checkpoint had {} obsolete entries", dropped.len());
    }
    TransformerNetConfig::new()
        .init::<B>(device)
        .load_state_dict(std::mem::take(dict))
}
