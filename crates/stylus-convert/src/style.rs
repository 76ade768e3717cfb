use std::path::Path;

use anyhow::Context;
use burn::tensor::backend::Backend;
use burn_store::pytorch::PytorchReader;
use stylus_net::{checkpoint::load_state, save_checkpoint};
use stylus_serde::StateDict;

/// Every tensor of a PyTorch `state_dict` file, as f32, under its PyTorch name.
pub(crate) fn read_pth(path: &Path) -> anyhow::Result<StateDict> {
    let reader = PytorchReader::new(path)
        .map_err(|err| anyhow::anyhow!("{err:?}"))
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut dict = StateDict::new();
    for name in reader.keys() {
        let Some(snapshot) = reader.get(&name) else {
            continue;
        };
        let data = snapshot
            .to_data()
            .map_err(|err| anyhow::anyhow!("{err:?}"))
            .with_context(|| format!("Failed to decode tensor {name}"))?;
        dict.insert(name, data.convert::<f32>());
    }
    log::info!("Read {} tensors from {}", dict.len(), path.display());
    Ok(dict)
}

/// Load a style network state dict into the transformer and write it as a checkpoint.
///
/// Running statistics saved by old instance norm layers are dropped on the way, every other
/// entry has to match the network.
pub(crate) fn convert_style<B: Backend>(
    mut dict: StateDict,
    model_name: &str,
    output: &Path,
    device: &B::Device,
) -> anyhow::Result<()> {
    let model = load_state::<B>(&mut dict, device)
        .context("Weights don't fit the style network")?;
    save_checkpoint(&model, model_name, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}
