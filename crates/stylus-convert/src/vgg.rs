use std::path::Path;

use anyhow::Context;
use burn::{
    module::Module,
    record::{FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use stylus_serde::NamedModule;
use stylus_vgg::{Vgg16, Vgg16Config};

/// torchvision `features` index of each conv, as (block, conv in block).
const CONV_LAYOUT: [(usize, usize, usize); 10] = [
    (0, 0, 0),
    (2, 0, 1),
    (5, 1, 0),
    (7, 1, 1),
    (10, 2, 0),
    (12, 2, 1),
    (14, 2, 2),
    (17, 3, 0),
    (19, 3, 1),
    (21, 3, 2),
];

/// Convert torchvision VGG-16 weights (`vgg16-*.pth`) to the safetensors file used for training.
pub(crate) fn convert_vgg<B: Backend>(
    input: &Path,
    output: &Path,
    device: &B::Device,
) -> anyhow::Result<()> {
    let load_args = CONV_LAYOUT.iter().fold(
        LoadArgs::new(input.to_owned()),
        |load_args, (idx, block, conv)| {
            load_args.with_key_remap(
                &format!(r"^features\.{idx}\.(weight|bias)$"),
                &format!("blocks.{block}.convs.{conv}.conv.$1"),
            )
        },
    );

    let record: <Vgg16<B> as Module<B>>::Record =
        PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(load_args, device)
            .with_context(|| format!("Failed to decode {}", input.display()))?;
    let model = Vgg16Config::new().init::<B>(device).load_record(record);

    let dict = model.to_state_dict();
    dict.write(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!("Wrote {} tensors to {}", dict.len(), output.display());
    Ok(())
}
