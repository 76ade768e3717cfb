use std::path::{Path, PathBuf};

/// Styles that ship with pretrained checkpoints.
pub const BUNDLED_MODELS: [&str; 4] = ["mosaic", "udnie", "candy", "rain_princess"];

/// All known model names: the bundled styles plus every checkpoint in `model_dir`.
pub fn available_models(model_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = BUNDLED_MODELS.iter().map(|s| (*s).to_owned()).collect();

    match std::fs::read_dir(model_dir) {
        Ok(entries) => {
            for path in entries.flatten().map(|e| e.path()) {
                if path.is_file()
                    && path.extension().is_some_and(|ext| ext == "safetensors")
                    && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                    && !names.iter().any(|n| n == stem)
                {
                    names.push(stem.to_owned());
                }
            }
        }
        Err(err) => {
            log::warn!("Can't list model directory {}: {err}", model_dir.display());
        }
    }

    alphanumeric_sort::sort_str_slice(&mut names);
    names
}

/// The style image a model is trained from, `<data_dir>/<model_name>`.
pub fn style_image_path(data_dir: &Path, model_name: &str) -> PathBuf {
    data_dir.join(model_name)
}
