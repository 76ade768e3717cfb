use std::{fmt, path::Path, str::FromStr};

use burn::prelude::Backend;
use image::{DynamicImage, RgbImage};
use stylus_dataset::image_io::{encode_png, image_to_tensor, load_image, tensor_to_image};
use stylus_net::{MIN_INPUT_SIZE, TransformerNet, checkpoint_path, load_checkpoint};
use tracing::trace_span;

use crate::{config::PredictConfig, error::StyleError};

/// What the caller wants back from a prediction. The stylized image is the same for both,
/// the flag only tells the caller how to package it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Pdf,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

impl FromStr for OutputFormat {
    type Err = StyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image/png" => Ok(Self::Png),
            "application/pdf" => Ok(Self::Pdf),
            other => Err(StyleError::InvalidArgument(format!(
                "Unsupported output format {other}, use image/png or application/pdf"
            ))),
        }
    }
}

/// A loaded network, ready to stylize any number of images.
pub struct Stylizer<B: Backend> {
    model: TransformerNet<B>,
    device: B::Device,
}

impl<B: Backend> Stylizer<B> {
    pub fn new(model: TransformerNet<B>, device: &B::Device) -> Self {
        Self {
            model,
            device: device.clone(),
        }
    }

    /// Load a checkpoint. Obsolete entries are dropped (with a warning), anything else that
    /// doesn't fit the network is an error.
    pub fn load(checkpoint: &Path, device: &B::Device) -> Result<Self, StyleError> {
        let model = load_checkpoint::<B>(checkpoint, device)?;
        log::info!("Loaded style model {}", checkpoint.display());
        Ok(Self::new(model, device))
    }

    pub fn stylize(&self, content: &DynamicImage) -> Result<RgbImage, StyleError> {
        let _span = trace_span!("Stylize image").entered();

        let (width, height) = (content.width(), content.height());
        if width.min(height) < MIN_INPUT_SIZE as u32 {
            return Err(StyleError::InvalidArgument(format!(
                "Content image is {width}x{height}, both sides must be at least {MIN_INPUT_SIZE} pixels"
            )));
        }

        let input = image_to_tensor::<B>(content, &self.device).unsqueeze::<4>();
        let output = self.model.forward(input);
        let [_, c, h, w] = output.dims();
        Ok(tensor_to_image(output.reshape([c, h, w]))?)
    }
}

/// Stylize one image with the network stored in `checkpoint`.
pub fn infer<B: Backend>(
    content: &DynamicImage,
    checkpoint: &Path,
    device: &B::Device,
) -> Result<RgbImage, StyleError> {
    Stylizer::<B>::load(checkpoint, device)?.stylize(content)
}

pub struct Prediction {
    pub image: RgbImage,
    pub format: OutputFormat,
}

impl Prediction {
    pub fn encode_png(&self) -> Result<Vec<u8>, StyleError> {
        Ok(encode_png(&self.image)?)
    }
}

pub fn predict<B: Backend>(
    config: &PredictConfig,
    device: &B::Device,
) -> Result<Prediction, StyleError> {
    let (Some(content_path), Some(model_name)) = (&config.content, &config.model_name) else {
        return Err(StyleError::InvalidArgument(
            "Please select a style and a content image".to_owned(),
        ));
    };

    let stylizer = Stylizer::<B>::load(&checkpoint_path(&config.model_dir, model_name), device)?;
    let content = load_image(content_path)?;
    let image = stylizer.stylize(&content)?;
    log::info!("Stylized {} with {model_name}", content_path.display());

    Ok(Prediction {
        image,
        format: config.accept,
    })
}

/// Stylizing images from a URL isn't supported, callers get this payload back.
pub fn predict_url(_url: &str) -> serde_json::Value {
    serde_json::json!({ "Error": "Not implemented (predict_url())" })
}
