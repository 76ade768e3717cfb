use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use burn::{
    prelude::Backend,
    tensor::{Tensor, TensorData},
};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;

/// Channel means of the distribution the feature extractor was trained on.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Channel standard deviations of the distribution the feature extractor was trained on.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Error)]
pub enum ImageIoError {
    #[error("Image file {0} does not exist")]
    Missing(PathBuf),
    #[error("I/O error for image {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode or encode image {path}")]
    Codec {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Invalid image size {0}, must be positive")]
    InvalidSize(u32),
    #[error("Tensor of shape {0:?} is not a 3 channel image")]
    InvalidShape(Vec<usize>),
}

/// Load an image from disk, guessing the format from its content.
pub fn load_image(path: &Path) -> Result<DynamicImage, ImageIoError> {
    if !path.is_file() {
        return Err(ImageIoError::Missing(path.to_owned()));
    }
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|source| ImageIoError::Io {
            path: path.to_owned(),
            source,
        })?;
    reader.decode().map_err(|source| ImageIoError::Codec {
        path: path.to_owned(),
        source,
    })
}

/// Load an image and, if a size is given, resize it to `size x size` (ignoring aspect ratio).
pub fn load_image_sized(path: &Path, size: Option<u32>) -> Result<DynamicImage, ImageIoError> {
    let img = load_image(path)?;
    match size {
        Some(0) => Err(ImageIoError::InvalidSize(0)),
        Some(size) => Ok(img.resize_exact(size, size, FilterType::Lanczos3)),
        None => Ok(img),
    }
}

/// Resize so the shorter side equals `target`, then take the centered `target x target` crop.
pub fn resize_and_crop(img: &DynamicImage, target: u32) -> Result<DynamicImage, ImageIoError> {
    if target == 0 {
        return Err(ImageIoError::InvalidSize(target));
    }

    let (w, h) = (img.width(), img.height());
    let (new_w, new_h) = if w <= h {
        let long = (target as f64 * h as f64 / w as f64) as u32;
        (target, long.max(target))
    } else {
        let long = (target as f64 * w as f64 / h as f64) as u32;
        (long.max(target), target)
    };
    let resized = img.resize_exact(new_w, new_h, FilterType::Triangle);

    let left = ((new_w - target) as f64 / 2.0).round() as u32;
    let top = ((new_h - target) as f64 / 2.0).round() as u32;
    Ok(resized.crop_imm(left, top, target, target))
}

/// Convert an image to a `[3, H, W]` tensor with values in [0, 255].
pub fn image_to_tensor<B: Backend>(img: &DynamicImage, device: &B::Device) -> Tensor<B, 3> {
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let values: Vec<f32> = rgb.into_raw().into_iter().map(f32::from).collect();
    Tensor::<B, 3>::from_data(TensorData::new(values, [h, w, 3]), device).permute([2, 0, 1])
}

/// Stack images of equal size into a `[N, 3, H, W]` batch in the [0, 255] range.
pub fn images_to_batch<B: Backend>(imgs: &[DynamicImage], device: &B::Device) -> Tensor<B, 4> {
    let tensors = imgs
        .iter()
        .map(|img| image_to_tensor::<B>(img, device))
        .collect();
    Tensor::stack(tensors, 0)
}

/// Convert a `[3, H, W]` tensor back into an 8 bit image. Values are clipped to [0, 255] and rounded.
pub fn tensor_to_image<B: Backend>(tensor: Tensor<B, 3>) -> Result<RgbImage, ImageIoError> {
    let [c, h, w] = tensor.dims();
    if c != 3 {
        return Err(ImageIoError::InvalidShape(vec![c, h, w]));
    }

    let hwc = tensor.clamp(0.0, 255.0).round().permute([1, 2, 0]);
    let values = hwc
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|_| ImageIoError::InvalidShape(vec![c, h, w]))?;
    let bytes = values.into_iter().map(|v| v as u8).collect();

    RgbImage::from_raw(w as u32, h as u32, bytes).ok_or(ImageIoError::InvalidShape(vec![c, h, w]))
}

/// Save a `[3, H, W]` tensor as an image. The format follows the file extension, an existing
/// file is overwritten.
pub fn save_image<B: Backend>(tensor: Tensor<B, 3>, path: &Path) -> Result<(), ImageIoError> {
    let img = tensor_to_image(tensor)?;
    img.save(path).map_err(|source| ImageIoError::Codec {
        path: path.to_owned(),
        source,
    })
}

/// Encode an image as PNG bytes.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, ImageIoError> {
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)
        .map_err(|source| ImageIoError::Codec {
            path: PathBuf::from("<memory>"),
            source,
        })?;
    Ok(bytes.into_inner())
}

/// Normalize a [0, 255] batch with the ImageNet mean and std. Only used as input
/// for the feature extractor.
pub fn normalize_batch<B: Backend>(batch: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = batch.device();
    let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, &device).reshape([1, 3, 1, 1]);
    (batch / 255.0 - mean) / std
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use burn::backend::NdArray;
    use image::Rgb;

    type TestBackend = NdArray;

    fn gradient_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("stylus-dataset-tests");
        std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
        dir.join(name)
    }

    #[test]
    fn png_roundtrip_is_lossless() {
        let device = Default::default();
        let path = temp_path("roundtrip.png");
        let original = gradient_image(21, 13);
        original.save(&path).expect("Failed to write png");

        let loaded = load_image(&path).expect("Failed to load png");
        let tensor = image_to_tensor::<TestBackend>(&loaded, &device);
        assert_eq!(tensor.dims(), [3, 13, 21]);

        let out_path = temp_path("roundtrip_out.png");
        save_image(tensor, &out_path).expect("Failed to save png");
        let reloaded = load_image(&out_path).expect("Failed to reload").to_rgb8();
        assert_eq!(reloaded.as_raw(), original.as_raw());
    }

    #[test]
    fn missing_file_is_io_error() {
        let res = load_image(Path::new("/definitely/not/here.png"));
        assert!(matches!(res, Err(ImageIoError::Missing(_))));
    }

    #[test]
    fn undecodable_file_is_codec_error() {
        let path = temp_path("garbage.png");
        std::fs::write(&path, b"this is not an image").expect("Failed to write");
        assert!(matches!(load_image(&path), Err(ImageIoError::Codec { .. })));
    }

    #[test]
    fn resize_and_crop_is_square() {
        let img = DynamicImage::ImageRgb8(gradient_image(40, 25));
        let out = resize_and_crop(&img, 16).expect("Valid size");
        assert_eq!((out.width(), out.height()), (16, 16));

        let tall = DynamicImage::ImageRgb8(gradient_image(10, 31));
        let out = resize_and_crop(&tall, 8).expect("Valid size");
        assert_eq!((out.width(), out.height()), (8, 8));
    }

    #[test]
    fn resize_and_crop_rejects_zero() {
        let img = DynamicImage::ImageRgb8(gradient_image(4, 4));
        assert!(matches!(
            resize_and_crop(&img, 0),
            Err(ImageIoError::InvalidSize(0))
        ));
    }

    #[test]
    fn tensor_to_image_clips_values() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 1>::from_floats([-20.0, 300.0, 127.6], &device)
            .reshape([3, 1, 1]);
        let img = tensor_to_image(tensor).expect("Valid tensor");
        assert_eq!(img.get_pixel(0, 0).0, [0, 255, 128]);
    }

    #[test]
    fn normalize_batch_uses_imagenet_stats() {
        let device = Default::default();
        let batch = Tensor::<TestBackend, 1>::from_floats(
            [
                IMAGENET_MEAN[0] * 255.0,
                IMAGENET_MEAN[1] * 255.0,
                255.0,
            ],
            &device,
        )
        .reshape([1, 3, 1, 1]);
        let values = normalize_batch(batch)
            .into_data()
            .to_vec::<f32>()
            .expect("f32 data");
        assert_approx_eq!(values[0], 0.0, 1e-5);
        assert_approx_eq!(values[1], 0.0, 1e-5);
        assert_approx_eq!(values[2], (1.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2], 1e-5);
    }

    #[test]
    fn encode_png_produces_png_signature() {
        let bytes = encode_png(&gradient_image(3, 3)).expect("Encode");
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
