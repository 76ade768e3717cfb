use std::path::{Path, PathBuf};

use burn::{prelude::Backend, tensor::Tensor};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing::trace_span;

use crate::{
    DatasetError,
    config::DatasetConfig,
    image_io::{images_to_batch, load_image, resize_and_crop},
};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn collect_images(dir: &Path, exclude: Option<&Path>, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, exclude, out)?;
        } else if is_image_path(&path) && exclude != Some(path.as_path()) {
            out.push(path);
        }
    }
    Ok(())
}

/// A folder of training images, found recursively and ordered by natural sort.
#[derive(Clone, Debug)]
pub struct ImageFolder {
    paths: Vec<PathBuf>,
    image_size: u32,
}

impl ImageFolder {
    /// Index all images under `root`. `exclude` is skipped (eg. the style image living in the same
    /// directory).
    pub fn open(
        root: &Path,
        config: &DatasetConfig,
        exclude: Option<&Path>,
    ) -> Result<Self, DatasetError> {
        let root = match &config.dataset_subdir {
            Some(sub) => root.join(sub),
            None => root.to_owned(),
        };
        if !root.is_dir() {
            return Err(DatasetError::MissingDirectory(root));
        }
        if config.image_size == 0 {
            return Err(DatasetError::InvalidSize(config.image_size));
        }

        let mut paths = vec![];
        collect_images(&root, exclude, &mut paths).map_err(|source| DatasetError::Io {
            path: root.clone(),
            source,
        })?;
        alphanumeric_sort::sort_path_slice(&mut paths);

        if let Some(max) = config.max_images {
            paths.truncate(max);
        }
        if paths.is_empty() {
            return Err(DatasetError::Empty(root));
        }

        log::info!("Found {} training images in {}", paths.len(), root.display());

        Ok(Self {
            paths,
            image_size: config.image_size,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Number of batches per epoch, the last one might be partial.
    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.paths.len().div_ceil(batch_size.max(1))
    }

    /// The image order for an epoch. Shuffled deterministically when a seed is given.
    pub fn epoch_order(&self, shuffle_seed: Option<u64>) -> Vec<PathBuf> {
        let mut order = self.paths.clone();
        if let Some(seed) = shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed);
            order.shuffle(&mut rng);
        }
        order
    }

    /// Load a batch of images as a `[N, 3, S, S]` tensor in the [0, 255] range.
    pub fn load_batch<B: Backend>(
        &self,
        paths: &[PathBuf],
        device: &B::Device,
    ) -> Result<Tensor<B, 4>, DatasetError> {
        let _span = trace_span!("Load batch").entered();

        let imgs = paths
            .iter()
            .map(|p| {
                let img = load_image(p)?;
                resize_and_crop(&img, self.image_size)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(images_to_batch(&imgs, device))
    }
}
