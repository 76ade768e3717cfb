pub mod config;
pub mod folder;
pub mod image_io;

use std::path::PathBuf;

pub use folder::ImageFolder;
pub use image_io::ImageIoError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("No images found in dataset directory {0}")]
    Empty(PathBuf),
    #[error("Invalid training image size {0}, must be positive")]
    InvalidSize(u32),
    #[error("I/O error while reading dataset {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Image(#[from] ImageIoError),
}
