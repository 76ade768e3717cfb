use std::path::PathBuf;

use stylus_dataset::{DatasetError, ImageIoError};
use stylus_serde::CheckpointError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StyleError {
    #[error(transparent)]
    Image(ImageIoError),
    #[error(transparent)]
    Dataset(DatasetError),
    #[error("I/O error for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Model {0} does not exist")]
    ModelNotFound(PathBuf),
    #[error("Checkpoint doesn't fit the network")]
    ParameterMismatch(#[source] CheckpointError),
    #[error("Invalid checkpoint")]
    Checkpoint(#[source] CheckpointError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Training failed: {0}")]
    Training(String),
}

impl From<CheckpointError> for StyleError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::NotFound(path) => Self::ModelNotFound(path),
            CheckpointError::Io { path, source } => Self::Io { path, source },
            err @ (CheckpointError::ParameterMismatch { .. }
            | CheckpointError::ShapeMismatch { .. }) => Self::ParameterMismatch(err),
            err => Self::Checkpoint(err),
        }
    }
}

impl From<ImageIoError> for StyleError {
    fn from(err: ImageIoError) -> Self {
        match err {
            ImageIoError::InvalidSize(size) => {
                Self::InvalidArgument(format!("Image size must be positive, got {size}"))
            }
            err => Self::Image(err),
        }
    }
}

impl From<DatasetError> for StyleError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::Image(err) => err.into(),
            DatasetError::InvalidSize(size) => {
                Self::InvalidArgument(format!("Training image size must be positive, got {size}"))
            }
            err => Self::Dataset(err),
        }
    }
}
