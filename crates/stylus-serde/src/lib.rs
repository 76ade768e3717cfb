pub mod migrate;
pub mod named;
pub mod state_dict;

use std::path::PathBuf;

pub use migrate::{Migration, migrate};
pub use named::{NamedModule, ParamMapper, ParamVisitor, join_name};
pub use state_dict::StateDict;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint {0} does not exist")]
    NotFound(PathBuf),
    #[error("I/O error for checkpoint {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid safetensors data: {0}")]
    Format(String),
    #[error("Tensor {name} has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },
    #[error("Invalid tensor data: {0}")]
    Data(String),
    #[error("Checkpoint parameters don't match the model. Missing: {missing:?}, unexpected: {unexpected:?}")]
    ParameterMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("Parameter {name} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}
