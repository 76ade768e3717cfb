#![recursion_limit = "256"]

pub mod checkpoint;
pub mod layers;
mod transformer;

pub use checkpoint::{checkpoint_base, checkpoint_path, load_checkpoint, save_checkpoint};
pub use layers::MIN_INPUT_SIZE;
pub use transformer::{TransformerNet, TransformerNetConfig};
