use burn::backend::{NdArray, Wgpu};
use clap::ValueEnum;

/// CPU backend, also used by all tests.
pub type CpuBackend = NdArray;
pub type GpuBackend = Wgpu;

/// Where a run executes. Resolved once when the run starts and kept for its whole duration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ComputeDevice {
    Cpu,
    #[default]
    Gpu,
}
