use burn::{
    config::Config,
    module::Module,
    nn::{
        InstanceNorm, InstanceNormConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        interpolate::{Interpolate2d, Interpolate2dConfig, InterpolateMode},
    },
    prelude::{Backend, Int},
    tensor::{Device, Tensor},
};
use stylus_serde::{NamedModule, ParamMapper, ParamVisitor, join_name};

fn gather_indices<B: Backend>(
    indices: impl Iterator<Item = usize>,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let indices: Vec<i32> = indices.map(|i| i as i32).collect();
    Tensor::from_ints(indices.as_slice(), device)
}

/// Largest reflection pad used by [`crate::TransformerNet`] (the 9x9 kernels).
pub const MAX_REFLECTION_PAD: usize = 4;

/// Smallest image side the transformer accepts. Reflection padding mirrors
/// interior pixels, so every side must be longer than the pad.
pub const MIN_INPUT_SIZE: usize = MAX_REFLECTION_PAD + 1;

/// Pad both spatial dims by mirroring `pad` pixels around the edge (edge pixel not repeated).
///
/// Callers must ensure both sides exceed `pad`; see [`MIN_INPUT_SIZE`].
pub fn reflection_pad<B: Backend>(x: Tensor<B, 4>, pad: usize) -> Tensor<B, 4> {
    if pad == 0 {
        return x;
    }
    let [_, _, h, w] = x.dims();
    assert!(
        pad < h && pad < w,
        "Reflection padding of {pad} needs an image larger than {h}x{w}"
    );

    let reflect = move |len: usize| {
        let last = len as isize - 1;
        (0..len + 2 * pad).map(move |i| {
            let i = i as isize - pad as isize;
            let mirrored = if i < 0 {
                -i
            } else if i > last {
                2 * last - i
            } else {
                i
            };
            mirrored as usize
        })
    };

    let device = x.device();
    x.select(2, gather_indices::<B>(reflect(h), &device))
        .select(3, gather_indices::<B>(reflect(w), &device))
}

/// Convolution preceded by reflection padding, optionally preceded by nearest upsampling.
#[derive(Config, Debug)]
pub struct ConvLayerConfig {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    #[config(default = 1)]
    stride: usize,
    #[config(default = 1)]
    upsample: usize,
}

impl ConvLayerConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvLayer<B> {
        let conv2d = Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Valid)
        .with_bias(true)
        .init(device);

        let upsample = (self.upsample > 1).then(|| {
            let factor = self.upsample as f32;
            Interpolate2dConfig::new()
                .with_scale_factor(Some([factor, factor]))
                .with_mode(InterpolateMode::Nearest)
                .init()
        });

        ConvLayer {
            conv2d,
            pad: self.kernel_size / 2,
            upsample,
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvLayer<B: Backend> {
    conv2d: Conv2d<B>,
    pad: usize,
    upsample: Option<Interpolate2d>,
}

impl<B: Backend> ConvLayer<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.upsample {
            Some(upsample) => upsample.forward(x),
            None => x,
        };
        self.conv2d.forward(reflection_pad(x, self.pad))
    }
}

impl<B: Backend> NamedModule<B> for ConvLayer<B> {
    fn visit_named<V: ParamVisitor<B>>(&self, prefix: &str, visitor: &mut V) {
        self.conv2d.visit_named(&join_name(prefix, "conv2d"), visitor);
    }

    fn map_named<M: ParamMapper<B>>(mut self, prefix: &str, mapper: &mut M) -> Self {
        self.conv2d = self.conv2d.map_named(&join_name(prefix, "conv2d"), mapper);
        self
    }
}

#[derive(Config, Debug)]
pub struct ResidualBlockConfig {
    channels: usize,
}

impl ResidualBlockConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ResidualBlock<B> {
        let c = self.channels;
        ResidualBlock {
            conv1: ConvLayerConfig::new(c, c, 3).init(device),
            in1: InstanceNormConfig::new(c).init(device),
            conv2: ConvLayerConfig::new(c, c, 3).init(device),
            in2: InstanceNormConfig::new(c).init(device),
            relu: Relu::new(),
        }
    }
}

/// Two 3x3 conv + instance norm layers with an identity skip connection.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: ConvLayer<B>,
    in1: InstanceNorm<B>,
    conv2: ConvLayer<B>,
    in2: InstanceNorm<B>,
    relu: Relu,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.relu.forward(self.in1.forward(self.conv1.forward(x.clone())));
        let out = self.in2.forward(self.conv2.forward(out));
        out + x
    }
}

impl<B: Backend> NamedModule<B> for ResidualBlock<B> {
    fn visit_named<V: ParamVisitor<B>>(&self, prefix: &str, visitor: &mut V) {
        self.conv1.visit_named(&join_name(prefix, "conv1"), visitor);
        self.in1.visit_named(&join_name(prefix, "in1"), visitor);
        self.conv2.visit_named(&join_name(prefix, "conv2"), visitor);
        self.in2.visit_named(&join_name(prefix, "in2"), visitor);
    }

    fn map_named<M: ParamMapper<B>>(mut self, prefix: &str, mapper: &mut M) -> Self {
        self.conv1 = self.conv1.map_named(&join_name(prefix, "conv1"), mapper);
        self.in1 = self.in1.map_named(&join_name(prefix, "in1"), mapper);
        self.conv2 = self.conv2.map_named(&join_name(prefix, "conv2"), mapper);
        self.in2 = self.in2.map_named(&join_name(prefix, "in2"), mapper);
        self
    }
}
