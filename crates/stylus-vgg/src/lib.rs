#![recursion_limit = "256"]

use burn::nn::Initializer;
use burn::nn::PaddingConfig2d;
use burn::nn::Relu;
use burn::nn::conv::Conv2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::MaxPool2d;
use burn::nn::pool::MaxPool2dConfig;
use burn::tensor::Device;
use burn::{
    config::Config,
    module::Module,
    tensor::{Tensor, backend::Backend},
};
use std::f64::consts::SQRT_2;
use std::path::Path;
use stylus_serde::{CheckpointError, NamedModule, ParamMapper, ParamVisitor, StateDict};

/// Produces the intermediate activations used by the perceptual losses.
///
/// Implementations are frozen: they never receive gradient updates.
pub trait FeatureExtractor<B: Backend> {
    /// Feature maps of the monitored layers, shallowest first. Input must be mean/std normalized.
    fn features(&self, batch: Tensor<B, 4>) -> Vec<Tensor<B, 4>>;

    /// Index into [`FeatureExtractor::features`] used for the content loss.
    fn content_layer(&self) -> usize;
}

/// Smallest image side that survives the three 2x2 pools in front of `relu4_3`.
pub const MIN_INPUT_SIZE: usize = 8;

/// Index of each conv layer in torchvision's `vgg16().features`, per block.
const TORCHVISION_CONV_INDICES: [&[usize]; 4] = [&[0, 2], &[5, 7], &[10, 12, 14], &[17, 19, 21]];

struct ConvReluConfig {
    conv: Conv2dConfig,
}

impl ConvReluConfig {
    fn new(in_channels: usize, out_channels: usize) -> Self {
        // conv3x3
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(true);
        Self { conv }
    }

    fn init<B: Backend>(&self, device: &Device<B>) -> ConvRelu<B> {
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        ConvRelu {
            conv: self.conv.clone().with_initializer(initializer).init(device),
            relu: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvRelu<B: Backend> {
    conv: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> ConvRelu<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.relu.forward(out)
    }
}

#[derive(Config, Debug)]
struct VggBlockConfig {
    num_convs: usize,
    in_channels: usize,
    out_channels: usize,
}

impl VggBlockConfig {
    fn init<B: Backend>(&self, device: &Device<B>) -> VggBlock<B> {
        let convs = (0..self.num_convs)
            .map(|b| {
                ConvReluConfig::new(
                    if b == 0 {
                        self.in_channels
                    } else {
                        self.out_channels
                    },
                    self.out_channels,
                )
                .init(device)
            })
            .collect();

        VggBlock { convs }
    }
}

#[derive(Module, Debug)]
struct VggBlock<B: Backend> {
    convs: Vec<ConvRelu<B>>,
}

impl<B: Backend> VggBlock<B> {
    pub(crate) fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut cur = input;
        for conv in &self.convs {
            cur = conv.forward(cur);
        }
        cur
    }
}

/// The first four blocks of VGG-16, producing `relu1_2`, `relu2_2`, `relu3_3` and `relu4_3`.
#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    blocks: Vec<VggBlock<B>>,
    max_pool: MaxPool2d,
}

impl<B: Backend> Vgg16<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut fold = input;
        let mut res = Vec::with_capacity(self.blocks.len());
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                fold = self.max_pool.forward(fold);
            }
            fold = block.forward(fold);
            res.push(fold.clone());
        }
        res
    }

    /// Load pretrained weights stored with torchvision names (`features.<idx>.weight`).
    /// Layers deeper than `relu4_3` are ignored. The returned module never tracks gradients.
    pub fn load_pretrained(path: &Path, device: &B::Device) -> Result<Self, CheckpointError> {
        let model = Vgg16Config::new().init::<B>(device);
        let mut dict = StateDict::read(path)?;

        let expected = model.param_names();
        let skipped = dict.remove_matching(|k| !expected.contains(k));
        if !skipped.is_empty() {
            log::info!(
                "Ignoring {} VGG entries past relu4_3 in {}",
                skipped.len(),
                path.display()
            );
        }

        Ok(model.load_state_dict(dict)?.no_grad())
    }
}

impl<B: Backend> FeatureExtractor<B> for Vgg16<B> {
    fn features(&self, batch: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        self.forward(batch)
    }

    fn content_layer(&self) -> usize {
        // relu2_2
        1
    }
}

impl<B: Backend> NamedModule<B> for Vgg16<B> {
    fn visit_named<V: ParamVisitor<B>>(&self, prefix: &str, visitor: &mut V) {
        for (block, indices) in self.blocks.iter().zip(TORCHVISION_CONV_INDICES) {
            for (conv, idx) in block.convs.iter().zip(indices) {
                let name = stylus_serde::join_name(prefix, &format!("features.{idx}"));
                conv.conv.visit_named(&name, visitor);
            }
        }
    }

    fn map_named<M: ParamMapper<B>>(mut self, prefix: &str, mapper: &mut M) -> Self {
        self.blocks = self
            .blocks
            .into_iter()
            .zip(TORCHVISION_CONV_INDICES)
            .map(|(mut block, indices)| {
                block.convs = block
                    .convs
                    .into_iter()
                    .zip(indices)
                    .map(|(mut conv, idx)| {
                        let name = stylus_serde::join_name(prefix, &format!("features.{idx}"));
                        conv.conv = conv.conv.map_named(&name, mapper);
                        conv
                    })
                    .collect();
                block
            })
            .collect();
        self
    }
}

#[derive(Config, Debug)]
pub struct Vgg16Config {}

impl Vgg16Config {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16<B> {
        let block1 = VggBlockConfig::new(2, 3, 64).init(device);
        let block2 = VggBlockConfig::new(2, 64, 128).init(device);
        let block3 = VggBlockConfig::new(3, 128, 256).init(device);
        let block4 = VggBlockConfig::new(3, 256, 512).init(device);

        Vgg16 {
            blocks: vec![block1, block2, block3, block4],
            max_pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn produces_four_feature_maps() {
        let device = Default::default();
        let vgg = Vgg16Config::new().init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        let features = vgg.features(input);

        let dims: Vec<_> = features.iter().map(|f| f.dims()).collect();
        assert_eq!(
            dims,
            [
                [2, 64, 16, 16],
                [2, 128, 8, 8],
                [2, 256, 4, 4],
                [2, 512, 2, 2]
            ]
        );
        assert_eq!(vgg.content_layer(), 1);
    }

    #[test]
    fn smallest_input_reaches_deepest_layer() {
        let device = Default::default();
        let vgg = Vgg16Config::new().init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, MIN_INPUT_SIZE, MIN_INPUT_SIZE], &device);
        let features = vgg.features(input);
        assert_eq!(features[3].dims(), [1, 512, 1, 1]);
    }

    #[test]
    fn config_is_printable() {
        let config = Vgg16Config::new();
        assert!(format!("{config:?}").starts_with("Vgg16Config"));
        assert!(format!("{:?}", VggBlockConfig::new(2, 3, 64)).contains("out_channels: 64"));
    }

    #[test]
    fn uses_torchvision_names() {
        let vgg = Vgg16Config::new().init::<TestBackend>(&Default::default());
        let names = vgg.param_names();
        assert_eq!(names.len(), 20);
        assert!(names.contains("features.0.weight"));
        assert!(names.contains("features.21.bias"));
        assert!(!names.contains("features.24.weight"));
    }

    #[test]
    fn load_pretrained_skips_deeper_layers() {
        let device = Default::default();
        let source = Vgg16Config::new().init::<TestBackend>(&device);
        let mut dict = source.to_state_dict();
        dict.insert(
            "features.24.weight",
            burn::tensor::TensorData::new(vec![0.0f32; 4], [1, 1, 2, 2]),
        );
        dict.insert(
            "classifier.0.bias",
            burn::tensor::TensorData::new(vec![0.0f32; 2], [2]),
        );

        let path = std::env::temp_dir().join("stylus-vgg-load-test.safetensors");
        dict.write(&path).expect("Failed to write weights");

        let loaded = Vgg16::<TestBackend>::load_pretrained(&path, &device).expect("Loadable");
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);
        let a = source.forward(input.clone())[3].clone().into_data();
        let b = loaded.forward(input)[3].clone().into_data();
        let a = a.to_vec::<f32>().expect("f32");
        let b = b.to_vec::<f32>().expect("f32");
        for (x, y) in a.iter().zip(&b) {
            assert_approx_eq!(*x, *y, 1e-4);
        }
    }

    #[test]
    fn load_pretrained_missing_file_is_not_found() {
        let res = Vgg16::<TestBackend>::load_pretrained(
            Path::new("/no/such/vgg16.safetensors"),
            &Default::default(),
        );
        assert!(matches!(res, Err(CheckpointError::NotFound(_))));
    }
}
