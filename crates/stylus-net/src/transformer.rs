use burn::{
    config::Config,
    module::Module,
    nn::{InstanceNorm, InstanceNormConfig, Relu},
    prelude::Backend,
    tensor::{Device, Tensor},
};
use stylus_serde::{NamedModule, ParamMapper, ParamVisitor, join_name};

use crate::layers::{ConvLayer, ConvLayerConfig, ResidualBlock, ResidualBlockConfig};

#[derive(Config, Debug)]
pub struct TransformerNetConfig {
    #[config(default = 5)]
    num_residual: usize,
}

impl TransformerNetConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> TransformerNet<B> {
        TransformerNet {
            conv1: ConvLayerConfig::new(3, 32, 9).init(device),
            in1: InstanceNormConfig::new(32).init(device),
            conv2: ConvLayerConfig::new(32, 64, 3).with_stride(2).init(device),
            in2: InstanceNormConfig::new(64).init(device),
            conv3: ConvLayerConfig::new(64, 128, 3).with_stride(2).init(device),
            in3: InstanceNormConfig::new(128).init(device),
            residuals: (0..self.num_residual)
                .map(|_| ResidualBlockConfig::new(128).init(device))
                .collect(),
            deconv1: ConvLayerConfig::new(128, 64, 3)
                .with_upsample(2)
                .init(device),
            in4: InstanceNormConfig::new(64).init(device),
            deconv2: ConvLayerConfig::new(64, 32, 3)
                .with_upsample(2)
                .init(device),
            in5: InstanceNormConfig::new(32).init(device),
            deconv3: ConvLayerConfig::new(32, 3, 9).init(device),
            relu: Relu::new(),
        }
    }
}

/// Feed forward style network: a strided encoder, a stack of residual blocks and an
/// upsampling decoder. Output has the input's spatial size when it is divisible by 4.
#[derive(Module, Debug)]
pub struct TransformerNet<B: Backend> {
    conv1: ConvLayer<B>,
    in1: InstanceNorm<B>,
    conv2: ConvLayer<B>,
    in2: InstanceNorm<B>,
    conv3: ConvLayer<B>,
    in3: InstanceNorm<B>,
    residuals: Vec<ResidualBlock<B>>,
    deconv1: ConvLayer<B>,
    in4: InstanceNorm<B>,
    deconv2: ConvLayer<B>,
    in5: InstanceNorm<B>,
    deconv3: ConvLayer<B>,
    relu: Relu,
}

impl<B: Backend> TransformerNet<B> {
    /// Stylize a `N×3×H×W` batch in the [0, 255] convention. Output values are not clamped.
    pub fn forward(&self, content: Tensor<B, 4>) -> Tensor<B, 4> {
        let _span = tracing::trace_span!("TransformerNet::forward").entered();

        let x = self.relu.forward(self.in1.forward(self.conv1.forward(content)));
        let x = self.relu.forward(self.in2.forward(self.conv2.forward(x)));
        let mut x = self.relu.forward(self.in3.forward(self.conv3.forward(x)));
        for block in &self.residuals {
            x = block.forward(x);
        }
        let x = self.relu.forward(self.in4.forward(self.deconv1.forward(x)));
        let x = self.relu.forward(self.in5.forward(self.deconv2.forward(x)));
        self.deconv3.forward(x)
    }
}

impl<B: Backend> NamedModule<B> for TransformerNet<B> {
    fn visit_named<V: ParamVisitor<B>>(&self, prefix: &str, visitor: &mut V) {
        let name = |n: &str| join_name(prefix, n);
        self.conv1.visit_named(&name("conv1"), visitor);
        self.in1.visit_named(&name("in1"), visitor);
        self.conv2.visit_named(&name("conv2"), visitor);
        self.in2.visit_named(&name("in2"), visitor);
        self.conv3.visit_named(&name("conv3"), visitor);
        self.in3.visit_named(&name("in3"), visitor);
        for (i, block) in self.residuals.iter().enumerate() {
            block.visit_named(&name(&format!("res{}", i + 1)), visitor);
        }
        self.deconv1.visit_named(&name("deconv1"), visitor);
        self.in4.visit_named(&name("in4"), visitor);
        self.deconv2.visit_named(&name("deconv2"), visitor);
        self.in5.visit_named(&name("in5"), visitor);
        self.deconv3.visit_named(&name("deconv3"), visitor);
    }

    fn map_named<M: ParamMapper<B>>(mut self, prefix: &str, mapper: &mut M) -> Self {
        let name = |n: &str| join_name(prefix, n);
        self.conv1 = self.conv1.map_named(&name("conv1"), mapper);
        self.in1 = self.in1.map_named(&name("in1"), mapper);
        self.conv2 = self.conv2.map_named(&name("conv2"), mapper);
        self.in2 = self.in2.map_named(&name("in2"), mapper);
        self.conv3 = self.conv3.map_named(&name("conv3"), mapper);
        self.in3 = self.in3.map_named(&name("in3"), mapper);
        self.residuals = self
            .residuals
            .into_iter()
            .enumerate()
            .map(|(i, block)| block.map_named(&name(&format!("res{}", i + 1)), mapper))
            .collect();
        self.deconv1 = self.deconv1.map_named(&name("deconv1"), mapper);
        self.in4 = self.in4.map_named(&name("in4"), mapper);
        self.deconv2 = self.deconv2.map_named(&name("deconv2"), mapper);
        self.in5 = self.in5.map_named(&name("in5"), mapper);
        self.deconv3 = self.deconv3.map_named(&name("deconv3"), mapper);
        self
    }
}
