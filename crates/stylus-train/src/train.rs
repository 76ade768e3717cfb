use burn::{
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    prelude::Backend,
    tensor::{ElementConversion, Tensor, backend::AutodiffBackend},
};
use stylus_dataset::image_io::normalize_batch;
use stylus_net::TransformerNet;
use stylus_vgg::FeatureExtractor;
use tracing::trace_span;

use crate::{
    config::TrainConfig,
    loss::{content_loss, gram_matrix, style_loss},
    stats::StepStats,
};

/// Gram matrices of the style image repeated to a full batch, one per feature layer.
///
/// `style` is a single `1×3×H×W` image in the [0, 255] range.
pub fn style_targets<B: Backend, E: FeatureExtractor<B>>(
    extractor: &E,
    style: Tensor<B, 4>,
    batch_size: usize,
) -> Vec<Tensor<B, 3>> {
    let _span = trace_span!("Style targets").entered();
    let style = style.repeat_dim(0, batch_size);
    extractor
        .features(normalize_batch(style))
        .into_iter()
        .map(|f| gram_matrix(f).detach())
        .collect()
}

pub struct StyleTrainer<B: AutodiffBackend> {
    config: TrainConfig,
    gram_targets: Vec<Tensor<B, 3>>,
    optim: OptimizerAdaptor<Adam, TransformerNet<B>, B>,
}

impl<B: AutodiffBackend> StyleTrainer<B> {
    pub fn new(config: &TrainConfig, gram_targets: Vec<Tensor<B, 3>>) -> Self {
        Self {
            config: config.clone(),
            gram_targets,
            optim: AdamConfig::new().init(),
        }
    }

    pub fn gram_targets(&self) -> &[Tensor<B, 3>] {
        &self.gram_targets
    }

    /// One optimizer step on a `N×3×H×W` content batch. `N` may be smaller than the
    /// configured batch size for the last batch of an epoch, never larger.
    pub fn step<E: FeatureExtractor<B>>(
        &mut self,
        extractor: &E,
        model: TransformerNet<B>,
        batch: Tensor<B, 4>,
    ) -> (TransformerNet<B>, StepStats) {
        let batch_size = batch.dims()[0];
        assert!(
            batch_size <= self.config.batch_size,
            "Batch of {batch_size} images exceeds the batch size {}",
            self.config.batch_size
        );

        let stylized = trace_span!("Stylize batch").in_scope(|| model.forward(batch.clone()));

        let (content, style) = trace_span!("Perceptual losses").in_scope(|| {
            let features_y = extractor.features(normalize_batch(stylized));
            let features_x = extractor.features(normalize_batch(batch));
            let content = content_loss(
                &features_y,
                &features_x,
                extractor.content_layer(),
                self.config.content_weight,
            );
            let style = style_loss(&features_y, &self.gram_targets, self.config.style_weight);
            (content, style)
        });

        let total = content.clone() + style.clone();
        let grads = trace_span!("Backward pass").in_scope(|| total.backward());

        let model = trace_span!("Optimizer step").in_scope(|| {
            let grads = GradientsParams::from_grads(grads, &model);
            self.optim.step(self.config.learning_rate, model, grads)
        });

        let stats = StepStats {
            content_loss: content.into_scalar().elem::<f32>(),
            style_loss: style.into_scalar().elem::<f32>(),
            batch_size,
        };
        (model, stats)
    }
}
