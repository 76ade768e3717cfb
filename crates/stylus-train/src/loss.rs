use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::Backend,
    tensor::{Tensor, s},
};

/// Channel correlations of a `b×c×h×w` feature map, normalized by `c·h·w`. Returns `b×c×c`.
pub fn gram_matrix<B: Backend>(features: Tensor<B, 4>) -> Tensor<B, 3> {
    let [b, c, h, w] = features.dims();
    let features = features.reshape([b, c, h * w]);
    let transposed = features.clone().swap_dims(1, 2);
    features.matmul(transposed) / (c * h * w) as f32
}

/// Weighted MSE between the features of the stylized and the original batch at `layer`.
///
/// Panics if `layer` is out of range for either feature list.
pub fn content_loss<B: Backend>(
    features_y: &[Tensor<B, 4>],
    features_x: &[Tensor<B, 4>],
    layer: usize,
    weight: f32,
) -> Tensor<B, 1> {
    MseLoss::new().forward(
        features_y[layer].clone(),
        features_x[layer].clone(),
        Reduction::Mean,
    ) * weight
}

/// Weighted sum over layers of the MSE between Gram matrices and the style targets.
///
/// Targets are computed for a full batch. A smaller (trailing) batch uses the leading slice.
///
/// Panics if there are no layers or the target count doesn't match.
pub fn style_loss<B: Backend>(
    features_y: &[Tensor<B, 4>],
    gram_targets: &[Tensor<B, 3>],
    weight: f32,
) -> Tensor<B, 1> {
    assert_eq!(
        features_y.len(),
        gram_targets.len(),
        "Need one style target per feature layer"
    );
    assert!(!features_y.is_empty(), "Style loss needs at least one layer");
    let mse = MseLoss::new();
    let device = features_y[0].device();

    features_y
        .iter()
        .zip(gram_targets)
        .map(|(feature, target)| {
            let n = feature.dims()[0];
            let gram = gram_matrix(feature.clone());
            mse.forward(gram, target.clone().slice(s![0..n]), Reduction::Mean)
        })
        .fold(Tensor::zeros([1], &device), |acc, layer| acc + layer)
        * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use burn::{
        backend::NdArray,
        tensor::{Distribution, ElementConversion},
    };

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn gram_is_symmetric_with_nonnegative_diagonal() {
        let device = Default::default();
        let features =
            Tensor::<TestBackend, 4>::random([2, 5, 4, 3], Distribution::Normal(0.0, 1.0), &device);
        let gram = gram_matrix(features);
        assert_eq!(gram.dims(), [2, 5, 5]);

        let data = gram.into_data().to_vec::<f32>().expect("f32");
        for b in 0..2 {
            for i in 0..5 {
                assert!(data[b * 25 + i * 5 + i] >= 0.0);
                for j in 0..5 {
                    assert_approx_eq!(data[b * 25 + i * 5 + j], data[b * 25 + j * 5 + i], 1e-5);
                }
            }
        }
    }

    #[test]
    fn gram_is_normalized_by_size() {
        let device = Default::default();
        // A single channel of ones: sum of squares h*w, divided by c*h*w = h*w.
        let features = Tensor::<TestBackend, 4>::ones([1, 1, 4, 4], &device);
        let gram = gram_matrix(features).into_data().to_vec::<f32>().expect("f32");
        assert_eq!(gram, [1.0]);
    }

    #[test]
    fn content_loss_of_identical_features_is_zero() {
        let device = Default::default();
        let features: Vec<_> = (0..4)
            .map(|_| {
                Tensor::<TestBackend, 4>::random(
                    [2, 3, 4, 4],
                    Distribution::Uniform(0.0, 1.0),
                    &device,
                )
            })
            .collect();
        assert_eq!(scalar(content_loss(&features, &features, 1, 1e5)), 0.0);
    }

    #[test]
    fn style_loss_of_reference_is_zero() {
        let device = Default::default();
        let features: Vec<_> = (0..4)
            .map(|_| {
                Tensor::<TestBackend, 4>::random(
                    [2, 3, 4, 4],
                    Distribution::Uniform(0.0, 1.0),
                    &device,
                )
            })
            .collect();
        let targets: Vec<_> = features.iter().cloned().map(gram_matrix).collect();
        assert_approx_eq!(scalar(style_loss(&features, &targets, 1e10)), 0.0, 1e-3);
    }

    #[test]
    fn style_loss_slices_targets_for_partial_batch() {
        let device = Default::default();
        let full =
            Tensor::<TestBackend, 4>::random([4, 3, 4, 4], Distribution::Uniform(0.0, 1.0), &device);
        let targets = vec![gram_matrix(full.clone())];

        // The first image of the reference batch matches the first target exactly.
        let partial = vec![full.slice(s![0..1])];
        let loss = style_loss(&partial, &targets, 1.0);
        assert_approx_eq!(scalar(loss), 0.0, 1e-6);
    }

    #[test]
    fn style_loss_stays_on_feature_device() {
        let device = Default::default();
        let features = vec![Tensor::<TestBackend, 4>::ones([1, 2, 2, 2], &device)];
        let targets = vec![Tensor::<TestBackend, 3>::zeros([1, 2, 2], &device)];
        let loss = style_loss(&features, &targets, 2.0);
        assert_eq!(loss.device(), device);
        // Every Gram entry is h*w / (c*h*w) = 0.5, so the MSE is 0.25.
        assert_approx_eq!(scalar(loss), 0.5, 1e-6);
    }

    #[test]
    #[should_panic(expected = "at least one layer")]
    fn style_loss_needs_layers() {
        style_loss::<TestBackend>(&[], &[], 1.0);
    }

    #[test]
    fn weights_scale_losses() {
        let device = Default::default();
        let a = vec![Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device)];
        let b = vec![Tensor::<TestBackend, 4>::ones([1, 1, 2, 2], &device)];
        assert_approx_eq!(scalar(content_loss(&a, &b, 0, 1.0)), 1.0, 1e-6);
        assert_approx_eq!(scalar(content_loss(&a, &b, 0, 3.0)), 3.0, 1e-6);
    }
}
