//! The perceptual objective: content, style and smoothness terms.
//!
//! Everything here is a pure function of tensors, so it works on any backend
//! and stays differentiable when run on an autodiff one.

use crate::extractor::{Activations, FeatureExtractor, LayerSelection};
use crate::{Error, ShapeMismatch};
use burn::tensor::{backend::Backend, ElementConversion, Tensor};

/// Relative influence of each term of the objective.
///
/// The raw terms live on very different scales (Gram entries grow with the
/// square of the activations), so the defaults differ by several orders of
/// magnitude to bring them to comparable weighted magnitudes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LossWeights {
    pub content: f32,
    pub style: f32,
    pub total_variation: f32,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            content: 1e4,
            style: 1e-2,
            total_variation: 30.0,
        }
    }
}

fn check_shape(
    tensor: &'static str,
    layer: &str,
    expected: &[usize],
    actual: &[usize],
) -> Result<(), ShapeMismatch> {
    if expected == actual {
        Ok(())
    } else {
        Err(ShapeMismatch {
            tensor,
            layer: layer.to_owned(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

/// Channel correlations of a `[1, channels, height, width]` activation,
/// normalized by the number of spatial locations.
pub fn gram_matrix<B: Backend>(activation: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, height, width] = activation.dims();
    let locations = batch * height * width;

    let features = activation.swap_dims(0, 1).reshape([channels, locations]);
    features
        .clone()
        .matmul(features.transpose())
        .div_scalar(locations as f32)
}

/// Mean squared error between the generated and target activations at the
/// content layer.
pub fn content_loss<B: Backend>(
    generated: Tensor<B, 4>,
    target: Tensor<B, 4>,
    layer: &str,
) -> Result<Tensor<B, 1>, ShapeMismatch> {
    check_shape(
        "generated content activation",
        layer,
        &target.dims(),
        &generated.dims(),
    )?;

    Ok((generated - target).powf_scalar(2.0).mean())
}

/// Mean squared error between the Gram matrix of `generated` and a
/// precomputed target Gram matrix.
pub fn style_loss<B: Backend>(
    generated: Tensor<B, 4>,
    target_gram: Tensor<B, 2>,
    layer: &str,
) -> Result<Tensor<B, 1>, ShapeMismatch> {
    let gram = gram_matrix(generated);
    check_shape(
        "generated style Gram matrix",
        layer,
        &target_gram.dims(),
        &gram.dims(),
    )?;

    Ok((gram - target_gram).powf_scalar(2.0).mean())
}

/// Mean absolute difference between vertically adjacent pixels plus the same
/// for horizontally adjacent pixels.
pub fn total_variation_loss<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 1> {
    let [batch, channels, height, width] = image.dims();
    let mut loss = Tensor::zeros([1], &image.device());

    if height > 1 {
        let below = image
            .clone()
            .slice([0..batch, 0..channels, 1..height, 0..width]);
        let above = image
            .clone()
            .slice([0..batch, 0..channels, 0..height - 1, 0..width]);
        loss = loss + (below - above).abs().mean();
    }

    if width > 1 {
        let right = image
            .clone()
            .slice([0..batch, 0..channels, 0..height, 1..width]);
        let left = image.slice([0..batch, 0..channels, 0..height, 0..width - 1]);
        loss = loss + (right - left).abs().mean();
    }

    loss
}

/// The terms of one evaluation of the objective, still attached to the
/// autodiff graph when computed on an autodiff backend.
#[derive(Clone, Debug)]
pub struct LossTerms<B: Backend> {
    pub content: Tensor<B, 1>,
    /// Style loss averaged over the style layers
    pub style: Tensor<B, 1>,
    pub total_variation: Tensor<B, 1>,
    /// The weighted sum that is minimized
    pub total: Tensor<B, 1>,
}

impl<B: Backend> LossTerms<B> {
    /// Reads the terms back as plain numbers
    pub fn report(&self) -> LossReport {
        fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f32 {
            t.clone().into_scalar().elem::<f32>()
        }

        LossReport {
            content: scalar(&self.content),
            style: scalar(&self.style),
            total_variation: scalar(&self.total_variation),
            total: scalar(&self.total),
        }
    }
}

/// Unweighted loss terms plus the weighted total, for reporting
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LossReport {
    pub content: f32,
    pub style: f32,
    pub total_variation: f32,
    pub total: f32,
}

/// Everything a single optimization step compares against: the fixed targets
/// computed once from the inputs, the layers they belong to, and the weights
/// of each term.
pub struct Objective<B: Backend> {
    weights: LossWeights,
    layers: LayerSelection,
    content_target: Tensor<B, 4>,
    style_targets: Vec<(String, Tensor<B, 2>)>,
}

impl<B: Backend> Objective<B> {
    /// Runs the content and style images through the extractor once and keeps
    /// the detached targets for the rest of the run.
    pub fn new<E: FeatureExtractor<B>>(
        extractor: &E,
        content: Tensor<B, 4>,
        style: Tensor<B, 4>,
        layers: LayerSelection,
        weights: LossWeights,
    ) -> Result<Self, Error> {
        extractor.check_layers(&layers)?;

        let content_acts = extractor.extract(content.detach(), &layers)?;
        let content_target = content_acts.get(&layers.content)?.clone().detach();

        let style_acts = extractor.extract(style.detach(), &layers)?;
        let style_targets = layers
            .style
            .iter()
            .map(|layer| {
                let act = style_acts.get(layer)?.clone().detach();
                Ok((layer.clone(), gram_matrix(act)))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        log::debug!(
            "computed content target at '{}' {:?} and {} style targets",
            layers.content,
            content_target.dims(),
            style_targets.len()
        );

        Ok(Self {
            weights,
            layers,
            content_target,
            style_targets,
        })
    }

    pub fn weights(&self) -> &LossWeights {
        &self.weights
    }

    pub fn layers(&self) -> &LayerSelection {
        &self.layers
    }

    pub fn content_target(&self) -> &Tensor<B, 4> {
        &self.content_target
    }

    pub fn style_targets(&self) -> &[(String, Tensor<B, 2>)] {
        &self.style_targets
    }

    /// Combines the terms for the activations of `image` into the weighted
    /// objective.
    pub fn evaluate(
        &self,
        activations: &Activations<B>,
        image: Tensor<B, 4>,
    ) -> Result<LossTerms<B>, Error> {
        let content = content_loss(
            activations.get(&self.layers.content)?.clone(),
            self.content_target.clone(),
            &self.layers.content,
        )?;

        let mut style = Tensor::zeros([1], &image.device());
        for (layer, target) in &self.style_targets {
            style = style + style_loss(activations.get(layer)?.clone(), target.clone(), layer)?;
        }
        if !self.style_targets.is_empty() {
            style = style.div_scalar(self.style_targets.len() as f32);
        }

        let total_variation = total_variation_loss(image);

        let total = content.clone().mul_scalar(self.weights.content)
            + style.clone().mul_scalar(self.weights.style)
            + total_variation.clone().mul_scalar(self.weights.total_variation);

        Ok(LossTerms {
            content,
            style,
            total_variation,
            total,
        })
    }
}
