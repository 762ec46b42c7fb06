use crate::Error;
use burn::tensor::{backend::Backend, Tensor};
use std::collections::HashMap;

/// The layers whose activations drive the optimization, by name.
///
/// Targets are always looked up by these names, never by position, so the
/// style and content sets can change independently of each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerSelection {
    /// Layers whose Gram matrices describe the style, shallow to deep
    pub style: Vec<String>,
    /// The single deep layer whose activations describe the content
    pub content: String,
}

impl LayerSelection {
    pub fn new<S: Into<String>>(style: impl IntoIterator<Item = S>, content: S) -> Self {
        Self {
            style: style.into_iter().map(Into::into).collect(),
            content: content.into(),
        }
    }

    /// Every layer that needs to be extracted, without duplicates
    pub fn all(&self) -> impl Iterator<Item = &str> {
        let content = if self.style.contains(&self.content) {
            None
        } else {
            Some(self.content.as_str())
        };

        self.style.iter().map(String::as_str).chain(content)
    }
}

impl Default for LayerSelection {
    fn default() -> Self {
        Self::new(
            vec![
                "block1_conv1",
                "block2_conv1",
                "block3_conv1",
                "block4_conv1",
                "block5_conv1",
            ],
            "block5_conv2",
        )
    }
}

/// Intermediate activations of a single forward pass, keyed by layer name.
#[derive(Debug)]
pub struct Activations<B: Backend> {
    maps: HashMap<String, Tensor<B, 4>>,
}

impl<B: Backend> Activations<B> {
    pub fn new() -> Self {
        Self {
            maps: HashMap::new(),
        }
    }

    pub fn insert(&mut self, layer: impl Into<String>, activation: Tensor<B, 4>) {
        self.maps.insert(layer.into(), activation);
    }

    pub fn get(&self, layer: &str) -> Result<&Tensor<B, 4>, Error> {
        self.maps
            .get(layer)
            .ok_or_else(|| Error::UnknownLayer(layer.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl<B: Backend> Default for Activations<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// A frozen network that exposes named intermediate activations.
///
/// Implementations must be deterministic and must not mutate themselves
/// between calls; the optimization only ever differentiates with respect to
/// the input tensor.
pub trait FeatureExtractor<B: Backend> {
    /// Every layer name this extractor can produce, in network order
    fn layer_names(&self) -> Vec<String>;

    /// Runs `input`, a `[1, 3, height, width]` normalized image, through the
    /// network and returns the activations of every layer in `layers`.
    fn extract(&self, input: Tensor<B, 4>, layers: &LayerSelection)
        -> Result<Activations<B>, Error>;

    /// Fails with `Error::UnknownLayer` for the first selected layer this
    /// extractor doesn't have.
    fn check_layers(&self, layers: &LayerSelection) -> Result<(), Error> {
        let names = self.layer_names();
        match layers.all().find(|l| !names.iter().any(|n| n == l)) {
            Some(missing) => Err(Error::UnknownLayer(missing.to_owned())),
            None => Ok(()),
        }
    }
}
