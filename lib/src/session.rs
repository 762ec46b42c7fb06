use crate::*;
use burn::tensor::backend::AutodiffBackend;

/// Style transfer session.
///
/// Calling `run()` will optimize a new image and return it, consuming the
/// session in the process. You can provide a `TransferProgress`
/// implementation to get an update after every iteration with the current
/// loss and, if enabled, a preview of the image.
///
/// # Example
/// ```no_run
/// use burn::backend::{Autodiff, NdArray};
/// use neural_style::{Session, Vgg19, Vgg19Config};
///
/// type B = Autodiff<NdArray<f32>>;
///
/// let device = Default::default();
/// let vgg = Vgg19::<B>::load("weights/vgg19.mpk", &Vgg19Config::new(), &device)
///     .expect("failed to load weights");
///
/// let session = Session::builder()
///     .content(&"imgs/tom.jpg")
///     .style(&"imgs/starry.jpg")
///     .iterations(200)
///     .build().expect("failed to build session");
///
/// let generated = session.run::<B, _>(&vgg, &device, None).expect("style transfer failed");
/// generated.save("out/tom_starry.jpg").expect("failed to save image");
/// ```
pub struct Session {
    content: image::RgbImage,
    style: image::RgbImage,
    params: TransferParams,
    cancel: Option<CancelToken>,
}

impl Session {
    /// Creates a new session with default parameters.
    pub fn builder<'a>() -> SessionBuilder<'a> {
        SessionBuilder::default()
    }

    /// The decoded and resized content image
    pub fn content(&self) -> &image::RgbImage {
        &self.content
    }

    /// The decoded and resized style image
    pub fn style(&self) -> &image::RgbImage {
        &self.style
    }

    pub fn params(&self) -> &TransferParams {
        &self.params
    }

    /// Runs the optimization on `device` with the given frozen feature
    /// extractor and returns the deprocessed result.
    pub fn run<B, E>(
        self,
        extractor: &E,
        device: &B::Device,
        mut progress: Option<Box<dyn TransferProgress>>,
    ) -> Result<GeneratedImage, Error>
    where
        B: AutodiffBackend,
        E: FeatureExtractor<B>,
    {
        let norm = self.params.normalization;
        let content = codec::encode::<B>(&self.content, &norm, device);
        let style = codec::encode::<B>(&self.style, &norm, device);

        let optim = transfer::adam::<B>(self.params.adam_epsilon);
        let mut transfer = StyleTransfer::new(extractor, content, style, self.params, optim)?;
        if let Some(token) = self.cancel {
            transfer = transfer.with_cancel_token(token);
        }

        let termination = match progress.as_mut() {
            Some(progress) => {
                let progress: &mut dyn TransferProgress = &mut **progress;
                transfer.run(Some(progress))?
            }
            None => transfer.run(None)?,
        };

        Ok(GeneratedImage {
            image: transfer.deprocess()?,
            termination,
            iterations: transfer.iteration(),
            history: transfer.history().to_vec(),
        })
    }
}

/// Builds a session by setting parameters and adding input images, calling
/// `build` will decode the inputs and check the parameters before any
/// optimization work starts
#[derive(Default)]
pub struct SessionBuilder<'a> {
    content: Option<ImageSource<'a>>,
    style: Option<ImageSource<'a>>,
    resolution: Option<Dims>,
    params: TransferParams,
    cancel: Option<CancelToken>,
}

impl<'a> SessionBuilder<'a> {
    /// Creates a new `SessionBuilder`, can also be created via
    /// `Session::builder()`
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image whose spatial content is preserved.
    pub fn content<I: Into<ImageSource<'a>>>(mut self, img: I) -> Self {
        self.content = Some(img.into());
        self
    }

    /// Sets the image whose texture statistics are transferred.
    pub fn style<I: Into<ImageSource<'a>>>(mut self, img: I) -> Self {
        self.style = Some(img.into());
        self
    }

    /// The resolution both inputs are resized to, which is also the size of
    /// the generated image.
    ///
    /// Default: 512x512
    pub fn resolution(mut self, dims: Dims) -> Self {
        self.resolution = Some(dims);
        self
    }

    /// Sets all three loss weights at once.
    pub fn weights(mut self, weights: LossWeights) -> Self {
        self.params.weights = weights;
        self
    }

    /// How strongly the generated image must keep the content image's
    /// activations at the content layer.
    ///
    /// Default: 1e4
    pub fn content_weight(mut self, weight: f32) -> Self {
        self.params.weights.content = weight;
        self
    }

    /// How strongly the generated image must match the style image's Gram
    /// matrices. Gram entries are much larger than raw activations, hence the
    /// small default.
    ///
    /// Default: 1e-2
    pub fn style_weight(mut self, weight: f32) -> Self {
        self.params.weights.style = weight;
        self
    }

    /// Weight of the total variation term, larger values give smoother
    /// images with less high frequency noise.
    ///
    /// Default: 30
    pub fn tv_weight(mut self, weight: f32) -> Self {
        self.params.weights.total_variation = weight;
        self
    }

    /// The number of optimization iterations. The default is on the low side,
    /// results usually keep improving well past a few hundred iterations.
    ///
    /// Default: 50
    pub fn iterations(mut self, count: u32) -> Self {
        self.params.iterations = count;
        self
    }

    /// Adam learning rate, in pixel units.
    ///
    /// Default: 5.0
    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.params.learning_rate = rate;
        self
    }

    /// Adam's numerical stability term.
    ///
    /// Default: 1e-7
    pub fn adam_epsilon(mut self, epsilon: f32) -> Self {
        self.params.adam_epsilon = epsilon;
        self
    }

    /// The layers whose Gram matrices define the style, shallow to deep.
    ///
    /// Default: `block1_conv1` through `block5_conv1`
    pub fn style_layers<S: Into<String>, I: IntoIterator<Item = S>>(mut self, layers: I) -> Self {
        self.params.layers.style = layers.into_iter().map(Into::into).collect();
        self
    }

    /// The layer whose activations define the content.
    ///
    /// Default: `block5_conv2`
    pub fn content_layer<S: Into<String>>(mut self, layer: S) -> Self {
        self.params.layers.content = layer.into();
        self
    }

    /// Logs the loss every `n` iterations, as well as on the first and last.
    ///
    /// Default: 50
    pub fn log_every(mut self, n: u32) -> Self {
        self.params.log_every = n;
        self
    }

    /// Passes a deprocessed preview of the image to the progress callback
    /// every `n` iterations.
    ///
    /// Default: never
    pub fn preview_every(mut self, n: u32) -> Self {
        self.params.preview_every = Some(n);
        self
    }

    /// Stops before the iteration budget is exhausted if the total loss
    /// hasn't decreased by a relative `min_delta` in `patience` iterations.
    ///
    /// Default: disabled, every iteration of the budget runs
    pub fn stop_on_plateau(mut self, patience: u32, min_delta: f32) -> Self {
        self.params.plateau = Some(PlateauStop {
            patience,
            min_delta,
        });
        self
    }

    /// What the generated image starts from.
    ///
    /// Default: `InitialImage::Content`
    pub fn initial_image(mut self, init: InitialImage) -> Self {
        self.params.init = init;
        self
    }

    /// How pixels map into the network's input space, this must match what
    /// the extractor's weights were trained with.
    ///
    /// Default: `PixelNormalization::CAFFE`
    pub fn normalization(mut self, norm: PixelNormalization) -> Self {
        self.params.normalization = norm;
        self
    }

    /// A token that can stop the run between two iterations, from another
    /// thread for example.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Creates a `Session`, or returns an error if invalid parameters or input
    /// images were specified.
    pub fn build(self) -> Result<Session, Error> {
        self.check_parameters_validity()?;

        let dims = self.resolution.unwrap_or_else(|| Dims::square(512));

        let content = self.content.ok_or(Error::MissingInput(Input::Content))?;
        let style = self.style.ok_or(Error::MissingInput(Input::Style))?;

        let content = load_image(content, Input::Content, dims)?;
        let style = load_image(style, Input::Style, dims)?;

        Ok(Session {
            content,
            style,
            params: self.params,
            cancel: self.cancel,
        })
    }

    fn check_parameters_validity(&self) -> Result<(), Error> {
        let params = &self.params;

        let weights = [
            (params.weights.content, "content-weight"),
            (params.weights.style, "style-weight"),
            (params.weights.total_variation, "tv-weight"),
        ];

        for &(value, name) in weights.iter() {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(Error::InvalidRange(errors::InvalidRange {
                    min: 0.0,
                    max: f32::MAX,
                    value,
                    name,
                }));
            }
        }

        if !(params.learning_rate > 0.0 && params.learning_rate.is_finite()) {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: f32::EPSILON,
                max: f32::MAX,
                value: params.learning_rate as f32,
                name: "learning-rate",
            }));
        }

        if !(params.adam_epsilon > 0.0) {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: f32::MIN_POSITIVE,
                max: 1.0,
                value: params.adam_epsilon,
                name: "adam-epsilon",
            }));
        }

        if let Some(dims) = self.resolution {
            if dims.width == 0 || dims.height == 0 {
                return Err(Error::InvalidRange(errors::InvalidRange {
                    min: 1.0,
                    max: 16384.0,
                    value: dims.width.min(dims.height) as f32,
                    name: "resolution",
                }));
            }
        }

        if params.layers.style.is_empty() {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: 16.0,
                value: 0.0,
                name: "style-layers",
            }));
        }

        if params.log_every == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: u32::MAX as f32,
                value: 0.0,
                name: "log-every",
            }));
        }

        if let Some(plateau) = params.plateau {
            if plateau.patience == 0 {
                return Err(Error::InvalidRange(errors::InvalidRange {
                    min: 1.0,
                    max: u32::MAX as f32,
                    value: 0.0,
                    name: "plateau-patience",
                }));
            }

            if plateau.min_delta < 0.0 || plateau.min_delta >= 1.0 {
                return Err(Error::InvalidRange(errors::InvalidRange {
                    min: 0.0,
                    max: 1.0,
                    value: plateau.min_delta,
                    name: "plateau-min-delta",
                }));
            }
        }

        Ok(())
    }
}

/// Helper struct for passing progress information to external callers
pub struct ProgressStat {
    /// The current amount of work that has been done
    pub current: usize,
    /// The total amount of work to do
    pub total: usize,
}

/// The state of the optimization after one iteration
pub struct ProgressUpdate<'a> {
    /// Completed iterations out of the budget
    pub iteration: ProgressStat,
    /// The loss of the iteration that just completed
    pub loss: LossReport,
    /// The current image, only on iterations a preview was requested for
    pub preview: Option<&'a image::RgbImage>,
}

/// Allows the optimization loop to update external callers with the current
/// progress of the style transfer
pub trait TransferProgress {
    fn update(&mut self, info: ProgressUpdate<'_>);
}

impl<G> TransferProgress for G
where
    G: FnMut(ProgressUpdate<'_>) + Send,
{
    fn update(&mut self, info: ProgressUpdate<'_>) {
        self(info)
    }
}
