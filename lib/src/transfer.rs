//! The optimization loop that pulls an image toward the content and style
//! targets.

use crate::codec::{deprocess, PixelNormalization};
use crate::extractor::{FeatureExtractor, LayerSelection};
use crate::loss::{LossReport, LossWeights, Objective};
use crate::session::{ProgressStat, ProgressUpdate, TransferProgress};
use crate::{Error, ShapeMismatch};
use burn::module::{Module, Param};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// The image under optimization, wrapped as the single parameter of a module
/// so the optimizer can update it like any other weight.
#[derive(Module, Debug)]
pub struct Canvas<B: Backend> {
    pixels: Param<Tensor<B, 4>>,
}

impl<B: Backend> Canvas<B> {
    fn new(image: Tensor<B, 4>) -> Self {
        Self {
            pixels: Param::from_tensor(image),
        }
    }
}

/// Adam with the usual moment decay rates. The high default learning rate of
/// the transfer only works because of the per-pixel gradient scaling.
pub fn adam<B: AutodiffBackend>(epsilon: f32) -> impl Optimizer<Canvas<B>, B> {
    AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(epsilon)
        .init::<B, Canvas<B>>()
}

/// What the generated image starts out as
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitialImage {
    /// A copy of the content image, which converges the fastest
    Content,
    /// Uniform noise over the displayable range, reproducible from the seed
    Noise { seed: u64 },
}

impl Default for InitialImage {
    fn default() -> Self {
        Self::Content
    }
}

/// Stops the loop early once the total loss stops improving.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlateauStop {
    /// How many iterations without improvement are tolerated
    pub patience: u32,
    /// The relative decrease of the best loss that counts as an improvement
    pub min_delta: f32,
}

/// Why the loop stopped
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The iteration budget ran out
    Exhausted,
    /// The loss plateaued before the budget ran out
    Converged,
    /// The cancel token was triggered
    Cancelled,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferState {
    Initialized,
    Running,
    Finished(Termination),
}

/// A shareable flag that stops a running transfer between two iterations.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Every knob of a transfer run.
#[derive(Clone, Debug)]
pub struct TransferParams {
    pub weights: LossWeights,
    pub layers: LayerSelection,
    pub iterations: u32,
    pub learning_rate: f64,
    pub adam_epsilon: f32,
    /// Log the loss every n iterations, as well as at the first and last one
    pub log_every: u32,
    /// Deprocess the image for the progress callback every n iterations
    pub preview_every: Option<u32>,
    pub plateau: Option<PlateauStop>,
    pub init: InitialImage,
    pub normalization: PixelNormalization,
}

impl Default for TransferParams {
    fn default() -> Self {
        Self {
            weights: LossWeights::default(),
            layers: LayerSelection::default(),
            iterations: 50,
            learning_rate: 5.0,
            adam_epsilon: 1e-7,
            log_every: 50,
            preview_every: None,
            plateau: None,
            init: InitialImage::Content,
            normalization: PixelNormalization::CAFFE,
        }
    }
}

fn noise_image<B: Backend>(
    dims: [usize; 4],
    norm: &PixelNormalization,
    seed: u64,
    device: &B::Device,
) -> Tensor<B, 4> {
    use rand::{Rng, SeedableRng};

    let mut rng = rand_pcg::Pcg32::seed_from_u64(seed);
    let plane = dims[2] * dims[3];
    let data: Vec<f32> = (0..dims.iter().product::<usize>())
        .map(|i| {
            let (lo, hi) = norm.channel_range((i / plane) % 3);
            rng.gen_range(lo..hi)
        })
        .collect();

    Tensor::from_data(TensorData::new(data, dims), device)
}

/// The loss is logged on the first iteration, every `log_every` iterations
/// and on the last one.
fn logs_iteration(iteration: u32, log_every: u32, total: u32) -> bool {
    iteration % log_every.max(1) == 0 || iteration + 1 == total
}

/// A single style transfer run.
///
/// Creating one computes the style and content targets; every call to
/// [`step`](Self::step) then runs one forward pass, evaluates the objective,
/// backpropagates to the image and applies one optimizer update. A step
/// either completes fully or fails without touching the image.
pub struct StyleTransfer<'e, B, E, O>
where
    B: AutodiffBackend,
    E: FeatureExtractor<B>,
    O: Optimizer<Canvas<B>, B>,
{
    extractor: &'e E,
    objective: Objective<B>,
    canvas: Canvas<B>,
    optim: O,
    params: TransferParams,
    state: TransferState,
    iteration: u32,
    best_loss: f32,
    stale: u32,
    history: Vec<LossReport>,
    cancel: Option<CancelToken>,
}

impl<'e, B, E, O> StyleTransfer<'e, B, E, O>
where
    B: AutodiffBackend,
    E: FeatureExtractor<B>,
    O: Optimizer<Canvas<B>, B>,
{
    /// Validates the inputs and computes the fixed targets. `content` and
    /// `style` must be encoded at the same resolution.
    pub fn new(
        extractor: &'e E,
        content: Tensor<B, 4>,
        style: Tensor<B, 4>,
        params: TransferParams,
        optim: O,
    ) -> Result<Self, Error> {
        let content_dims = content.dims();
        let style_dims = style.dims();

        if content_dims[0] != 1 || content_dims[1] != 3 {
            return Err(ShapeMismatch {
                tensor: "content image",
                layer: "input".to_owned(),
                expected: vec![1, 3, content_dims[2], content_dims[3]],
                actual: content_dims.to_vec(),
            }
            .into());
        }

        if style_dims != content_dims {
            return Err(ShapeMismatch {
                tensor: "style image",
                layer: "input".to_owned(),
                expected: content_dims.to_vec(),
                actual: style_dims.to_vec(),
            }
            .into());
        }

        let initial = match params.init {
            InitialImage::Content => content.clone().detach(),
            InitialImage::Noise { seed } => {
                noise_image(content_dims, &params.normalization, seed, &content.device())
            }
        };

        let objective = Objective::new(
            extractor,
            content,
            style,
            params.layers.clone(),
            params.weights,
        )?;

        Ok(Self {
            extractor,
            objective,
            canvas: Canvas::new(initial),
            optim,
            params,
            state: TransferState::Initialized,
            iteration: 0,
            best_loss: f32::INFINITY,
            stale: 0,
            history: Vec::new(),
            cancel: None,
        })
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// The number of completed iterations
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn params(&self) -> &TransferParams {
        &self.params
    }

    pub fn objective(&self) -> &Objective<B> {
        &self.objective
    }

    /// The loss evaluated at every completed iteration, before its update
    pub fn history(&self) -> &[LossReport] {
        &self.history
    }

    /// The current generated image, in normalized tensor space
    pub fn image(&self) -> Tensor<B::InnerBackend, 4> {
        self.canvas.pixels.val().inner()
    }

    /// The current generated image, as displayable pixels
    pub fn deprocess(&self) -> Result<image::RgbImage, Error> {
        deprocess(self.image(), &self.params.normalization)
    }

    /// Runs one full iteration and returns the loss of the image as it was
    /// before the update.
    pub fn step(&mut self) -> Result<LossReport, Error> {
        let image = self.canvas.pixels.val();

        let activations = self
            .extractor
            .extract(image.clone(), self.objective.layers())?;
        let terms = self.objective.evaluate(&activations, image)?;

        let report = terms.report();
        if !report.total.is_finite() {
            return Err(Error::NonFiniteLoss {
                iteration: self.iteration,
            });
        }

        let grads = GradientsParams::from_grads(terms.total.backward(), &self.canvas);
        self.canvas = self
            .optim
            .step(self.params.learning_rate, self.canvas.clone(), grads);

        self.iteration += 1;
        self.history.push(report);
        self.state = TransferState::Running;

        Ok(report)
    }

    fn plateaued(&mut self, loss: f32) -> bool {
        let plateau = match self.params.plateau {
            Some(p) => p,
            None => return false,
        };

        let improved = !self.best_loss.is_finite()
            || loss < self.best_loss - self.best_loss.abs() * plateau.min_delta;

        if improved {
            self.best_loss = loss;
            self.stale = 0;
        } else {
            self.stale += 1;
        }

        self.stale >= plateau.patience
    }

    /// Runs the remaining iterations of the budget, stopping early on
    /// cancellation or, if enabled, on a loss plateau.
    pub fn run(
        &mut self,
        mut progress: Option<&mut dyn TransferProgress>,
    ) -> Result<Termination, Error> {
        if let TransferState::Finished(termination) = self.state {
            return Ok(termination);
        }

        let total = self.params.iterations;
        let log_every = self.params.log_every;

        log::info!(
            "running style transfer for {} iterations at learning rate {}",
            total,
            self.params.learning_rate
        );

        let termination = loop {
            if self.iteration >= total {
                break Termination::Exhausted;
            }

            if self.cancel.as_ref().map_or(false, CancelToken::is_cancelled) {
                break Termination::Cancelled;
            }

            let i = self.iteration;
            let report = self.step()?;

            if logs_iteration(i, log_every, total) {
                log::info!(
                    "iteration {}, loss: {} (content {}, style {}, total variation {})",
                    i,
                    report.total,
                    report.content,
                    report.style,
                    report.total_variation
                );
            }

            if let Some(progress) = progress.as_mut() {
                let preview = match self.params.preview_every {
                    Some(every) if every > 0 && (i + 1) % every == 0 => Some(self.deprocess()?),
                    _ => None,
                };

                progress.update(ProgressUpdate {
                    iteration: ProgressStat {
                        current: self.iteration as usize,
                        total: total as usize,
                    },
                    loss: report,
                    preview: preview.as_ref(),
                });
            }

            if self.plateaued(report.total) {
                break Termination::Converged;
            }
        };

        log::info!(
            "style transfer finished after {} iterations: {:?}",
            self.iteration,
            termination
        );

        self.state = TransferState::Finished(termination);
        Ok(termination)
    }
}
