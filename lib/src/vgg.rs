//! The VGG19 convolutional trunk, used as a frozen feature extractor.

use crate::errors::ExtractorLoadError;
use crate::extractor::{Activations, FeatureExtractor, LayerSelection};
use crate::Error;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::module::max_pool2d;
use burn::tensor::Tensor;
use std::path::Path;

/// Convolutions per block
const BLOCK_DEPTHS: [usize; 5] = [2, 2, 4, 4, 4];
/// Channel multiplier of each block relative to the configured width
const BLOCK_WIDTHS: [usize; 5] = [1, 2, 4, 8, 8];

#[derive(Config, Debug)]
pub struct Vgg19Config {
    /// Output channels of the first block. Later blocks double it, up to 8x.
    /// Pretrained weights require the standard width of 64.
    #[config(default = 64)]
    pub width: usize,
}

impl Vgg19Config {
    /// Initializes a frozen network with random weights. Use [`Vgg19::load`]
    /// for pretrained ones.
    ///
    /// The network is only ever used as a fixed feature extractor, so none of
    /// its parameters track gradients.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg19<B> {
        let mut channels_in = 3;
        let mut blocks = Vec::with_capacity(BLOCK_DEPTHS.len());

        for (&depth, &mult) in BLOCK_DEPTHS.iter().zip(BLOCK_WIDTHS.iter()) {
            let channels_out = self.width * mult;
            let mut convs = Vec::with_capacity(depth);

            for _ in 0..depth {
                convs.push(
                    Conv2dConfig::new([channels_in, channels_out], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .init(device),
                );
                channels_in = channels_out;
            }

            blocks.push(VggBlock { convs });
        }

        Vgg19 { blocks }.no_grad()
    }
}

#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
}

/// The 16 convolution layers of VGG19, each followed by a ReLU, in five
/// blocks separated by 2x2 max pooling. The classifier head is omitted.
///
/// Layers are named `block{b}_conv{i}`, both 1-based.
#[derive(Module, Debug)]
pub struct Vgg19<B: Backend> {
    blocks: Vec<VggBlock<B>>,
}

fn layer_name(block: usize, conv: usize) -> String {
    format!("block{}_conv{}", block + 1, conv + 1)
}

impl<B: Backend> Vgg19<B> {
    /// Loads pretrained weights and freezes the network.
    ///
    /// `.mpk` files are read as burn named MessagePack records. With the
    /// `pytorch` feature, `.pt`/`.pth` files are read as a VGG19 `state_dict`
    /// with the `features.N.weight` layout. The weights must expect caffe
    /// style input, see [`PixelNormalization::CAFFE`](crate::PixelNormalization::CAFFE).
    pub fn load<P: AsRef<Path>>(
        path: P,
        config: &Vgg19Config,
        device: &B::Device,
    ) -> Result<Self, Error> {
        let path = path.as_ref();
        let fail = |reason: String| {
            Error::ExtractorLoad(ExtractorLoadError {
                path: path.to_path_buf(),
                reason,
            })
        };

        if !path.is_file() {
            return Err(fail("file not found".to_owned()));
        }

        let model = config.init::<B>(device);

        let model = match path.extension().and_then(|ext| ext.to_str()) {
            Some("mpk") => model
                .load_file(
                    path.to_path_buf(),
                    &NamedMpkFileRecorder::<FullPrecisionSettings>::default(),
                    device,
                )
                .map_err(|err| fail(format!("{:?}", err)))?,
            #[cfg(feature = "pytorch")]
            Some("pt") | Some("pth") => {
                use burn::record::Recorder;
                use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

                let args = torch_key_remaps()
                    .iter()
                    .fold(LoadArgs::new(path.to_path_buf()), |args, (from, to)| {
                        args.with_key_remap(from, to)
                    });

                let record: Vgg19Record<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
                    .load(args, device)
                    .map_err(|err| fail(format!("{:?}", err)))?;

                model.load_record(record)
            }
            other => {
                return Err(fail(format!(
                    "unsupported weights format '{}'",
                    other.unwrap_or_default()
                )))
            }
        };

        log::debug!("loaded VGG19 weights from '{}'", path.display());

        Ok(model.no_grad())
    }

    /// Runs the network up to the deepest layer in `wanted`, collecting the
    /// post-activation output of every wanted layer along the way.
    pub fn forward_layers(&self, input: Tensor<B, 4>, wanted: &[&str]) -> Activations<B> {
        let mut activations = Activations::new();
        let mut remaining = wanted.len();
        let mut x = input;

        for (b, block) in self.blocks.iter().enumerate() {
            if remaining == 0 {
                break;
            }

            if b > 0 {
                x = max_pool2d(x, [2, 2], [2, 2], [0, 0], [1, 1]);
            }

            for (c, conv) in block.convs.iter().enumerate() {
                x = relu(conv.forward(x));

                let name = layer_name(b, c);
                if wanted.contains(&name.as_str()) {
                    activations.insert(name, x.clone());
                    remaining -= 1;
                    if remaining == 0 {
                        break;
                    }
                }
            }
        }

        activations
    }
}

impl<B: Backend> FeatureExtractor<B> for Vgg19<B> {
    fn layer_names(&self) -> Vec<String> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(b, block)| (0..block.convs.len()).map(move |c| layer_name(b, c)))
            .collect()
    }

    fn extract(
        &self,
        input: Tensor<B, 4>,
        layers: &LayerSelection,
    ) -> Result<Activations<B>, Error> {
        self.check_layers(layers)?;

        let wanted: Vec<&str> = layers.all().collect();
        Ok(self.forward_layers(input, &wanted))
    }
}

/// Maps the `features.N` keys of a torchvision style VGG19 checkpoint onto
/// our block/conv layout. Indices skip the ReLU after every conv and the
/// pooling after every block.
#[cfg(any(feature = "pytorch", test))]
fn torch_key_remaps() -> Vec<(String, String)> {
    let mut remaps = Vec::with_capacity(16);
    let mut index = 0;

    for (b, &depth) in BLOCK_DEPTHS.iter().enumerate() {
        for c in 0..depth {
            remaps.push((
                format!(r"^features\.{}\.(weight|bias)$", index),
                format!("blocks.{}.convs.{}.$1", b, c),
            ));
            index += 2;
        }
        index += 1;
    }

    remaps
}
