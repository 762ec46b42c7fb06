//! Conversion between 8-bit RGB images and the normalized tensors the
//! feature extractor consumes.
//!
//! Tensors are laid out channels first, `[1, 3, height, width]`, which is what
//! burn's convolutions expect.

use crate::{Error, ShapeMismatch};
use burn::tensor::{backend::Backend, Tensor, TensorData};

/// How raw pixels are mapped into the network's input space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PixelNormalization {
    /// Per-channel means, in RGB order, subtracted from every pixel
    pub mean: [f32; 3],
    /// Store channels in BGR order instead of RGB
    pub reverse_channels: bool,
}

impl PixelNormalization {
    /// The convention of the original caffe VGG models: BGR order,
    /// zero-centered on the ImageNet channel means, no scaling.
    pub const CAFFE: Self = Self {
        mean: [123.68, 116.779, 103.939],
        reverse_channels: true,
    };

    #[inline]
    fn source_channel(&self, tensor_channel: usize) -> usize {
        if self.reverse_channels {
            2 - tensor_channel
        } else {
            tensor_channel
        }
    }

    /// The range a normalized value of the given tensor channel can take
    /// while still mapping to a displayable pixel.
    pub fn channel_range(&self, tensor_channel: usize) -> (f32, f32) {
        let mean = self.mean[self.source_channel(tensor_channel)];
        (-mean, 255.0 - mean)
    }
}

impl Default for PixelNormalization {
    fn default() -> Self {
        Self::CAFFE
    }
}

/// Converts an image into a normalized `[1, 3, height, width]` tensor.
pub fn encode<B: Backend>(
    img: &image::RgbImage,
    norm: &PixelNormalization,
    device: &B::Device,
) -> Tensor<B, 4> {
    let (width, height) = img.dimensions();
    let plane = width as usize * height as usize;
    let mut data = vec![0f32; plane * 3];

    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * width as usize + x as usize;
        for channel in 0..3 {
            let src = norm.source_channel(channel);
            data[channel * plane + offset] = f32::from(pixel[src]) - norm.mean[src];
        }
    }

    Tensor::from_data(
        TensorData::new(data, [1, 3, height as usize, width as usize]),
        device,
    )
}

/// Inverse of [`encode`]. Values outside of the displayable range are
/// clamped, which is expected as the optimization is unconstrained.
pub fn deprocess<B: Backend>(
    tensor: Tensor<B, 4>,
    norm: &PixelNormalization,
) -> Result<image::RgbImage, Error> {
    let [batch, channels, height, width] = tensor.dims();
    if batch != 1 || channels != 3 {
        return Err(ShapeMismatch {
            tensor: "image tensor",
            layer: "input".to_owned(),
            expected: vec![1, 3, height, width],
            actual: vec![batch, channels, height, width],
        }
        .into());
    }

    let data = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| Error::Tensor(format!("{:?}", err)))?;

    let plane = width * height;
    let mut img = image::RgbImage::new(width as u32, height as u32);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let offset = y as usize * width + x as usize;
        for channel in 0..3 {
            let src = norm.source_channel(channel);
            let value = data[channel * plane + offset] + norm.mean[src];
            pixel[src] = value.round().max(0.0).min(255.0) as u8;
        }
    }

    Ok(img)
}

#[cfg(test)]
mod test {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn gradient_image(width: u32, height: u32) -> image::RgbImage {
        image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 30) as u8, (y * 40) as u8, ((x + y) * 7) as u8])
        })
    }

    #[test]
    fn encode_is_channels_first_and_bgr() {
        let img = image::RgbImage::from_pixel(2, 1, image::Rgb([200, 100, 50]));
        let tensor = encode::<B>(&img, &PixelNormalization::CAFFE, &Default::default());

        assert_eq!(tensor.dims(), [1, 3, 1, 2]);

        let values = tensor.into_data().to_vec::<f32>().unwrap();
        let blue = 50.0 - 103.939;
        let green = 100.0 - 116.779;
        let red = 200.0 - 123.68;
        let expected = [blue, blue, green, green, red, red];

        for (v, e) in values.iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-4, "{} != {}", v, e);
        }
    }

    #[test]
    fn deprocess_inverts_encode() {
        let img = gradient_image(7, 5);
        for norm in &[
            PixelNormalization::CAFFE,
            PixelNormalization {
                mean: [0.0; 3],
                reverse_channels: false,
            },
        ] {
            let tensor = encode::<B>(&img, norm, &Default::default());
            assert_eq!(deprocess(tensor, norm).unwrap(), img);
        }
    }

    #[test]
    fn deprocess_clamps() {
        let norm = PixelNormalization::CAFFE;
        let device = Default::default();
        let tensor = Tensor::<B, 4>::full([1, 3, 2, 2], 1000.0, &device);
        let img = deprocess(tensor, &norm).unwrap();
        assert!(img.pixels().all(|p| p.0 == [255, 255, 255]));

        let tensor = Tensor::<B, 4>::full([1, 3, 2, 2], -1000.0, &device);
        let img = deprocess(tensor, &norm).unwrap();
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn deprocess_rejects_non_rgb_tensors() {
        let tensor = Tensor::<B, 4>::zeros([1, 4, 2, 2], &Default::default());
        assert!(matches!(
            deprocess(tensor, &PixelNormalization::CAFFE),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn channel_range_maps_to_displayable_pixels() {
        let norm = PixelNormalization::CAFFE;
        // channel 0 is blue in BGR order
        let (lo, hi) = norm.channel_range(0);
        assert!((lo + 103.939).abs() < 1e-4);
        assert!((hi - (255.0 - 103.939)).abs() < 1e-4);
    }
}
