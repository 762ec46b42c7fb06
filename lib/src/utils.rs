use crate::errors::{DecodeError, DecodeReason, Input};
use crate::Dims;
use std::path::Path;

/// Helper type used to define the source of `ImageSource`'s data
#[derive(Clone)]
pub enum ImageSource<'a> {
    /// A raw buffer of image data, see `image::load_from_memory` for details
    /// on what is supported
    Memory(&'a [u8]),
    /// The path to an image to load from disk. The image format is inferred
    /// from the file extension, see `image::open` for details
    Path(&'a Path),
    /// An already loaded image that is passed directly to the session
    Image(image::DynamicImage),
}

impl<'a> From<image::DynamicImage> for ImageSource<'a> {
    fn from(img: image::DynamicImage) -> Self {
        Self::Image(img)
    }
}

impl<'a> From<image::RgbImage> for ImageSource<'a> {
    fn from(img: image::RgbImage) -> Self {
        Self::Image(image::DynamicImage::ImageRgb8(img))
    }
}

impl<'a, S> From<&'a S> for ImageSource<'a>
where
    S: AsRef<Path> + 'a,
{
    fn from(path: &'a S) -> Self {
        Self::Path(path.as_ref())
    }
}

pub fn load_dynamic_image(src: ImageSource<'_>) -> Result<image::DynamicImage, image::ImageError> {
    match src {
        ImageSource::Memory(data) => image::load_from_memory(data),
        ImageSource::Path(path) => image::open(path),
        ImageSource::Image(img) => Ok(img),
    }
}

/// Decodes an input image as 8-bit RGB, resizing it to `size` if its
/// dimensions differ. Any alpha channel is dropped.
pub(crate) fn load_image(
    src: ImageSource<'_>,
    input: Input,
    size: Dims,
) -> Result<image::RgbImage, DecodeError> {
    use image::GenericImageView;

    let img = load_dynamic_image(src).map_err(|ie| DecodeError {
        input,
        reason: DecodeReason::Image(ie),
    })?;

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError {
            input,
            reason: DecodeReason::Empty { width, height },
        });
    }

    let img = img.to_rgb();
    if width != size.width || height != size.height {
        Ok(image::imageops::resize(
            &img,
            size.width,
            size.height,
            image::imageops::CatmullRom,
        ))
    } else {
        Ok(img)
    }
}
