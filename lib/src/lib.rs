// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

//! `neural-style` synthesizes an image that keeps the spatial content of one
//! image while taking on the texture statistics of another, by optimizing the
//! pixels directly against the activations of a frozen VGG19 network.
//!
//! First, you build a `Session` via a `SessionBuilder`, which follows the
//! builder pattern. Calling `build` on the `SessionBuilder` decodes and resizes
//! both input images and checks the parameters for errors.
//!
//! `Session` has a `run()` method that takes a feature extractor (usually a
//! pretrained [`Vgg19`]) and a burn device, runs the optimization loop, and
//! returns the result as a `GeneratedImage`.
//!
//! You can save, stream, or inspect the image from `GeneratedImage`.
//!
//! The network and the automatic differentiation both come from
//! [burn](https://burn.dev), so any `AutodiffBackend` can be used.
//!
//! ## Usage
//! ```no_run
//! use burn::backend::{Autodiff, NdArray};
//!
//! type B = Autodiff<NdArray<f32>>;
//! let device = Default::default();
//!
//! // Load the frozen feature extractor once
//! let vgg = neural_style::Vgg19::<B>::load(
//!     "weights/vgg19.mpk",
//!     &neural_style::Vgg19Config::new(),
//!     &device,
//! ).expect("failed to load VGG19 weights");
//!
//! // Create a new session with mostly default parameters
//! let session = neural_style::Session::builder()
//!     .content(&"imgs/tom.jpg")
//!     .style(&"imgs/starry.jpg")
//!     .resolution(neural_style::Dims::square(256))
//!     .iterations(300)
//!     .build().expect("failed to build session");
//!
//! // Optimize a new image
//! let generated = session.run::<B, _>(&vgg, &device, None).expect("failed to run");
//!
//! // Save the generated image to disk
//! generated.save("my_generated_img.jpg").expect("failed to save generated image");
//! ```
pub mod codec;
mod errors;
pub mod extractor;
pub mod loss;
pub mod session;
pub mod transfer;
mod utils;
use utils::*;
pub mod vgg;

pub use burn;
pub use image;
use std::path::Path;

pub use codec::PixelNormalization;
pub use errors::{
    DecodeError, DecodeReason, Error, ExtractorLoadError, Input, InvalidRange, ShapeMismatch,
};
pub use extractor::{Activations, FeatureExtractor, LayerSelection};
pub use loss::{LossReport, LossWeights, Objective};
pub use session::{ProgressStat, ProgressUpdate, Session, SessionBuilder, TransferProgress};
pub use transfer::{
    CancelToken, InitialImage, PlateauStop, StyleTransfer, Termination, TransferParams,
    TransferState,
};
pub use utils::{load_dynamic_image, ImageSource};
pub use vgg::{Vgg19, Vgg19Config};

/// Simple dimensions struct
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// An image generated by a `Session::run()`
pub struct GeneratedImage {
    image: image::RgbImage,
    termination: Termination,
    iterations: u32,
    history: Vec<LossReport>,
}

impl GeneratedImage {
    /// Saves the generated image to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent_path) = path.parent() {
            std::fs::create_dir_all(parent_path)?;
        }

        self.image.save(path)?;
        Ok(())
    }

    /// Writes the generated image to the specified stream
    pub fn write<W: std::io::Write>(
        self,
        writer: &mut W,
        fmt: image::ImageOutputFormat,
    ) -> Result<(), Error> {
        let dyn_img = self.into_image();
        Ok(dyn_img.write_to(writer, fmt)?)
    }

    /// Why the optimization stopped
    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// The number of completed iterations
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// The loss of every completed iteration
    pub fn loss_history(&self) -> &[LossReport] {
        &self.history
    }

    /// The generated pixels
    pub fn image(&self) -> &image::RgbImage {
        &self.image
    }

    /// Returns the generated output image
    pub fn into_image(self) -> image::DynamicImage {
        image::DynamicImage::ImageRgb8(self.image)
    }
}

impl AsRef<image::RgbImage> for GeneratedImage {
    fn as_ref(&self) -> &image::RgbImage {
        &self.image
    }
}
