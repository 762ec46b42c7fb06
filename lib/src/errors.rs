use std::fmt;

#[derive(Debug)]
pub struct InvalidRange {
    pub(crate) min: f32,
    pub(crate) max: f32,
    pub(crate) value: f32,
    pub(crate) name: &'static str,
}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter '{}' - value '{}' is outside the range of {}-{}",
            self.name, self.value, self.min, self.max
        )
    }
}

/// Which of the two inputs an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Content,
    Style,
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Content => "content",
            Self::Style => "style",
        })
    }
}

#[derive(Debug)]
pub enum DecodeReason {
    /// The image library could not read the data
    Image(image::ImageError),
    /// The image decoded fine, but one of its dimensions is zero
    Empty { width: u32, height: u32 },
}

#[derive(Debug)]
pub struct DecodeError {
    pub(crate) input: Input,
    pub(crate) reason: DecodeReason,
}

impl DecodeError {
    pub fn input(&self) -> Input {
        self.input
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            DecodeReason::Image(ie) => write!(f, "failed to decode the {} image: {}", self.input, ie),
            DecodeReason::Empty { width, height } => write!(
                f,
                "the {} image has no pixels ({}x{})",
                self.input, width, height
            ),
        }
    }
}

#[derive(Debug)]
pub struct ShapeMismatch {
    /// The tensor whose shape disagreed, eg "style image" or "generated activation"
    pub(crate) tensor: &'static str,
    /// The layer the comparison happened at, "input" for the images themselves
    pub(crate) layer: String,
    pub(crate) expected: Vec<usize>,
    pub(crate) actual: Vec<usize>,
}

impl ShapeMismatch {
    pub fn layer(&self) -> &str {
        &self.layer
    }
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shape mismatch for the {} at layer '{}': expected {:?}, got {:?}",
            self.tensor, self.layer, self.expected, self.actual
        )
    }
}

#[derive(Debug)]
pub struct ExtractorLoadError {
    pub(crate) path: std::path::PathBuf,
    pub(crate) reason: String,
}

impl fmt::Display for ExtractorLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to load network weights from '{}': {}",
            self.path.display(),
            self.reason
        )
    }
}

#[derive(Debug)]
pub enum Error {
    /// A session was built without the content or the style image
    MissingInput(Input),
    /// One of the input images could not be decoded, or was empty
    Decode(DecodeError),
    /// Tensors that must agree in shape didn't, the run can't continue
    ShapeMismatch(ShapeMismatch),
    /// The pretrained weights of the feature extractor are unavailable
    ExtractorLoad(ExtractorLoadError),
    /// A layer was requested that the feature extractor doesn't expose
    UnknownLayer(String),
    /// An input parameter had an invalid range specified
    InvalidRange(InvalidRange),
    /// The total loss became NaN or infinite, usually due to a learning rate
    /// that is far too high
    NonFiniteLoss { iteration: u32 },
    /// Tensor data couldn't be read back from the backend
    Tensor(String),
    /// An error in the image library occurred, eg failed to save
    Image(image::ImageError),
    /// Io is notoriously error free with no problems, but we cover it just in case!
    Io(std::io::Error),
    /// The user specified an image format we don't support as the output
    UnsupportedOutputFormat(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(DecodeError {
                reason: DecodeReason::Image(err),
                ..
            })
            | Self::Image(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingInput(input) => write!(f, "no {} image was provided", input),
            Self::Decode(de) => write!(f, "{}", de),
            Self::ShapeMismatch(sm) => write!(f, "{}", sm),
            Self::ExtractorLoad(el) => write!(f, "{}", el),
            Self::UnknownLayer(name) => {
                write!(f, "the feature extractor has no layer named '{}'", name)
            }
            Self::InvalidRange(ir) => write!(f, "{}", ir),
            Self::NonFiniteLoss { iteration } => write!(
                f,
                "the loss became non-finite at iteration {}, try a lower learning rate",
                iteration
            ),
            Self::Tensor(msg) => write!(f, "failed to read tensor data: {}", msg),
            Self::Image(ie) => write!(f, "{}", ie),
            Self::Io(io) => write!(f, "{}", io),
            Self::UnsupportedOutputFormat(fmt) => {
                write!(f, "the output format '{}' is not supported", fmt)
            }
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(ie: image::ImageError) -> Self {
        Self::Image(ie)
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::Io(io)
    }
}

impl From<ShapeMismatch> for Error {
    fn from(sm: ShapeMismatch) -> Self {
        Self::ShapeMismatch(sm)
    }
}

impl From<DecodeError> for Error {
    fn from(de: DecodeError) -> Self {
        Self::Decode(de)
    }
}
