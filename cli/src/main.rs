mod logging;
mod progress;

use structopt::StructOpt;

use std::path::PathBuf;

use neural_style::{
    image::ImageOutputFormat as ImgFmt, Dims, Error, InitialImage, Session, Termination,
    TransferProgress, Vgg19, Vgg19Config,
};

#[cfg(feature = "gpu")]
type Backend = burn::backend::Autodiff<burn::backend::Wgpu>;
#[cfg(not(feature = "gpu"))]
type Backend = burn::backend::Autodiff<burn::backend::NdArray<f32>>;

fn parse_size(input: &str) -> Result<Dims, std::num::ParseIntError> {
    let mut i = input.splitn(2, 'x');

    let x: u32 = i.next().unwrap_or("").parse()?;
    let y: u32 = match i.next() {
        Some(num) => num.parse()?,
        None => x,
    };
    Ok(Dims::new(x, y))
}

fn parse_img_fmt(input: &str) -> Result<ImgFmt, String> {
    let fmt = match input {
        "png" => ImgFmt::Png,
        "jpg" => ImgFmt::Jpeg(95),
        "bmp" => ImgFmt::Bmp,
        other => {
            return Err(format!(
                "image format `{}` not one of: 'png', 'jpg', 'bmp'",
                other
            ))
        }
    };

    Ok(fmt)
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct Weights {
    /// How strongly the output keeps the activations of the content image
    #[structopt(long, default_value = "1e4")]
    content_weight: f32,
    /// How strongly the output matches the Gram matrices of the style image
    #[structopt(long, default_value = "1e-2")]
    style_weight: f32,
    /// Weight of the total variation term, higher values give smoother output
    #[structopt(long, default_value = "30")]
    tv_weight: f32,
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct Tweaks {
    /// The number of optimization iterations
    #[structopt(short, long, default_value = "50")]
    iterations: u32,
    /// The Adam learning rate, in pixel units
    #[structopt(long, default_value = "5.0")]
    learning_rate: f64,
    /// Comma separated layers whose Gram matrices define the style
    #[structopt(
        long,
        use_delimiter = true,
        default_value = "block1_conv1,block2_conv1,block3_conv1,block4_conv1,block5_conv1"
    )]
    style_layers: Vec<String>,
    /// The layer whose activations define the content
    #[structopt(long, default_value = "block5_conv2")]
    content_layer: String,
    /// Start from seeded uniform noise instead of the content image
    #[structopt(long)]
    noise_seed: Option<u64>,
    /// Stop early once the loss hasn't improved for this many iterations
    #[structopt(long)]
    plateau_patience: Option<u32>,
    /// The relative loss decrease that counts as an improvement for `--plateau-patience`
    #[structopt(long, default_value = "0.001")]
    plateau_min_delta: f32,
    /// Log the loss every n iterations
    #[structopt(long, default_value = "50")]
    log_every: u32,
}

#[derive(StructOpt)]
#[structopt(
    name = "neural-style",
    about = "Repaints a content image in the style of another image",
    rename_all = "kebab-case"
)]
struct Opt {
    /// The image whose content is kept
    #[structopt(parse(from_os_str))]
    content: PathBuf,
    /// The image whose style is transferred
    #[structopt(parse(from_os_str))]
    style: PathBuf,
    /// Pretrained VGG19 weights, a burn `.mpk` record or, when built with the
    /// `pytorch` feature, a `.pth` state dict
    #[structopt(long, default_value = "weights/vgg19.mpk", parse(from_os_str))]
    weights: PathBuf,
    /// Size of the generated image, in `width x height`, or a single number for both dimensions
    #[structopt(
        long,
        default_value = "512",
        parse(try_from_str = parse_size)
    )]
    out_size: Dims,
    /// The format to save the generated image as.
    ///
    /// NOTE: this will only apply when stdout is specified via `-o -`, otherwise the image
    /// format is determined by the file extension of the path provided to `-o`
    #[structopt(
        long,
        default_value = "png",
        parse(try_from_str = parse_img_fmt)
    )]
    out_fmt: ImgFmt,
    /// The path to save the generated image to, the file extensions of the path determines
    /// the image format used. You may use `-` for stdout.
    #[structopt(long = "out", short, parse(from_os_str))]
    output_path: PathBuf,
    /// A directory into which intermediate images are saved
    #[structopt(long, parse(from_os_str))]
    preview_dir: Option<PathBuf>,
    /// Save an intermediate image every n iterations, requires `--preview-dir`
    #[structopt(long, default_value = "10")]
    preview_every: u32,
    /// Don't show the progress bar
    #[structopt(long)]
    no_progress: bool,
    /// Write the log to this file instead of stderr
    #[structopt(long, parse(from_os_str))]
    log_file: Option<PathBuf>,
    #[structopt(flatten)]
    weights_opts: Weights,
    #[structopt(flatten)]
    tweaks: Tweaks,
}

fn main() {
    if let Err(e) = real_main() {
        if atty::is(atty::Stream::Stderr) {
            eprintln!("\x1b[31merror\x1b[0m: {}", e);
        } else {
            eprintln!("error: {}", e);
        }

        std::process::exit(1);
    }
}

fn real_main() -> Result<(), Error> {
    let args = Opt::from_args();

    // Check that the extension for the path supplied by the user is one of the ones we support
    {
        match args.output_path.extension().and_then(|ext| ext.to_str()) {
            Some("png" | "jpg" | "jpeg" | "bmp") | None => {}
            Some(other) => return Err(Error::UnsupportedOutputFormat(other.to_owned())),
        }
    }

    let show_progress = !args.no_progress && atty::is(atty::Stream::Stderr);
    logging::install(args.log_file.as_deref(), show_progress)?;

    let device = Default::default();

    // Load the network before touching the inputs, so a missing download
    // fails fast
    let vgg = Vgg19::<Backend>::load(&args.weights, &Vgg19Config::new(), &device)?;

    let mut sb = Session::builder()
        .content(&args.content)
        .style(&args.style)
        .resolution(args.out_size)
        .content_weight(args.weights_opts.content_weight)
        .style_weight(args.weights_opts.style_weight)
        .tv_weight(args.weights_opts.tv_weight)
        .iterations(args.tweaks.iterations)
        .learning_rate(args.tweaks.learning_rate)
        .style_layers(args.tweaks.style_layers.iter().map(|l| l.trim()))
        .content_layer(args.tweaks.content_layer.trim())
        .log_every(args.tweaks.log_every);

    if let Some(seed) = args.tweaks.noise_seed {
        sb = sb.initial_image(InitialImage::Noise { seed });
    }

    if let Some(patience) = args.tweaks.plateau_patience {
        sb = sb.stop_on_plateau(patience, args.tweaks.plateau_min_delta);
    }

    if args.preview_dir.is_some() {
        sb = sb.preview_every(args.preview_every);
    }

    let session = sb.build()?;

    let progress: Option<Box<dyn TransferProgress>> =
        if show_progress || args.preview_dir.is_some() {
            let mut progress = progress::ProgressBars::new(show_progress);

            if let Some(dir) = args.preview_dir.clone() {
                progress = progress.with_previews(dir)?;
            }

            Some(Box::new(progress))
        } else {
            None
        };

    let generated = session.run::<Backend, _>(&vgg, &device, progress)?;

    if generated.termination() == Termination::Converged {
        log::info!(
            "loss plateaued after {} of {} iterations",
            generated.iterations(),
            args.tweaks.iterations
        );
    }

    if args.output_path.to_str() == Some("-") {
        let out = std::io::stdout();
        let mut out = out.lock();
        generated.write(&mut out, args.out_fmt)?;
    } else {
        // This won't respect the output format specified by the user,
        // only the extension on the path they specify
        generated.save(&args.output_path)?;
    }

    Ok(())
}
