use burn::backend::{Autodiff, NdArray};
use neural_style as ns;

type B = Autodiff<NdArray<f32>>;

fn main() -> Result<(), ns::Error> {
    let device = Default::default();
    let vgg = ns::Vgg19::<B>::load("weights/vgg19.mpk", &ns::Vgg19Config::new(), &device)?;

    let session = ns::Session::builder()
        .content(&"imgs/tom.jpg")
        .style(&"imgs/starry.jpg")
        .resolution(ns::Dims::square(256))
        // start from noise rather than the content image, this needs
        // many more iterations but gives a less literal result
        .initial_image(ns::InitialImage::Noise { seed: 42 })
        .iterations(2000)
        // but stop once 50 iterations in a row haven't lowered the loss by 0.1%
        .stop_on_plateau(50, 0.001)
        .build()?;

    let generated = session.run::<B, _>(&vgg, &device, None)?;
    println!(
        "stopped after {} iterations: {:?}",
        generated.iterations(),
        generated.termination()
    );

    generated.save("out/02.jpg")
}
