use burn::backend::{Autodiff, NdArray};
use neural_style as ns;

type B = Autodiff<NdArray<f32>>;

fn main() -> Result<(), ns::Error> {
    let device = Default::default();

    // the network is frozen and can be reused across sessions
    let vgg = ns::Vgg19::<B>::load("weights/vgg19.mpk", &ns::Vgg19Config::new(), &device)?;

    let session = ns::Session::builder()
        // the image whose layout we keep
        .content(&"imgs/tom.jpg")
        // the image whose brush strokes and colors we want
        .style(&"imgs/starry.jpg")
        .resolution(ns::Dims::square(256))
        .iterations(200)
        .build()?;

    // print the loss every 10 iterations
    let progress = |update: ns::ProgressUpdate<'_>| {
        if update.iteration.current % 10 == 0 {
            println!(
                "{}/{}: {}",
                update.iteration.current, update.iteration.total, update.loss.total
            );
        }
    };

    let generated = session.run::<B, _>(&vgg, &device, Some(Box::new(progress)))?;

    // save the result to the disk
    generated.save("out/01.jpg")
}
