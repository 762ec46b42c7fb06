use burn::backend::{Autodiff, NdArray};
use img_hash::{HashType, ImageHash};
use neural_style as ns;

type B = Autodiff<NdArray<f32>>;

fn tiny_vgg() -> ns::Vgg19<B> {
    ns::Vgg19Config::new()
        .with_width(4)
        .init::<B>(&Default::default())
}

fn rings(width: u32, height: u32) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - width as f32 / 2.0;
        let dy = y as f32 - height as f32 / 2.0;
        let d = (dx * dx + dy * dy).sqrt();
        let v = ((d / 3.0).sin() * 0.5 + 0.5) * 255.0;
        image::Rgb([v as u8, (255.0 - v) as u8, (x * 4 % 256) as u8])
    })
}

fn png_bytes(img: &image::RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}

#[test]
fn zero_iterations_reproduce_the_content() {
    let content = rings(48, 48);
    let encoded = png_bytes(&content);

    let generated = ns::Session::builder()
        .content(ns::ImageSource::Memory(&encoded))
        .style(rings(20, 20))
        .resolution(ns::Dims::square(48))
        .iterations(0)
        .build()
        .unwrap()
        .run::<B, _>(&tiny_vgg(), &Default::default(), None)
        .unwrap();

    assert_eq!(generated.iterations(), 0);
    assert_eq!(generated.image(), &content);

    let gen_hash = ImageHash::hash(&generated.into_image(), 8, HashType::DoubleGradient);
    let expected_hash = ImageHash::hash(
        &image::DynamicImage::ImageRgb8(content),
        8,
        HashType::DoubleGradient,
    );

    assert_eq!(gen_hash.to_base64(), expected_hash.to_base64());
}

#[test]
fn few_iterations_stay_close_to_the_content() {
    let content = rings(32, 32);
    let iterations = 3;
    let learning_rate = 1.0;

    let generated = ns::Session::builder()
        .content(content.clone())
        .style(image::RgbImage::from_pixel(32, 32, image::Rgb([10, 200, 30])))
        .resolution(ns::Dims::square(32))
        .iterations(iterations)
        .learning_rate(learning_rate)
        .build()
        .unwrap()
        .run::<B, _>(&tiny_vgg(), &Default::default(), None)
        .unwrap();

    // Adam moves each value by at most about the learning rate per step
    let bound = (f64::from(iterations) * learning_rate) as i32 + 2;
    for (gen, orig) in generated.image().pixels().zip(content.pixels()) {
        for (g, o) in gen.0.iter().zip(orig.0.iter()) {
            assert!(
                (i32::from(*g) - i32::from(*o)).abs() <= bound,
                "{:?} vs {:?}",
                gen,
                orig
            );
        }
    }

    let gen_hash = ImageHash::hash(&generated.into_image(), 8, HashType::DoubleGradient);
    let expected_hash = ImageHash::hash(
        &image::DynamicImage::ImageRgb8(content),
        8,
        HashType::DoubleGradient,
    );

    let distance = expected_hash.dist_ratio(&gen_hash);
    assert!(distance < 0.25, "images hashes differed by {}", distance);
}

#[test]
fn encoded_output_decodes_to_the_same_pixels() {
    let content = rings(24, 16);

    let generated = ns::Session::builder()
        .content(content.clone())
        .style(content.clone())
        .resolution(ns::Dims::new(24, 16))
        .iterations(0)
        .build()
        .unwrap()
        .run::<B, _>(&tiny_vgg(), &Default::default(), None)
        .unwrap();

    let mut bytes = Vec::new();
    generated
        .write(&mut bytes, image::ImageOutputFormat::Png)
        .unwrap();

    let decoded = image::load_from_memory(&bytes).unwrap().to_rgb();
    assert_eq!(decoded, content);
}
