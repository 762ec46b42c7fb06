use burn::backend::{Autodiff, NdArray};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use neural_style as ns;
use std::time::{Duration, Instant};

type B = Autodiff<NdArray<f32>>;

fn pattern(dim: u32) -> image::RgbImage {
    image::RgbImage::from_fn(dim, dim, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x ^ y) % 256) as u8])
    })
}

fn losses(c: &mut Criterion) {
    static DIM: usize = 16;

    let device = Default::default();
    let mut group = c.benchmark_group("losses");

    for dim in [DIM, 2 * DIM, 4 * DIM].iter() {
        let activation =
            burn::tensor::Tensor::<NdArray<f32>, 4>::ones([1, 64, *dim, *dim], &device);

        group.bench_with_input(BenchmarkId::new("gram", dim), &activation, |b, a| {
            b.iter(|| black_box(ns::loss::gram_matrix(a.clone())));
        });

        group.bench_with_input(
            BenchmarkId::new("total_variation", dim),
            &activation,
            |b, a| {
                b.iter(|| black_box(ns::loss::total_variation_loss(a.clone())));
            },
        );
    }
    group.finish();
}

fn transfer_step(c: &mut Criterion) {
    static DIM: u32 = 16;

    // The extractor is built once, only the transfer itself is measured
    let vgg = ns::Vgg19Config::new()
        .with_width(8)
        .init::<B>(&Default::default());

    let mut group = c.benchmark_group("transfer_step");
    group.sample_size(10);

    for dim in [DIM, 2 * DIM, 4 * DIM].iter() {
        let img = pattern(*dim);

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |b, _dim| {
            b.iter_custom(|iters| {
                let mut total_elapsed = Duration::new(0, 0);
                for _i in 0..iters {
                    let norm = ns::PixelNormalization::CAFFE;
                    let device = Default::default();
                    let mut st = ns::StyleTransfer::new(
                        &vgg,
                        ns::codec::encode::<B>(&img, &norm, &device),
                        ns::codec::encode::<B>(&img, &norm, &device),
                        ns::TransferParams::default(),
                        ns::transfer::adam::<B>(1e-7),
                    )
                    .unwrap();

                    let start = Instant::now();
                    black_box(st.step().unwrap());
                    total_elapsed += start.elapsed();
                }

                total_elapsed
            });
        });
    }
    group.finish();
}

criterion_group!(benches, losses, transfer_step);
criterion_main!(benches);
