use burn::backend::{Autodiff, NdArray};
use burn::tensor::Tensor;
use neural_style as ns;
use ns::{
    codec, transfer, CancelToken, Error, InitialImage, LayerSelection, LossWeights,
    PixelNormalization, PlateauStop, ProgressUpdate, StyleTransfer, Termination, TransferParams,
    TransferProgress, TransferState, Vgg19, Vgg19Config,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

type B = Autodiff<NdArray<f32>>;

fn tiny_vgg() -> Vgg19<B> {
    // A narrow, randomly initialized network is enough to exercise the loop,
    // it comes out of `init` already frozen
    Vgg19Config::new()
        .with_width(4)
        .init::<B>(&Default::default())
}

/// Deep layers of a random network mostly echo their biases, so the
/// optimization tests look at the first two blocks only
fn shallow_layers() -> LayerSelection {
    LayerSelection::new(
        vec!["block1_conv1", "block1_conv2", "block2_conv1"],
        "block2_conv1",
    )
}

fn gray(size: u32) -> image::RgbImage {
    image::RgbImage::from_pixel(size, size, image::Rgb([128, 128, 128]))
}

fn pattern(size: u32) -> image::RgbImage {
    image::RgbImage::from_fn(size, size, |x, y| {
        image::Rgb([
            (x * 255 / size) as u8,
            (y * 255 / size) as u8,
            if (x / 4 + y / 4) % 2 == 0 { 40 } else { 220 },
        ])
    })
}

fn encode(img: &image::RgbImage) -> Tensor<B, 4> {
    codec::encode::<B>(img, &PixelNormalization::CAFFE, &Default::default())
}

fn values<T: burn::tensor::backend::Backend>(t: Tensor<T, 4>) -> Vec<f32> {
    t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
}

#[test]
fn zero_iterations_leave_the_content_untouched() {
    let vgg = tiny_vgg();
    let content = encode(&pattern(32));

    let params = TransferParams {
        iterations: 0,
        ..Default::default()
    };

    let mut st =
        StyleTransfer::new(&vgg, content.clone(), encode(&gray(32)), params, transfer::adam::<B>(1e-7))
            .unwrap();

    assert_eq!(st.run(None).unwrap(), Termination::Exhausted);
    assert_eq!(st.iteration(), 0);
    assert!(st.history().is_empty());
    assert_eq!(values(st.image()), values(content.inner()));
}

#[test]
fn uniform_gray_inputs_are_already_optimal() {
    let vgg = tiny_vgg();
    let img = gray(64);

    let params = TransferParams {
        iterations: 1,
        ..Default::default()
    };

    let mut st = StyleTransfer::new(&vgg, encode(&img), encode(&img), params, transfer::adam::<B>(1e-7))
        .unwrap();
    st.run(None).unwrap();

    let report = st.history()[0];
    assert!(report.content.abs() < 1e-6, "{:?}", report);
    assert!(report.style.abs() < 1e-6, "{:?}", report);
    assert!(report.total_variation.abs() < 1e-6, "{:?}", report);
    assert!(report.total.abs() < 1e-3, "{:?}", report);

    let out = st.deprocess().unwrap();
    for pixel in out.pixels() {
        for channel in pixel.0.iter() {
            assert!((i32::from(*channel) - 128).abs() <= 1, "{:?}", pixel);
        }
    }
}

#[test]
fn content_only_optimization_decreases_content_loss() {
    let vgg = tiny_vgg();
    let content = encode(&pattern(32));

    let params = TransferParams {
        iterations: 6,
        learning_rate: 0.25,
        weights: LossWeights {
            content: 1e4,
            style: 0.0,
            total_variation: 0.0,
        },
        init: InitialImage::Noise { seed: 7 },
        layers: shallow_layers(),
        ..Default::default()
    };

    let mut st =
        StyleTransfer::new(&vgg, content, encode(&gray(32)), params, transfer::adam::<B>(1e-7))
            .unwrap();
    st.run(None).unwrap();

    let content_losses: Vec<f32> = st.history().iter().map(|r| r.content).collect();
    assert_eq!(content_losses.len(), 6);
    assert!(content_losses[0] > 0.0);

    for pair in content_losses.windows(2) {
        assert!(
            pair[1] <= pair[0] * (1.0 + 1e-4),
            "content loss increased: {:?}",
            content_losses
        );
    }
    assert!(content_losses[5] < content_losses[0]);
}

#[test]
fn style_only_optimization_approaches_target_grams() {
    let vgg = tiny_vgg();
    let img = pattern(32);

    let params = TransferParams {
        iterations: 20,
        learning_rate: 2.0,
        weights: LossWeights {
            content: 0.0,
            style: 1.0,
            total_variation: 0.0,
        },
        init: InitialImage::Noise { seed: 3 },
        layers: shallow_layers(),
        ..Default::default()
    };

    let mut st = StyleTransfer::new(&vgg, encode(&img), encode(&img), params, transfer::adam::<B>(1e-7))
        .unwrap();
    st.run(None).unwrap();

    let history = st.history();
    let first = history[0].style;
    let last = history[history.len() - 1].style;

    assert!(first > 0.0);
    assert!(last < first, "style loss went from {} to {}", first, last);
    // the content term isn't optimized at all but is still reported
    assert!(history.iter().all(|r| r.content.is_finite()));
}

#[test]
fn mismatched_resolutions_fail_before_any_step() {
    let vgg = tiny_vgg();

    let res = StyleTransfer::new(
        &vgg,
        encode(&pattern(32)),
        encode(&pattern(16)),
        TransferParams::default(),
        transfer::adam::<B>(1e-7),
    );

    match res {
        Err(Error::ShapeMismatch(sm)) => {
            assert_eq!(sm.layer(), "input");
            let msg = sm.to_string();
            assert!(msg.contains("[1, 3, 32, 32]"), "{}", msg);
            assert!(msg.contains("[1, 3, 16, 16]"), "{}", msg);
        }
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("style transfer should not have started"),
    }
}

#[test]
fn unknown_layers_fail_before_any_step() {
    let vgg = tiny_vgg();
    let mut params = TransferParams::default();
    params.layers.content = "block6_conv1".to_owned();

    let res = StyleTransfer::new(
        &vgg,
        encode(&gray(16)),
        encode(&gray(16)),
        params,
        transfer::adam::<B>(1e-7),
    );

    assert!(matches!(res, Err(Error::UnknownLayer(l)) if l == "block6_conv1"));
}

#[test]
fn cancelled_before_start_keeps_the_initial_image() {
    let vgg = tiny_vgg();
    let content = encode(&pattern(16));
    let token = CancelToken::new();
    token.cancel();

    let mut st = StyleTransfer::new(
        &vgg,
        content.clone(),
        encode(&gray(16)),
        TransferParams::default(),
        transfer::adam::<B>(1e-7),
    )
    .unwrap()
    .with_cancel_token(token);

    assert_eq!(st.run(None).unwrap(), Termination::Cancelled);
    assert_eq!(st.iteration(), 0);
    assert_eq!(values(st.image()), values(content.inner()));
}

#[test]
fn cancelling_mid_run_stops_between_iterations() {
    let vgg = tiny_vgg();
    let token = CancelToken::new();

    let params = TransferParams {
        iterations: 10,
        ..Default::default()
    };

    let mut st = StyleTransfer::new(
        &vgg,
        encode(&pattern(16)),
        encode(&gray(16)),
        params,
        transfer::adam::<B>(1e-7),
    )
    .unwrap()
    .with_cancel_token(token.clone());

    let mut cancel_after_two = move |update: ProgressUpdate<'_>| {
        if update.iteration.current == 2 {
            token.cancel();
        }
    };
    let progress: &mut dyn TransferProgress = &mut cancel_after_two;

    assert_eq!(st.run(Some(progress)).unwrap(), Termination::Cancelled);
    assert_eq!(st.iteration(), 2);
    assert_eq!(st.history().len(), 2);
}

#[test]
fn plateau_stops_early() {
    let vgg = tiny_vgg();
    let img = gray(16);

    let params = TransferParams {
        iterations: 10,
        plateau: Some(PlateauStop {
            patience: 1,
            min_delta: 0.5,
        }),
        ..Default::default()
    };

    let mut st = StyleTransfer::new(&vgg, encode(&img), encode(&img), params, transfer::adam::<B>(1e-7))
        .unwrap();

    // the loss is zero from the start, so the second iteration can't improve it
    assert_eq!(st.run(None).unwrap(), Termination::Converged);
    assert_eq!(st.iteration(), 2);
}

#[test]
fn session_runs_end_to_end() {
    let vgg = tiny_vgg();
    let previews = Arc::new(AtomicUsize::new(0));
    let updates = Arc::new(AtomicUsize::new(0));

    let session = ns::Session::builder()
        .content(pattern(40))
        .style(gray(24))
        .resolution(ns::Dims::new(32, 24))
        .iterations(4)
        .learning_rate(1.0)
        .preview_every(2)
        .log_every(1)
        .build()
        .unwrap();

    let progress = {
        let previews = previews.clone();
        let updates = updates.clone();
        move |update: ProgressUpdate<'_>| {
            updates.fetch_add(1, Ordering::SeqCst);
            if let Some(img) = update.preview {
                assert_eq!(img.dimensions(), (32, 24));
                previews.fetch_add(1, Ordering::SeqCst);
            }
            assert_eq!(update.iteration.total, 4);
        }
    };

    let generated = session
        .run::<B, _>(&vgg, &Default::default(), Some(Box::new(progress)))
        .unwrap();

    assert_eq!(generated.termination(), Termination::Exhausted);
    assert_eq!(generated.iterations(), 4);
    assert_eq!(generated.loss_history().len(), 4);
    assert_eq!(updates.load(Ordering::SeqCst), 4);
    assert_eq!(previews.load(Ordering::SeqCst), 2);
    assert_eq!(generated.image().dimensions(), (32, 24));

    let mut png = Vec::new();
    generated
        .write(&mut png, image::ImageOutputFormat::Png)
        .unwrap();
    assert!(!png.is_empty());
}

#[test]
fn session_reports_unknown_style_layers() {
    let vgg = tiny_vgg();

    let session = ns::Session::builder()
        .content(gray(16))
        .style(gray(16))
        .resolution(ns::Dims::square(16))
        .style_layers(vec!["block1_conv1", "block9_conv9"])
        .build()
        .unwrap();

    let err = session.run::<B, _>(&vgg, &Default::default(), None).err().unwrap();
    assert!(matches!(err, Error::UnknownLayer(l) if l == "block9_conv9"));
}

#[test]
fn non_finite_loss_aborts_without_touching_the_image() {
    let vgg = tiny_vgg();
    let content = encode(&pattern(16));

    let params = TransferParams {
        weights: LossWeights {
            content: f32::MAX,
            style: f32::MAX,
            total_variation: f32::MAX,
        },
        ..Default::default()
    };

    let mut st = StyleTransfer::new(
        &vgg,
        content.clone(),
        encode(&gray(16)),
        params,
        transfer::adam::<B>(1e-7),
    )
    .unwrap();

    let before = values(st.image());

    assert!(matches!(
        st.step(),
        Err(Error::NonFiniteLoss { iteration: 0 })
    ));
    assert_eq!(values(st.image()), before);
    assert_eq!(before, values(content.inner()));
    assert_eq!(st.iteration(), 0);
    assert!(st.history().is_empty());
    assert_eq!(st.state(), TransferState::Initialized);
}

#[test]
fn state_moves_from_initialized_to_finished() {
    let vgg = tiny_vgg();
    let img = pattern(16);

    let params = TransferParams {
        iterations: 3,
        ..Default::default()
    };

    let mut st = StyleTransfer::new(
        &vgg,
        encode(&img),
        encode(&gray(16)),
        params,
        transfer::adam::<B>(1e-7),
    )
    .unwrap();
    assert_eq!(st.state(), TransferState::Initialized);

    st.step().unwrap();
    assert_eq!(st.state(), TransferState::Running);
    assert_eq!(st.iteration(), 1);

    // run picks up the remaining budget
    assert_eq!(st.run(None).unwrap(), Termination::Exhausted);
    assert_eq!(st.state(), TransferState::Finished(Termination::Exhausted));
    assert_eq!(st.iteration(), 3);

    // a finished run stays finished
    assert_eq!(st.run(None).unwrap(), Termination::Exhausted);
    assert_eq!(st.iteration(), 3);
}

#[test]
fn targets_are_computed_for_every_selected_layer() {
    let vgg = tiny_vgg();
    let params = TransferParams {
        layers: shallow_layers(),
        weights: LossWeights {
            content: 2.0,
            style: 3.0,
            total_variation: 4.0,
        },
        ..Default::default()
    };

    let st = StyleTransfer::new(
        &vgg,
        encode(&pattern(16)),
        encode(&gray(16)),
        params,
        transfer::adam::<B>(1e-7),
    )
    .unwrap();

    let objective = st.objective();
    assert_eq!(objective.weights(), &st.params().weights);
    assert_eq!(objective.layers(), &shallow_layers());

    // width 4: block1 has 4 channels, block2 has 8, block2 is at half resolution
    assert_eq!(objective.content_target().dims(), [1, 8, 8, 8]);

    let targets: Vec<(&str, [usize; 2])> = objective
        .style_targets()
        .iter()
        .map(|(layer, gram)| (layer.as_str(), gram.dims()))
        .collect();
    assert_eq!(
        targets,
        vec![
            ("block1_conv1", [4, 4]),
            ("block1_conv2", [4, 4]),
            ("block2_conv1", [8, 8]),
        ]
    );
}
