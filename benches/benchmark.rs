use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use image::{DynamicImage, RgbImage};
use imagelab::engine::{
    analyse, channel_histograms, fast_resize_owned, render_histogram, to_luma, ChartSettings,
    ResampleFilter,
};
use imagelab::{Channel, ImageHandle, SourceFormat};
use std::hint::black_box;

fn create_test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

const SIZES: [(u32, u32); 3] = [(640, 480), (1920, 1080), (4000, 3000)];

fn bench_histograms(c: &mut Criterion) {
    let mut group = c.benchmark_group("histograms");
    for (w, h) in SIZES {
        let img = create_test_image(w, h);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &img, |b, img| {
            b.iter(|| channel_histograms(black_box(img)))
        });
    }
    group.finish();
}

fn bench_analyse(c: &mut Criterion) {
    let handle = ImageHandle::new(
        "bench.png",
        create_test_image(1920, 1080),
        SourceFormat::Png,
        b"bench",
    )
    .unwrap();
    c.bench_function("analyse 1920x1080", |b| b.iter(|| analyse(black_box(&handle))));
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce half");
    let img = create_test_image(1920, 1080);
    for filter in [ResampleFilter::Bilinear, ResampleFilter::Lanczos3] {
        group.bench_function(format!("{filter:?}"), |b| {
            b.iter_batched(
                || img.clone(),
                |img| fast_resize_owned(img, 960, 540, filter).unwrap(),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_gray(c: &mut Criterion) {
    let img = create_test_image(1920, 1080);
    c.bench_function("luma 1920x1080", |b| b.iter(|| to_luma(black_box(&img))));
}

fn bench_chart(c: &mut Criterion) {
    let [red, _, _] = channel_histograms(&create_test_image(640, 480));
    let settings = ChartSettings::default();
    c.bench_function("render histogram", |b| {
        b.iter(|| render_histogram(black_box(&red), Channel::R, &settings))
    });
}

criterion_group!(
    benches,
    bench_histograms,
    bench_analyse,
    bench_reduce,
    bench_gray,
    bench_chart
);
criterion_main!(benches);
