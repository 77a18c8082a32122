use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use lucent::config::{ContrastPreset, DenoiseProfile, DetailStrategy};
use lucent::stages::{denoise, enhance_contrast, enhance_detail};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn noisy_tile(width: u32, height: u32) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    RgbImage::from_fn(width, height, |x, y| {
        let base = ((x / 16 + y / 16) % 2) as f32 * 100.0 + 70.0;
        let mut px = [0u8; 3];
        for c in &mut px {
            *c = (base + rng.random_range(-12.0f32..12.0)).clamp(0.0, 255.0) as u8;
        }
        Rgb(px)
    })
}

fn stage_benchmarks(c: &mut Criterion) {
    let image = noisy_tile(256, 256);

    let mut group = c.benchmark_group("denoise");
    group.sample_size(10);
    for profile in [DenoiseProfile::Light, DenoiseProfile::Quality] {
        group.bench_with_input(BenchmarkId::from_parameter(profile), &profile, |b, p| {
            let params = p.params();
            b.iter(|| denoise(black_box(image.clone()), &params).unwrap())
        });
    }
    group.finish();

    let mut group = c.benchmark_group("contrast");
    for preset in [ContrastPreset::Standard, ContrastPreset::Constrained] {
        group.bench_with_input(BenchmarkId::from_parameter(preset), &preset, |b, p| {
            let params = p.params();
            b.iter(|| enhance_contrast(black_box(image.clone()), &params).unwrap())
        });
    }
    group.finish();

    let mut group = c.benchmark_group("detail");
    for (name, strategy) in [
        ("kernel_sharpen", DetailStrategy::KernelSharpen),
        ("edge_aware", DetailStrategy::edge_aware()),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| enhance_detail(black_box(image.clone()), &strategy).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, stage_benchmarks);
criterion_main!(benches);
