//! Testing utilities for lucent.

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Flat gray image with uniform noise of `±amplitude` added per sample.
pub fn noisy_flat(width: u32, height: u32, base: u8, amplitude: f32, seed: u64) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| {
        let mut px = [0u8; 3];
        for c in &mut px {
            let noise: f32 = rng.random_range(-amplitude..=amplitude);
            *c = (base as f32 + noise).round().clamp(0.0, 255.0) as u8;
        }
        Rgb(px)
    })
}

/// Standard deviation over every channel sample.
pub fn channel_std_dev(image: &RgbImage) -> f64 {
    let samples = image.as_raw();
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    var.sqrt()
}

/// Textured scene of random overlapping rectangles over a mid-gray background.
///
/// Rectangle corners give the feature detector plenty of distinctive structure.
pub fn rect_scene(width: u32, height: u32, rects: usize, seed: u64) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut image = RgbImage::from_pixel(width, height, Rgb([110, 110, 110]));
    for _ in 0..rects {
        let w = rng.random_range(6..=(width / 6).max(6)).min(width);
        let h = rng.random_range(6..=(height / 6).max(6)).min(height);
        let x0 = rng.random_range(0..(width - w).max(1));
        let y0 = rng.random_range(0..(height - h).max(1));
        let color = Rgb([
            rng.random_range(0..=255u8),
            rng.random_range(0..=255u8),
            rng.random_range(0..=255u8),
        ]);
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                image.put_pixel(x, y, color);
            }
        }
    }
    image
}

/// Copies the `width × height` window at `(x0, y0)`.
pub fn crop(image: &RgbImage, x0: u32, y0: u32, width: u32, height: u32) -> RgbImage {
    image::imageops::crop_imm(image, x0, y0, width, height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_scene_small_dimensions() {
        for (w, h) in [(24, 24), (30, 12), (6, 6), (3, 40), (1, 1)] {
            let scene = rect_scene(w, h, 5, 9);
            assert_eq!(scene.dimensions(), (w, h));
        }
    }

    #[test]
    fn test_rect_scene_is_seeded() {
        assert_eq!(rect_scene(48, 20, 6, 3), rect_scene(48, 20, 6, 3));
        assert_ne!(rect_scene(48, 20, 6, 3), rect_scene(48, 20, 6, 4));
    }
}
