//! Detail enhancement: fixed sharpening kernel or edge-aware detail boost.

use std::collections::TryReserveError;

use common::Buffer2;
use image::RgbImage;
use rayon::prelude::*;

use crate::color::YCbCr;
use crate::config::DetailStrategy;

/// Iterations of the recursive edge-aware filter.
const EDGE_AWARE_ITERATIONS: i32 = 3;

/// Gain applied to the detail layer by the edge-aware strategy.
const DETAIL_GAIN: f32 = 2.0;

/// Runs the configured strategy over `image`, consuming it.
pub fn enhance_detail(
    image: RgbImage,
    strategy: &DetailStrategy,
) -> Result<RgbImage, TryReserveError> {
    match *strategy {
        DetailStrategy::KernelSharpen => Ok(sharpen(image)),
        DetailStrategy::EdgeAware { sigma_s, sigma_r } => edge_aware(image, sigma_s, sigma_r),
    }
}

// ============================================================================
// Kernel sharpening
// ============================================================================

/// 3×3 kernel `[0 -1 0; -1 5 -1; 0 -1 0]` per channel with replicated borders.
pub fn sharpen(image: RgbImage) -> RgbImage {
    let (w, h) = (image.width() as usize, image.height() as usize);
    if w == 0 || h == 0 {
        return image;
    }
    let src = image.as_raw();
    let at = |x: usize, y: usize, c: usize| src[(y * w + x) * 3 + c] as i32;

    let mut out = RgbImage::new(w as u32, h as u32);
    out.par_chunks_mut(w * 3).enumerate().for_each(|(y, row)| {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(h - 1);
        for x in 0..w {
            let left = x.saturating_sub(1);
            let right = (x + 1).min(w - 1);
            for c in 0..3 {
                let v = 5 * at(x, y, c)
                    - at(x, up, c)
                    - at(x, down, c)
                    - at(left, y, c)
                    - at(right, y, c);
                row[x * 3 + c] = v.clamp(0, 255) as u8;
            }
        }
    });
    out
}

// ============================================================================
// Edge-aware enhancement
// ============================================================================

/// Splits luminance into an edge-preserving base and a detail layer, then boosts
/// the detail: `Y' = base + 2 (Y - base)`. Chroma is untouched.
fn edge_aware(image: RgbImage, sigma_s: f32, sigma_r: f32) -> Result<RgbImage, TryReserveError> {
    if image.width() == 0 || image.height() == 0 {
        return Ok(image);
    }
    let mut planes = YCbCr::from_rgb(&image)?;
    drop(image);

    for v in planes.y.iter_mut() {
        *v /= 255.0;
    }
    let base = domain_transform(&planes.y, sigma_s, sigma_r, EDGE_AWARE_ITERATIONS)?;
    for (y, b) in planes.y.iter_mut().zip(base.iter()) {
        let boosted = b + DETAIL_GAIN * (*y - b);
        *y = (boosted * 255.0).clamp(0.0, 255.0);
    }

    Ok(planes.to_rgb())
}

/// Recursive-filter domain transform on a plane normalized to 0..1.
///
/// Each iteration runs a horizontal pass over rows and a vertical pass over the
/// transposed plane, with the per-iteration sigma shrinking geometrically.
pub fn domain_transform(
    plane: &Buffer2<f32>,
    sigma_s: f32,
    sigma_r: f32,
    iterations: i32,
) -> Result<Buffer2<f32>, TryReserveError> {
    let ratio = sigma_s / sigma_r;
    let dx = distances(plane, ratio)?;
    let dy_t = distances(&plane.transposed(), ratio)?;

    let mut out = plane.clone();
    let norm = (4f32.powi(iterations) - 1.0).sqrt();
    for i in 0..iterations {
        let sigma_h = sigma_s * 3f32.sqrt() * 2f32.powi(iterations - i - 1) / norm;
        let a = (-(2f32.sqrt()) / sigma_h).exp();

        filter_rows(&mut out, &dx, a);
        let mut transposed = out.transposed();
        filter_rows(&mut transposed, &dy_t, a);
        out = transposed.transposed();
    }
    Ok(out)
}

/// `d[x] = 1 + ratio · |I(x) - I(x-1)|` along rows; column 0 is unused.
fn distances(plane: &Buffer2<f32>, ratio: f32) -> Result<Buffer2<f32>, TryReserveError> {
    let w = plane.width();
    let mut d = Buffer2::try_new_filled(w, plane.height(), 1.0f32)?;
    d.par_chunks_mut(w)
        .zip(plane.par_chunks(w))
        .for_each(|(drow, row)| {
            for x in 1..w {
                drow[x] = 1.0 + ratio * (row[x] - row[x - 1]).abs();
            }
        });
    Ok(d)
}

/// Causal then anti-causal first-order recursive pass along every row.
fn filter_rows(plane: &mut Buffer2<f32>, d: &Buffer2<f32>, a: f32) {
    let w = plane.width();
    if w < 2 {
        return;
    }
    plane
        .par_chunks_mut(w)
        .zip(d.par_chunks(w))
        .for_each(|(row, drow)| {
            for x in 1..w {
                let weight = a.powf(drow[x]);
                row[x] += weight * (row[x - 1] - row[x]);
            }
            for x in (0..w - 1).rev() {
                let weight = a.powf(drow[x + 1]);
                row[x] += weight * (row[x + 1] - row[x]);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::channel_std_dev;
    use image::Rgb;

    #[test]
    fn test_sharpen_keeps_flat_regions() {
        let image = RgbImage::from_pixel(9, 7, Rgb([12, 128, 250]));
        assert_eq!(sharpen(image.clone()), image);
    }

    #[test]
    fn test_sharpen_impulse() {
        let mut image = RgbImage::from_pixel(5, 5, Rgb([100, 100, 100]));
        image.put_pixel(2, 2, Rgb([120, 120, 120]));
        let out = sharpen(image);
        // 5·120 − 4·100 = 200 at the centre, 5·100 − 3·100 − 120 = 80 beside it.
        assert_eq!(out.get_pixel(2, 2)[0], 200);
        assert_eq!(out.get_pixel(1, 2)[0], 80);
        assert_eq!(out.get_pixel(2, 3)[1], 80);
        assert_eq!(out.get_pixel(1, 1)[2], 100);
    }

    #[test]
    fn test_sharpen_clamps() {
        let mut image = RgbImage::from_pixel(3, 3, Rgb([0, 0, 0]));
        image.put_pixel(1, 1, Rgb([255, 255, 255]));
        let out = sharpen(image);
        assert_eq!(out.get_pixel(1, 1)[0], 255);
        assert_eq!(out.get_pixel(0, 1)[0], 0);
    }

    #[test]
    fn test_sharpen_replicates_border() {
        // A horizontal ramp is linear, so the Laplacian vanishes everywhere except
        // where the replicated border breaks linearity.
        let image = RgbImage::from_fn(6, 4, |x, _| Rgb([(50 + 10 * x) as u8; 3]));
        let out = sharpen(image);
        for y in 0..4 {
            for x in 1..5 {
                assert_eq!(out.get_pixel(x, y)[0], (50 + 10 * x) as u8);
            }
            assert_eq!(out.get_pixel(0, y)[0], 40);
            assert_eq!(out.get_pixel(5, y)[0], 110);
        }
    }

    #[test]
    fn test_domain_transform_flat_plane() {
        let plane = Buffer2::new_filled(16, 9, 0.4f32);
        let out = domain_transform(&plane, 10.0, 0.15, 3).unwrap();
        assert!(out.iter().all(|&v| (v - 0.4).abs() < 1e-5));
    }

    #[test]
    fn test_domain_transform_preserves_step() {
        let plane = Buffer2::new(
            20,
            4,
            (0..80).map(|i| if i % 20 < 10 { 0.1 } else { 0.9 }).collect(),
        );
        let out = domain_transform(&plane, 10.0, 0.15, 3).unwrap();
        assert!(*out.get(8, 2) < 0.15);
        assert!(*out.get(11, 2) > 0.85);
    }

    #[test]
    fn test_domain_transform_smooths_texture() {
        let plane = Buffer2::new(
            32,
            32,
            (0..1024)
                .map(|i| if (i % 32 + i / 32) % 2 == 0 { 0.48 } else { 0.52 })
                .collect(),
        );
        let out = domain_transform(&plane, 10.0, 0.15, 3).unwrap();
        assert!(out.iter().all(|&v| (v - 0.5).abs() < 0.015));
    }

    #[test]
    fn test_edge_aware_boosts_detail() {
        let image = RgbImage::from_fn(48, 48, |x, y| {
            let v = if (x / 2 + y / 2) % 2 == 0 { 118 } else { 138 };
            Rgb([v, v, v])
        });
        let before = channel_std_dev(&image);
        let out = enhance_detail(image, &DetailStrategy::edge_aware()).unwrap();
        assert_eq!(out.dimensions(), (48, 48));
        assert!(channel_std_dev(&out) > before * 1.15);
    }

    #[test]
    fn test_edge_aware_keeps_flat_image() {
        let image = RgbImage::from_pixel(12, 10, Rgb([70, 90, 110]));
        let out = enhance_detail(image.clone(), &DetailStrategy::edge_aware()).unwrap();
        for (a, b) in image.pixels().zip(out.pixels()) {
            for c in 0..3 {
                assert!(a[c].abs_diff(b[c]) <= 1);
            }
        }
    }
}
