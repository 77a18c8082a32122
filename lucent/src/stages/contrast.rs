//! Contrast-limited adaptive histogram equalization on the luminance channel.
//!
//! The image is split into a `tiles_x × tiles_y` grid. Every tile gets a clipped,
//! redistributed histogram and its own lookup table; each pixel is remapped by
//! bilinear interpolation between the LUTs of the four nearest tile centres.
//! Chroma is left untouched.

use std::collections::TryReserveError;

use common::Buffer2;
use image::RgbImage;
use rayon::prelude::*;

use crate::color::{YCbCr, to_u8};
use crate::config::ClaheParams;

/// Equalizes the luminance of `image`, consuming it.
pub fn enhance_contrast(
    image: RgbImage,
    params: &ClaheParams,
) -> Result<RgbImage, TryReserveError> {
    if image.width() == 0 || image.height() == 0 {
        return Ok(image);
    }
    let mut planes = YCbCr::from_rgb(&image)?;
    drop(image);

    clahe(&mut planes.y, params);
    Ok(planes.to_rgb())
}

/// Applies CLAHE in place to a luminance plane on the 0..255 scale.
pub fn clahe(luma: &mut Buffer2<f32>, params: &ClaheParams) {
    let (w, h) = (luma.width(), luma.height());
    if w == 0 || h == 0 {
        return;
    }

    let tile_w = w.div_ceil(params.tiles_x.max(1));
    let tile_h = h.div_ceil(params.tiles_y.max(1));
    let cols = w.div_ceil(tile_w);
    let rows = h.div_ceil(tile_h);

    let luts: Vec<[u8; 256]> = (0..rows * cols)
        .into_par_iter()
        .map(|i| {
            let (tx, ty) = (i % cols, i / cols);
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            let tile_pixels = (x1 - x0) * (y1 - y0);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for &v in &luma.row(y)[x0..x1] {
                    hist[to_u8(v) as usize] += 1;
                }
            }
            if params.clip_limit > 0.0 {
                clip_histogram(&mut hist, tile_pixels, params.clip_limit);
            }
            build_lut(&hist, tile_pixels)
        })
        .collect();

    let tile_cx = |tx: usize| (tx as f32 + 0.5) * tile_w as f32;
    let tile_cy = |ty: usize| (ty as f32 + 0.5) * tile_h as f32;

    luma.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let fy = y as f32 / tile_h as f32 - 0.5;
        let ty0 = (fy.floor() as isize).max(0) as usize;
        let ty1 = (ty0 + 1).min(rows - 1);
        let ay = if ty0 == ty1 {
            0.0
        } else {
            ((y as f32 - tile_cy(ty0)) / (tile_cy(ty1) - tile_cy(ty0))).clamp(0.0, 1.0)
        };

        for (x, value) in row.iter_mut().enumerate() {
            let fx = x as f32 / tile_w as f32 - 0.5;
            let tx0 = (fx.floor() as isize).max(0) as usize;
            let tx1 = (tx0 + 1).min(cols - 1);
            let ax = if tx0 == tx1 {
                0.0
            } else {
                ((x as f32 - tile_cx(tx0)) / (tile_cx(tx1) - tile_cx(tx0))).clamp(0.0, 1.0)
            };

            let v = to_u8(*value) as usize;
            let v00 = luts[ty0 * cols + tx0][v] as f32;
            let v10 = luts[ty0 * cols + tx1][v] as f32;
            let v01 = luts[ty1 * cols + tx0][v] as f32;
            let v11 = luts[ty1 * cols + tx1][v] as f32;

            *value = v00 * (1.0 - ax) * (1.0 - ay)
                + v10 * ax * (1.0 - ay)
                + v01 * (1.0 - ax) * ay
                + v11 * ax * ay;
        }
    });
}

/// Clips bins at `clip_multiplier × (total / 256)` and spreads the excess evenly.
///
/// The residual that does not divide into 256 goes to equally spaced bins, so flat
/// tiles are not biased towards the dark end.
fn clip_histogram(hist: &mut [u32; 256], total_pixels: usize, clip_multiplier: f32) {
    let clip_val = ((total_pixels as f32 / 256.0) * clip_multiplier).ceil().max(1.0) as u32;

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip_val {
            excess += *bin - clip_val;
            *bin = clip_val;
        }
    }

    let per_bin = excess / 256;
    for bin in hist.iter_mut() {
        *bin += per_bin;
    }
    let residual = (excess % 256) as usize;
    if residual > 0 {
        let step = (256 / residual).max(1);
        for bin in hist.iter_mut().step_by(step).take(residual) {
            *bin += 1;
        }
    }
}

/// LUT from the histogram's CDF, stretched so the lowest occupied bin maps to 0.
fn build_lut(hist: &[u32; 256], total: usize) -> [u8; 256] {
    let mut cdf = [0u32; 256];
    cdf[0] = hist[0];
    for i in 1..256 {
        cdf[i] = cdf[i - 1] + hist[i];
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let denom = total as f32 - cdf_min as f32;

    let mut lut = [0u8; 256];
    if denom <= 0.0 {
        // Single-valued tile without clipping: leave it as is.
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    for i in 0..256 {
        let val = (cdf[i] as f32 - cdf_min as f32) / denom * 255.0;
        lut[i] = val.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContrastPreset;
    use crate::testing::channel_std_dev;
    use image::Rgb;

    /// Gray ramp whose every 32×32 and 64×64 tile holds each level equally often.
    fn equalized_ramp() -> RgbImage {
        RgbImage::from_fn(256, 256, |x, y| {
            let v = ((8 * x + y) % 256) as u8;
            Rgb([v, v, v])
        })
    }

    fn max_abs_diff(a: &RgbImage, b: &RgbImage) -> u8 {
        a.as_raw()
            .iter()
            .zip(b.as_raw())
            .map(|(&p, &q)| p.abs_diff(q))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_clip_histogram_preserves_total() {
        let mut hist = [0u32; 256];
        hist[10] = 900;
        hist[200] = 124;
        clip_histogram(&mut hist, 1024, 3.0);
        assert_eq!(hist.iter().sum::<u32>(), 1024);
        assert!(hist[10] <= 12 + 4);
    }

    #[test]
    fn test_flat_tile_stays_near_its_level() {
        let mut hist = [0u32; 256];
        hist[80] = 64;
        clip_histogram(&mut hist, 64, 1.5);
        assert_eq!(hist.iter().sum::<u32>(), 64);
        let lut = build_lut(&hist, 64);
        assert!(lut[80].abs_diff(80) <= 8, "80 -> {}", lut[80]);
    }

    #[test]
    fn test_lut_for_uniform_histogram_is_identity() {
        let hist = [4u32; 256];
        let lut = build_lut(&hist, 1024);
        for (i, &v) in lut.iter().enumerate() {
            assert_eq!(v as usize, i);
        }
    }

    #[test]
    fn test_repeat_application_tolerance() {
        // CLAHE is not idempotent in general. Images whose tiles are already equalized
        // are a fixed point up to colour-conversion rounding: at most 1 level.
        for preset in [ContrastPreset::Standard, ContrastPreset::Constrained] {
            let params = preset.params();
            let input = equalized_ramp();
            let once = enhance_contrast(input.clone(), &params).unwrap();
            let twice = enhance_contrast(once.clone(), &params).unwrap();

            assert!(max_abs_diff(&input, &once) <= 1, "{preset}");
            assert!(max_abs_diff(&once, &twice) <= 1, "{preset}");
        }
    }

    #[test]
    fn test_stretches_low_contrast() {
        let input = RgbImage::from_fn(256, 256, |x, y| {
            let v = 100 + ((x + y) % 40) as u8;
            Rgb([v, v, v])
        });
        let out = enhance_contrast(input.clone(), &ContrastPreset::Standard.params()).unwrap();
        assert!(channel_std_dev(&out) > channel_std_dev(&input) * 1.5);
    }

    #[test]
    fn test_constrained_preset_is_gentler() {
        let input = RgbImage::from_fn(256, 256, |x, y| {
            let v = 100 + ((x * 3 + y) % 40) as u8;
            Rgb([v, v, v])
        });
        let standard = enhance_contrast(input.clone(), &ContrastPreset::Standard.params()).unwrap();
        let constrained =
            enhance_contrast(input.clone(), &ContrastPreset::Constrained.params()).unwrap();
        assert!(channel_std_dev(&constrained) < channel_std_dev(&standard));
    }

    #[test]
    fn test_chroma_untouched_for_gray_input() {
        let input = RgbImage::from_fn(40, 24, |x, _| {
            let v = (x * 6) as u8;
            Rgb([v, v, v])
        });
        let out = enhance_contrast(input, &ContrastPreset::Standard.params()).unwrap();
        for px in out.pixels() {
            assert!(px[0].abs_diff(px[1]) <= 1 && px[1].abs_diff(px[2]) <= 1);
        }
    }

    #[test]
    fn test_deterministic_and_shape_preserving() {
        let input = RgbImage::from_fn(33, 19, |x, y| Rgb([(x * 7) as u8, (y * 11) as u8, 60]));
        let params = ContrastPreset::Constrained.params();
        let a = enhance_contrast(input.clone(), &params).unwrap();
        let b = enhance_contrast(input, &params).unwrap();
        assert_eq!(a.dimensions(), (33, 19));
        assert_eq!(a, b);
    }
}
