//! Patch-based non-local-means denoising.
//!
//! For every search offset the squared colour difference between each pixel and its
//! shifted counterpart is summed into an exact `u64` integral image, so every patch
//! distance costs four lookups regardless of the template size.

use std::collections::TryReserveError;

use common::Buffer2;
use image::RgbImage;
use rayon::prelude::*;

use crate::config::DenoiseParams;

#[derive(Debug, Clone, Copy, Default)]
struct Accum {
    sum: [f32; 3],
    weight: f32,
    max_weight: f32,
}

/// Denoises `image`, consuming it. Output dimensions match the input.
pub fn denoise(image: RgbImage, params: &DenoiseParams) -> Result<RgbImage, TryReserveError> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    if w == 0 || h == 0 || params.search_window < 3 {
        return Ok(image);
    }

    let t = (params.template_window / 2) as isize;
    let s = (params.search_window / 2) as isize;
    let h2 = (params.strength * params.strength).max(f32::EPSILON);
    let src = image.as_raw();

    let mut integral = Buffer2::try_new_filled(w + 1, h + 1, 0u64)?;
    let mut accum = Buffer2::try_new_filled(w, h, Accum::default())?;

    for dy in -s..=s {
        for dx in -s..=s {
            if dx == 0 && dy == 0 {
                continue;
            }
            build_distance_integral(src, w, h, dx, dy, &mut integral);
            let integral = &integral;

            accum
                .par_chunks_mut(w)
                .enumerate()
                .for_each(|(y, row)| {
                    let y0 = (y as isize - t).max(0) as usize;
                    let y1 = (y as isize + t).min(h as isize - 1) as usize;
                    let ny = (y as isize + dy).clamp(0, h as isize - 1) as usize;

                    for (x, acc) in row.iter_mut().enumerate() {
                        let x0 = (x as isize - t).max(0) as usize;
                        let x1 = (x as isize + t).min(w as isize - 1) as usize;

                        let sum = (integral[(x1 + 1, y1 + 1)] + integral[(x0, y0)])
                            - (integral[(x0, y1 + 1)] + integral[(x1 + 1, y0)]);
                        let samples = ((x1 - x0 + 1) * (y1 - y0 + 1) * 3) as f32;
                        let d2 = sum as f32 / samples;
                        let weight = (-d2 / h2).exp();

                        let nx = (x as isize + dx).clamp(0, w as isize - 1) as usize;
                        let n = (ny * w + nx) * 3;
                        for c in 0..3 {
                            acc.sum[c] += weight * src[n + c] as f32;
                        }
                        acc.weight += weight;
                        acc.max_weight = acc.max_weight.max(weight);
                    }
                });
        }
    }
    drop(integral);

    let mut out = image;
    out.par_chunks_mut(w * 3)
        .zip(accum.par_chunks(w))
        .for_each(|(row, acc_row)| {
            for (px, acc) in row.chunks_exact_mut(3).zip(acc_row) {
                // The centre pixel weighs as much as its most similar neighbour.
                let centre = if acc.max_weight > 0.0 {
                    acc.max_weight
                } else {
                    1.0
                };
                let total = acc.weight + centre;
                for c in 0..3 {
                    let v = (acc.sum[c] + centre * px[c] as f32) / total;
                    px[c] = crate::color::to_u8(v);
                }
            }
        });

    Ok(out)
}

/// Fills `integral` with the summed-area table of per-pixel squared RGB differences
/// between the image and the image shifted by `(dx, dy)` (replicated borders).
fn build_distance_integral(
    src: &[u8],
    w: usize,
    h: usize,
    dx: isize,
    dy: isize,
    integral: &mut Buffer2<u64>,
) {
    for y in 0..h {
        let ny = (y as isize + dy).clamp(0, h as isize - 1) as usize;
        let mut row_sum = 0u64;
        for x in 0..w {
            let nx = (x as isize + dx).clamp(0, w as isize - 1) as usize;
            let p = (y * w + x) * 3;
            let q = (ny * w + nx) * 3;
            for c in 0..3 {
                let d = src[p + c] as i32 - src[q + c] as i32;
                row_sum += (d * d) as u64;
            }
            integral[(x + 1, y + 1)] = integral[(x + 1, y)] + row_sum;
        }
    }
}
