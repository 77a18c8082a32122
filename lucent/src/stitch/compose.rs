//! Canvas layout and feathered composition of registered images.

use std::collections::TryReserveError;

use glam::DVec2;
use image::RgbImage;
use rayon::prelude::*;

use super::homography::{Homography, frame_corners};

/// Axis-aligned panorama bounds in the reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    /// Reference-frame position of canvas pixel `(0, 0)`.
    pub origin: DVec2,
}

impl Canvas {
    /// Bounds of every image corner mapped through its transform.
    ///
    /// `None` when a corner is not finite.
    pub fn enclosing(sizes: &[(u32, u32)], transforms: &[Homography]) -> Option<Canvas> {
        let mut min = DVec2::splat(f64::INFINITY);
        let mut max = DVec2::splat(f64::NEG_INFINITY);
        for (&(w, h), transform) in sizes.iter().zip(transforms) {
            for corner in frame_corners(w, h) {
                let p = transform.apply(corner)?;
                min = min.min(p);
                max = max.max(p);
            }
        }
        if !min.is_finite() || !max.is_finite() {
            return None;
        }

        let origin = min.floor();
        let extent = (max.ceil() - origin) + DVec2::ONE;
        if extent.x > u32::MAX as f64 || extent.y > u32::MAX as f64 {
            return None;
        }
        Some(Canvas {
            width: extent.x as u32,
            height: extent.y as u32,
            origin,
        })
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Inverse-maps every canvas pixel into each image and blends the bilinear samples,
/// weighting each image by the distance to its nearest border.
pub fn compose(
    images: &[&RgbImage],
    transforms: &[Homography],
    canvas: &Canvas,
) -> Result<RgbImage, TryReserveError> {
    // Canvas → image mappings; non-invertible transforms contribute nothing.
    let inverses: Vec<(&RgbImage, Homography)> = images
        .iter()
        .zip(transforms)
        .filter_map(|(image, transform)| Some((*image, transform.inverse()?)))
        .collect();

    let width = canvas.width as usize;
    let len = width * canvas.height as usize * 3;
    let mut raw: Vec<u8> = Vec::new();
    raw.try_reserve_exact(len)?;
    raw.resize(len, 0);

    if width > 0 {
        raw.par_chunks_mut(width * 3).enumerate().for_each(|(y, row)| {
            let cy = canvas.origin.y + y as f64;
            for (x, out) in row.chunks_exact_mut(3).enumerate() {
                let p = DVec2::new(canvas.origin.x + x as f64, cy);
                let mut sum = [0.0f64; 3];
                let mut weight = 0.0f64;

                for (image, inverse) in &inverses {
                    let Some(src) = inverse.apply(p) else {
                        continue;
                    };
                    let w = feather_weight(image, src);
                    if w <= 0.0 {
                        continue;
                    }
                    let sample = interpolate_bilinear(image, src);
                    for c in 0..3 {
                        sum[c] += sample[c] * w;
                    }
                    weight += w;
                }

                if weight > 0.0 {
                    for c in 0..3 {
                        out[c] = (sum[c] / weight).round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        });
    }

    Ok(RgbImage::from_raw(canvas.width, canvas.height, raw)
        .unwrap_or_else(|| RgbImage::new(canvas.width, canvas.height)))
}

/// Distance to the nearest image border plus one; zero outside the image.
#[inline]
fn feather_weight(image: &RgbImage, p: DVec2) -> f64 {
    let (w, h) = (image.width() as f64, image.height() as f64);
    if p.x < 0.0 || p.y < 0.0 || p.x > w - 1.0 || p.y > h - 1.0 {
        return 0.0;
    }
    (p.x + 1.0).min(w - p.x).min(p.y + 1.0).min(h - p.y)
}

/// Bilinear sample at `p`; neighbours past the last row/column are clamped.
#[inline]
fn interpolate_bilinear(image: &RgbImage, p: DVec2) -> [f64; 3] {
    let max_x = image.width() - 1;
    let max_y = image.height() - 1;
    let x0 = (p.x.floor().max(0.0) as u32).min(max_x);
    let y0 = (p.y.floor().max(0.0) as u32).min(max_y);
    let x1 = (x0 + 1).min(max_x);
    let y1 = (y0 + 1).min(max_y);
    let fx = (p.x - x0 as f64).clamp(0.0, 1.0);
    let fy = (p.y - y0 as f64).clamp(0.0, 1.0);

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut out = [0.0; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = top * (1.0 - fy) + bottom * fy;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_canvas_for_identity_matches_image() {
        let canvas = Canvas::enclosing(&[(40, 30)], &[Homography::IDENTITY]).unwrap();
        assert_eq!((canvas.width, canvas.height), (40, 30));
        assert_eq!(canvas.origin, DVec2::ZERO);
    }

    #[test]
    fn test_canvas_spans_translated_images() {
        let sizes = [(40, 30), (40, 30)];
        let transforms = [Homography::IDENTITY, Homography::translation(25.0, -5.0)];
        let canvas = Canvas::enclosing(&sizes, &transforms).unwrap();
        assert_eq!(canvas.origin, DVec2::new(0.0, -5.0));
        assert_eq!((canvas.width, canvas.height), (65, 35));
        assert_eq!(canvas.pixel_count(), 65 * 35);
    }

    #[test]
    fn test_compose_single_image_is_identity() {
        let image = RgbImage::from_fn(20, 10, |x, y| Rgb([x as u8 * 10, y as u8 * 20, 7]));
        let transforms = [Homography::IDENTITY];
        let canvas = Canvas::enclosing(&[(20, 10)], &transforms).unwrap();
        let out = compose(&[&image], &transforms, &canvas).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_compose_blends_overlap_and_keeps_exclusive_regions() {
        let left = RgbImage::from_pixel(30, 10, Rgb([200, 0, 0]));
        let right = RgbImage::from_pixel(30, 10, Rgb([0, 0, 200]));
        let transforms = [Homography::IDENTITY, Homography::translation(20.0, 0.0)];
        let canvas = Canvas::enclosing(&[(30, 10), (30, 10)], &transforms).unwrap();
        let out = compose(&[&left, &right], &transforms, &canvas).unwrap();

        assert_eq!(out.dimensions(), (50, 10));
        assert_eq!(out.get_pixel(5, 5), &Rgb([200, 0, 0]));
        assert_eq!(out.get_pixel(45, 5), &Rgb([0, 0, 200]));
        let mid = out.get_pixel(24, 5);
        assert!(mid[0] > 0 && mid[2] > 0, "{mid:?}");
    }

    #[test]
    fn test_uncovered_canvas_is_black() {
        let image = RgbImage::from_pixel(10, 10, Rgb([90, 90, 90]));
        let transforms = [Homography::IDENTITY];
        let canvas = Canvas {
            width: 20,
            height: 10,
            origin: DVec2::ZERO,
        };
        let out = compose(&[&image], &transforms, &canvas).unwrap();
        assert_eq!(out.get_pixel(15, 5), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(5, 5), &Rgb([90, 90, 90]));
    }

    #[test]
    fn test_feather_weight_peaks_in_the_middle() {
        let image = RgbImage::new(21, 21);
        let centre = feather_weight(&image, DVec2::new(10.0, 10.0));
        let edge = feather_weight(&image, DVec2::new(0.0, 10.0));
        assert!(centre > edge && edge > 0.0);
        assert_eq!(feather_weight(&image, DVec2::new(-0.5, 3.0)), 0.0);
    }
}
