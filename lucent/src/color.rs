//! Full-range BT.601 YCbCr conversion (JPEG convention) on planar `f32` buffers.
//!
//! Planes keep the 0..255 scale of the source so that chroma round-trips to within
//! one level.

use std::collections::TryReserveError;

use common::Buffer2;
use image::{Rgb, RgbImage};

/// Luminance and chrominance planes of one image.
#[derive(Debug, Clone)]
pub struct YCbCr {
    pub y: Buffer2<f32>,
    pub cb: Buffer2<f32>,
    pub cr: Buffer2<f32>,
}

impl YCbCr {
    pub fn from_rgb(image: &RgbImage) -> Result<Self, TryReserveError> {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let mut y = Buffer2::try_new_filled(w, h, 0.0f32)?;
        let mut cb = Buffer2::try_new_filled(w, h, 0.0f32)?;
        let mut cr = Buffer2::try_new_filled(w, h, 0.0f32)?;

        let planes = y
            .pixels_mut()
            .iter_mut()
            .zip(cb.pixels_mut())
            .zip(cr.pixels_mut());
        for (px, ((luma, blue), red)) in image.pixels().zip(planes) {
            (*luma, *blue, *red) = rgb_to_ycbcr(px.0);
        }

        Ok(Self { y, cb, cr })
    }

    pub fn width(&self) -> usize {
        self.y.width()
    }

    pub fn height(&self) -> usize {
        self.y.height()
    }

    pub fn to_rgb(&self) -> RgbImage {
        let (w, h) = (self.width(), self.height());
        RgbImage::from_fn(w as u32, h as u32, |x, y| {
            let i = (x as usize, y as usize);
            Rgb(ycbcr_to_rgb(self.y[i], self.cb[i], self.cr[i]))
        })
    }
}

#[inline]
pub fn rgb_to_ycbcr([r, g, b]: [u8; 3]) -> (f32, f32, f32) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    (y, cb, cr)
}

#[inline]
pub fn ycbcr_to_rgb(y: f32, cb: f32, cr: f32) -> [u8; 3] {
    let cb = cb - 128.0;
    let cr = cr - 128.0;
    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;
    [to_u8(r), to_u8(g), to_u8(b)]
}

#[inline]
pub fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
