//! FAST corners described with 256-bit BRIEF descriptors.

use std::sync::OnceLock;

use glam::DVec2;
use image::{GrayImage, RgbImage, imageops};
use imageproc::corners::{Corner, corners_fast9};
use imageproc::filter::gaussian_blur_f32;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Half-size of the square patch BRIEF samples from.
pub const PATCH_RADIUS: i32 = 15;
const DESCRIPTOR_BITS: usize = 256;
const PATTERN_SEED: u64 = 0xB41E_F000;
/// Pre-smoothing makes the pixel comparisons robust to noise.
const BLUR_SIGMA: f32 = 2.0;
const MIN_CELL_SIZE: u32 = 4;

/// Binary descriptor; distance is the Hamming distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    #[inline]
    pub fn distance(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Keypoints of one image and their descriptors, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub keypoints: Vec<DVec2>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detects up to `max_features` well-spread FAST-9 corners and describes them.
pub fn extract_features(image: &RgbImage, max_features: usize, fast_threshold: u8) -> Features {
    let gray = imageops::grayscale(image);
    let (w, h) = gray.dimensions();
    if w <= 2 * PATCH_RADIUS as u32 || h <= 2 * PATCH_RADIUS as u32 || max_features == 0 {
        return Features::default();
    }

    let corners = corners_fast9(&gray, fast_threshold);
    let corners = select_corners(corners, w, h, max_features);

    let smoothed = gaussian_blur_f32(&gray, BLUR_SIGMA);
    let pattern = brief_pattern();
    let descriptors = corners
        .par_iter()
        .map(|c| describe(&smoothed, c.x as i32, c.y as i32, pattern))
        .collect();

    Features {
        keypoints: corners
            .iter()
            .map(|c| DVec2::new(c.x as f64, c.y as f64))
            .collect(),
        descriptors,
    }
}

/// Drops corners whose patch leaves the frame, keeps the strongest corner per grid
/// cell and truncates to `max_features` by score.
fn select_corners(
    corners: Vec<Corner>,
    width: u32,
    height: u32,
    max_features: usize,
) -> Vec<Corner> {
    let margin = PATCH_RADIUS as u32;
    let cell = (((width as f64 * height as f64) / max_features as f64).sqrt().ceil() as u32)
        .max(MIN_CELL_SIZE);
    let cols = width.div_ceil(cell) as usize;
    let rows = height.div_ceil(cell) as usize;

    let mut best: Vec<Option<Corner>> = vec![None; cols * rows];
    for corner in corners {
        if corner.x < margin
            || corner.y < margin
            || corner.x >= width - margin
            || corner.y >= height - margin
        {
            continue;
        }
        let idx = (corner.y / cell) as usize * cols + (corner.x / cell) as usize;
        match &best[idx] {
            Some(kept) if kept.score >= corner.score => {}
            _ => best[idx] = Some(corner),
        }
    }

    let mut selected: Vec<Corner> = best.into_iter().flatten().collect();
    // Stable order for equal scores keeps extraction deterministic.
    selected.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });
    selected.truncate(max_features);
    selected
}

type PointPair = [(i32, i32); 2];

/// Fixed sampling pattern shared by every image.
fn brief_pattern() -> &'static [PointPair] {
    static PATTERN: OnceLock<Vec<PointPair>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
        let mut offset = || {
            (
                rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS),
                rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS),
            )
        };
        (0..DESCRIPTOR_BITS).map(|_| [offset(), offset()]).collect()
    })
}

fn describe(image: &GrayImage, x: i32, y: i32, pattern: &[PointPair]) -> Descriptor {
    let mut bits = [0u64; 4];
    for (i, [p1, p2]) in pattern.iter().enumerate() {
        let v1 = pixel_clamped(image, x + p1.0, y + p1.1);
        let v2 = pixel_clamped(image, x + p2.0, y + p2.1);
        if v1 > v2 {
            bits[i / 64] |= 1 << (i % 64);
        }
    }
    Descriptor(bits)
}

#[inline]
fn pixel_clamped(image: &GrayImage, x: i32, y: i32) -> u8 {
    let x = x.clamp(0, image.width() as i32 - 1) as u32;
    let y = y.clamp(0, image.height() as i32 - 1) as u32;
    image.get_pixel(x, y)[0]
}
