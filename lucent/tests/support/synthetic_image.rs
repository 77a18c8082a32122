use image::{Rgb, RgbImage};
use lucent::UploadedFile;
use lucent::codec::{OutputFormat, encode};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Random coloured rectangles over a gradient background.
pub fn tile(width: u32, height: u32, rects: usize, seed: u64) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut image = RgbImage::from_fn(width, height, |x, y| {
        let v = 60 + (x * 80 / width.max(1)) as u8 + (y * 40 / height.max(1)) as u8;
        Rgb([v, v, v.saturating_add(10)])
    });
    for _ in 0..rects {
        let w = rng.random_range(4..=(width / 8).max(4));
        let h = rng.random_range(4..=(height / 8).max(4));
        let x0 = rng.random_range(0..width.saturating_sub(w).max(1));
        let y0 = rng.random_range(0..height.saturating_sub(h).max(1));
        let color = Rgb([
            rng.random_range(0..=255u8),
            rng.random_range(0..=255u8),
            rng.random_range(0..=255u8),
        ]);
        for y in y0..(y0 + h).min(height) {
            for x in x0..(x0 + w).min(width) {
                image.put_pixel(x, y, color);
            }
        }
    }
    image
}

pub fn jpeg_file(name: &str, image: &RgbImage) -> UploadedFile {
    UploadedFile::new(name, encode(image, OutputFormat::Jpeg).expect("jpeg encode"))
}

pub fn png_file(name: &str, image: &RgbImage) -> UploadedFile {
    UploadedFile::new(name, encode(image, OutputFormat::Png).expect("png encode"))
}

/// Bytes that start like a JPEG but end right after the marker.
pub fn corrupt_jpeg(name: &str) -> UploadedFile {
    UploadedFile::new(name, vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F'])
}
