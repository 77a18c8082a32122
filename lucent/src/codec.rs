//! Decoding and encoding of raster containers.
//!
//! The core never parses container formats itself; it talks to a [`Decoder`]. The
//! default [`ImageCrateDecoder`] is backed by the `image` crate.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, ImageFormat, ImageReader, RgbImage};
use thiserror::Error;

/// JPEG quality used for processed outputs and the panorama.
pub const JPEG_QUALITY: u8 = 95;

/// Why a decoder rejected a buffer.
#[derive(Debug, Error)]
pub enum DecodeFailure {
    #[error("{0}")]
    Malformed(String),

    #[error("decoder allocation limit exceeded: {0}")]
    OutOfMemory(String),
}

impl From<ImageError> for DecodeFailure {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Limits(limits) => DecodeFailure::OutOfMemory(limits.to_string()),
            other => DecodeFailure::Malformed(other.to_string()),
        }
    }
}

impl From<std::io::Error> for DecodeFailure {
    fn from(err: std::io::Error) -> Self {
        DecodeFailure::Malformed(err.to_string())
    }
}

/// Turns encoded bytes into pixels.
pub trait Decoder: Send + Sync {
    /// Reads only the container header and returns `(width, height)`.
    fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), DecodeFailure>;

    /// Fully decodes to 8-bit RGB.
    fn decode(&self, bytes: &[u8]) -> Result<RgbImage, DecodeFailure>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl Decoder for ImageCrateDecoder {
    fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), DecodeFailure> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        Ok(reader.into_dimensions()?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<RgbImage, DecodeFailure> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        Ok(reader.decode()?.into_rgb8())
    }
}

/// Container written for an output entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    /// JPEG for `.jpg`/`.jpeg` names, PNG for everything else.
    pub fn for_name(name: &str) -> Self {
        if common::file_utils::has_extension(name, &["jpg", "jpeg"]) {
            OutputFormat::Jpeg
        } else {
            OutputFormat::Png
        }
    }
}

pub fn encode(image: &RgbImage, format: OutputFormat) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(image)?;
        }
        OutputFormat::Png => {
            image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        }
    }
    Ok(bytes)
}
