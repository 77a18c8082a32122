//! Batch enhancement and panorama stitching for raster tiles.
//!
//! A batch of uploaded images passes the [`governor::ResourceGovernor`], runs through
//! the three-stage [`pipeline::ImagePipeline`] (denoise, CLAHE contrast, detail) with
//! per-stage statistics, is persisted to a [`session::SessionStore`] and, for 2 to 5
//! successful images, is stitched into a panorama by the [`stitch::Stitcher`].
//! [`batch::BatchProcessor`] ties these together.

pub mod batch;
pub mod codec;
pub mod color;
pub mod config;
pub mod error;
pub mod governor;
pub mod pipeline;
pub mod prelude;
pub mod session;
pub mod stages;
pub mod stats;
pub mod stitch;
pub mod upload;

#[cfg(test)]
pub mod testing;

pub use batch::{BatchProcessor, BatchReport, UploadedFile};
pub use config::Config;
pub use error::{Error, Result};
