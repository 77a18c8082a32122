//! The three enhancement stages of the per-image pipeline.
//!
//! Every stage takes its input buffer by value and releases it before returning, so at
//! most one input and one output image are alive at a time. Working planes are
//! allocated fallibly; an allocation failure is reported instead of aborting.

pub mod contrast;
pub mod denoise;
pub mod detail;

pub use contrast::enhance_contrast;
pub use denoise::denoise;
pub use detail::{enhance_detail, sharpen};
