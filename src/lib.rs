//! Square avatar thumbnails.
//!
//! A decoded source is cropped to its centered square, halved while it is
//! still at least twice the target, bilinear-resized to the exact target
//! width, and JPEG-encoded:
//!
//! ```no_run
//! use avatarscale::{PixelBuffer, ScaleConfig, ScalePipeline};
//!
//! # fn main() -> avatarscale::Result<()> {
//! let pipeline = ScalePipeline::new(ScaleConfig::default())?;
//! let src = PixelBuffer::filled(400, 300, [200, 100, 50, 255])?;
//! let jpeg = pipeline.run(src)?;
//! assert_eq!((jpeg.width, jpeg.height), (100, 100));
//! # Ok(())
//! # }
//! ```
//!
//! Around that core sit the pieces that feed and drain it: [`decode`] to
//! refuse non-images, [`upload`] to POST the result, and [`avatars`] +
//! [`api`] for the receiving server.

pub mod api; // HTTP routes
pub mod avatars; // Avatar files on disk
pub mod bilinear; // Exact-width bilinear resize
pub mod cancel; // Cooperative cancellation
pub mod config; // ScaleConfig
pub mod crop; // Centered square crop
pub mod decode; // Bytes -> PixelBuffer
pub mod encode; // PixelBuffer -> JPEG
pub mod halve; // 2x area reduction
pub mod pipeline; // Orchestration
pub mod pixbuf; // RGBA raster
pub mod primitive; // Primitives + essential dependencies
pub mod upload; // Client-side upload

pub use crate::{
    cancel::CancelToken,
    config::ScaleConfig,
    encode::{EncodedFormat, EncodedImage},
    halve::{AreaResample, BoxAverage, FilterResample},
    pipeline::{ScalePipeline, ScaleStage},
    pixbuf::PixelBuffer,
    primitive::{Result, ScaleError},
};
