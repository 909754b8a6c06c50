//! Primitives and essential dependencies

use std::time::SystemTime;

// Reexport or redefine types.

/// UTC DateTime
pub type DateTime = chrono::DateTime<chrono::Utc>;

/// Anyhow error
pub use anyhow;

/// Tracing
pub use tracing;

/// Attempt to convert a [`SystemTime`] (returned on file statistics calls)
/// to the DateTime type.
pub fn systime2datetime(t: SystemTime) -> Option<DateTime> {
    use chrono::TimeZone;

    t.duration_since(std::time::UNIX_EPOCH)
        .ok()
        .and_then(|d| {
            chrono::Utc
                .timestamp_opt(d.as_secs() as i64, d.subsec_nanos())
                .single()
        })
}

/// Everything that can go wrong while turning a source image into an
/// encoded thumbnail.
///
/// There is no partial output. Any of these aborts the whole run.
#[derive(Debug, thiserror::Error)]
pub enum ScaleError {
    /// Zero-sized, mis-sized, or undecodable input. The pipeline does not run.
    #[error("invalid image: {msg}")]
    InvalidImage {
        msg: String,
        #[source]
        source: Option<image::ImageError>,
    },

    /// Target width of zero, or a resize that would upscale.
    #[error("unsupported scale: {0}")]
    UnsupportedScale(String),

    /// The codec rejected the buffer.
    #[error("encoding failed: {msg}")]
    EncodingFailed {
        msg: String,
        #[source]
        source: Option<image::ImageError>,
    },

    /// A configuration value is out of range or could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was cancelled, or its deadline passed, between stages.
    #[error("cancelled after {0}")]
    Cancelled(&'static str),
}

impl ScaleError {
    /// [`ScaleError::InvalidImage`] without an underlying codec error.
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        ScaleError::InvalidImage {
            msg: msg.into(),
            source: None,
        }
    }

    /// [`ScaleError::EncodingFailed`] without an underlying codec error.
    pub fn encoding_failed(msg: impl Into<String>) -> Self {
        ScaleError::EncodingFailed {
            msg: msg.into(),
            source: None,
        }
    }
}

/// Library Result.
pub type Result<T> = std::result::Result<T, ScaleError>;
