//! Pipeline configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::primitive::*;

/// Default output side, pixels.
pub const DEFAULT_MAX_WIDTH: u32 = 100;

/// Default lossy quality.
pub const DEFAULT_QUALITY: f32 = 0.88;

/// Default ceiling on decoded source pixels (`width * height`).
pub const DEFAULT_MAX_SOURCE_PIXELS: u64 = 40_000_000;

fn default_max_width() -> u32 {
    DEFAULT_MAX_WIDTH
}

fn default_quality() -> f32 {
    DEFAULT_QUALITY
}

fn default_max_source_pixels() -> u64 {
    DEFAULT_MAX_SOURCE_PIXELS
}

/// Knobs for one pipeline run. Read-only once the run starts.
///
/// Missing JSON fields take their defaults:
///
/// ```json
/// { "max_width": 100, "quality": 0.88, "max_source_pixels": 40000000 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Side of the square output.
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    /// Lossy quality in `[0, 1]`.
    #[serde(default = "default_quality")]
    pub quality: f32,
    /// Sources above this many pixels are refused before full decode.
    #[serde(default = "default_max_source_pixels")]
    pub max_source_pixels: u64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            quality: DEFAULT_QUALITY,
            max_source_pixels: DEFAULT_MAX_SOURCE_PIXELS,
        }
    }
}

impl ScaleConfig {
    /// Validated config with the default source ceiling.
    pub fn new(max_width: u32, quality: f32) -> Result<Self> {
        let config = Self {
            max_width,
            quality,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 {
            return Err(ScaleError::UnsupportedScale(
                "max_width must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality) {
            // NaN lands here too.
            return Err(ScaleError::InvalidConfig(format!(
                "quality {} is outside [0, 1]",
                self.quality
            )));
        }
        if self.max_source_pixels == 0 {
            return Err(ScaleError::InvalidConfig(
                "max_source_pixels must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ScaleError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScaleError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }
}
