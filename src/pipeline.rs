//! Crop, halve, resize, encode.
//!
//! The run is a straight line through [`ScaleStage`]:
//!
//! ```text
//! Idle -> Cropped -> Reducing(k) ... -> Finished
//! ```
//!
//! 1. Crop to the centered square.
//! 2. While `width >= 2 * max_width`, halve.
//! 3. If still `width > max_width`, bilinear-resize to exactly `max_width`.
//! 4. Encode at `quality`.
//!
//! Any stage error aborts the run; no intermediate buffer escapes.

use crate::{
    bilinear,
    cancel::CancelToken,
    config::ScaleConfig,
    crop,
    encode::{self, EncodedImage},
    halve::{AreaResample, HalvingReducer},
    pixbuf::PixelBuffer,
    primitive::{tracing::instrument, *},
};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleStage {
    Idle,
    Cropped,
    /// `k` halvings done so far.
    Reducing(u32),
    Finished,
}

/// The square buffer right before encoding, with how it got there.
#[derive(Debug)]
pub(crate) struct Prepared {
    pub buffer: PixelBuffer,
    pub halvings: u32,
    pub resized: bool,
}

/// Turns a decoded source into a square lossy thumbnail.
///
/// Holds no per-run state, so one pipeline can serve many threads at once.
#[derive(Debug)]
pub struct ScalePipeline {
    config: ScaleConfig,
    reducer: HalvingReducer,
}

impl ScalePipeline {
    /// Pipeline with the default box-average halving.
    pub fn new(config: ScaleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            reducer: HalvingReducer::default(),
        })
    }

    /// Swap the area resample used for halving.
    pub fn with_resampler(mut self, resampler: Box<dyn AreaResample>) -> Self {
        self.reducer = HalvingReducer::new(resampler);
        self
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }

    /// Run to completion.
    pub fn run(&self, src: PixelBuffer) -> Result<EncodedImage> {
        self.run_with_cancel(src, &CancelToken::new())
    }

    /// Validate raw RGBA and run. Zero dimensions fail before anything is
    /// allocated.
    pub fn run_rgba(&self, width: u32, height: u32, data: Vec<u8>) -> Result<EncodedImage> {
        self.run(PixelBuffer::new(width, height, data)?)
    }

    /// Run, checking `cancel` between stages.
    #[instrument(err, skip(self, cancel), fields(max_width = self.config.max_width))]
    pub fn run_with_cancel(
        &self,
        src: PixelBuffer,
        cancel: &CancelToken,
    ) -> Result<EncodedImage> {
        let prepared = self.prepare(src, cancel)?;
        let encoded = encode::encode(&prepared.buffer, self.config.quality)?;
        tracing::info!(
            "thumbnail {}x{} ({} halvings, resized: {}, {} bytes)",
            encoded.width,
            encoded.height,
            prepared.halvings,
            prepared.resized,
            encoded.bytes.len()
        );
        Ok(encoded)
    }

    /// Everything but the encode.
    pub(crate) fn prepare(
        &self,
        src: PixelBuffer,
        cancel: &CancelToken,
    ) -> Result<Prepared> {
        let max = self.config.max_width;
        let mut stage = ScaleStage::Idle;
        tracing::debug!("{stage:?}: {}x{}", src.width(), src.height());
        cancel.check("start")?;

        let mut current = crop::crop(src)?;
        stage = ScaleStage::Cropped;
        tracing::debug!("{stage:?}: {}x{}", current.width(), current.height());
        cancel.check("crop")?;

        // u64: 2 * max must not wrap.
        let mut halvings = 0;
        while current.width() as u64 >= 2 * max as u64 {
            current = self.reducer.halve(current)?;
            halvings += 1;
            stage = ScaleStage::Reducing(halvings);
            tracing::debug!("{stage:?}: {}x{}", current.width(), current.height());
            cancel.check("halving")?;
        }

        let resized = current.width() > max;
        if resized {
            current = bilinear::resize(current, max)?;
            cancel.check("resize")?;
        }
        stage = ScaleStage::Finished;
        tracing::debug!("{stage:?}: {}x{}", current.width(), current.height());

        Ok(Prepared {
            buffer: current,
            halvings,
            resized,
        })
    }
}
