//! Power-of-two pre-reduction.
//!
//! Before the bilinear pass, a large square source is repeatedly halved with
//! an area resample. The resample itself is pluggable through
//! [`AreaResample`]; the only contract is that an integer 2x reduction
//! approximates box averaging.

use image::imageops::FilterType;

use crate::{
    pixbuf::*,
    primitive::{tracing::instrument, *},
};

/// Shrink a buffer to `floor(w/2) x floor(h/2)` by averaging areas.
pub trait AreaResample: Send + Sync + std::fmt::Debug {
    /// `src` is at least 2x2. Must return a freshly sized buffer of exactly
    /// `floor(w/2) x floor(h/2)`.
    fn halve(&self, src: &PixelBuffer) -> PixelBuffer;
}

/// Exact box average.
///
/// Even sides average each 2x2 block with round-half-up. Odd sides spread
/// the leftover column/row into the last block, so every destination pixel
/// averages the integer block `[x*sw/dw, (x+1)*sw/dw)` and no source pixel
/// is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxAverage;

/// Integer block boundaries along one axis.
fn spans(src: u32, dst: u32) -> Vec<(u32, u32)> {
    (0..dst as u64)
        .map(|i| {
            let a = i * src as u64 / dst as u64;
            let b = (i + 1) * src as u64 / dst as u64;
            (a as u32, b as u32)
        })
        .collect()
}

impl AreaResample for BoxAverage {
    fn halve(&self, src: &PixelBuffer) -> PixelBuffer {
        let (dw, dh) = (src.width() / 2, src.height() / 2);
        let xs = spans(src.width(), dw);
        let ys = spans(src.height(), dh);
        let raw = src.as_raw();

        let mut out = Vec::with_capacity(dw as usize * dh as usize * CHANNELS);
        for &(y0, y1) in &ys {
            for &(x0, x1) in &xs {
                let mut acc = [0u32; CHANNELS];
                for y in y0..y1 {
                    let row = src.offset(x0, y);
                    let row = &raw[row..row + (x1 - x0) as usize * CHANNELS];
                    for px in row.chunks_exact(CHANNELS) {
                        for (a, &v) in acc.iter_mut().zip(px) {
                            *a += v as u32;
                        }
                    }
                }
                let n = (x1 - x0) * (y1 - y0);
                out.extend(acc.iter().map(|&a| ((a + n / 2) / n) as u8));
            }
        }
        PixelBuffer::from_parts(dw, dh, out)
    }
}

/// Delegate to `image`'s general-purpose scaler.
///
/// `Triangle` behaves like the browser's canvas downscale; `Nearest` does
/// not average and exists mostly for speed comparisons.
#[derive(Debug, Clone, Copy)]
pub struct FilterResample(pub FilterType);

impl Default for FilterResample {
    fn default() -> Self {
        FilterResample(FilterType::Triangle)
    }
}

impl AreaResample for FilterResample {
    fn halve(&self, src: &PixelBuffer) -> PixelBuffer {
        let img: image::RgbaImage = src.clone().into();
        let out = image::imageops::resize(
            &img,
            src.width() / 2,
            src.height() / 2,
            self.0,
        );
        out.into()
    }
}

/// One halving step with the contract checked.
#[derive(Debug)]
pub struct HalvingReducer {
    resampler: Box<dyn AreaResample>,
}

impl Default for HalvingReducer {
    fn default() -> Self {
        Self::new(Box::new(BoxAverage))
    }
}

impl HalvingReducer {
    pub fn new(resampler: Box<dyn AreaResample>) -> Self {
        Self { resampler }
    }

    /// Halve a square buffer of side at least 2.
    #[instrument(err, level = "debug", skip(self))]
    pub fn halve(&self, src: PixelBuffer) -> Result<PixelBuffer> {
        if !src.is_square() {
            return Err(ScaleError::UnsupportedScale(format!(
                "halving needs a square buffer, got {}x{}",
                src.width(),
                src.height()
            )));
        }
        if src.width() < 2 {
            return Err(ScaleError::UnsupportedScale(
                "cannot halve a 1x1 buffer".to_string(),
            ));
        }
        let out = self.resampler.halve(&src);
        debug_assert_eq!(out.width(), src.width() / 2);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn two_by_two_averages_with_rounding() {
        #[rustfmt::skip]
        let src = PixelBuffer::new(2, 2, vec![
            10, 0, 255, 255,   20, 1, 255, 255,
            30, 1, 255, 0,     40, 1, 255, 0,
        ])
        .unwrap();
        let out = BoxAverage.halve(&src);
        assert_eq!((out.width(), out.height()), (1, 1));
        // (10+20+30+40+2)/4 = 25, (0+1+1+1+2)/4 = 1, alpha (510+2)/4 = 128
        assert_eq!(out.pixel(0, 0), [25, 1, 255, 128]);
    }

    #[test]
    fn odd_side_covers_whole_source() {
        // 3x3 -> 1x1 averages all nine pixels.
        let mut data = Vec::new();
        for v in 1..=9u8 {
            data.extend_from_slice(&[v * 10, 0, 0, 255]);
        }
        let src = PixelBuffer::new(3, 3, data).unwrap();
        let out = BoxAverage.halve(&src);
        assert_eq!((out.width(), out.height()), (1, 1));
        assert_eq!(out.pixel(0, 0), [50, 0, 0, 255]);
    }

    #[test]
    fn flat_color_survives_filter_resample() {
        let src = PixelBuffer::filled(8, 8, [40, 80, 120, 200]).unwrap();
        let out = FilterResample::default().halve(&src);
        assert_eq!((out.width(), out.height()), (4, 4));
        assert!(out.as_raw().chunks(4).all(|p| p == [40, 80, 120, 200]));
    }

    #[test]
    fn reducer_rejects_non_square_and_tiny() {
        let reducer = HalvingReducer::default();
        let rect = PixelBuffer::filled(4, 2, [0; 4]).unwrap();
        assert!(matches!(
            reducer.halve(rect),
            Err(ScaleError::UnsupportedScale(_))
        ));
        let dot = PixelBuffer::filled(1, 1, [0; 4]).unwrap();
        assert!(matches!(
            reducer.halve(dot),
            Err(ScaleError::UnsupportedScale(_))
        ));
    }

    #[quickcheck]
    fn halving_k_times_divides_by_two_to_the_k(m: u8, k: u8) -> bool {
        let m = m as u32 % 12 + 1;
        let k = k as u32 % 5;
        let reducer = HalvingReducer::default();
        let side = m << k;
        let mut buf = PixelBuffer::filled(side, side, [1, 2, 3, 4]).unwrap();
        for _ in 0..k {
            buf = reducer.halve(buf).unwrap();
        }
        buf.width() == m && buf.height() == m
    }

    #[quickcheck]
    fn halving_floors_any_side(n: u8) -> bool {
        let n = n as u32 % 100 + 2;
        let out = HalvingReducer::default()
            .halve(PixelBuffer::filled(n, n, [0; 4]).unwrap())
            .unwrap();
        out.width() == n / 2 && out.height() == n / 2
    }
}
