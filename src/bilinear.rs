//! Final exact-width resize by bilinear interpolation.
//!
//! Destination pixels are inverse-mapped into the source with `i / scale`;
//! the four neighbours at `floor`/`ceil` (the `ceil` clamped to the last
//! row/column) are blended by their fractional offsets. All four channels,
//! alpha included, go through the same blend without premultiplication.

use crate::{
    pixbuf::*,
    primitive::{tracing::instrument, *},
};

/// Blend the four corners of the unit square at `(x, y)`.
#[inline]
fn blend(f00: f64, f10: f64, f01: f64, f11: f64, x: f64, y: f64) -> f64 {
    let un_x = 1.0 - x;
    let un_y = 1.0 - y;
    f00 * un_x * un_y + f10 * x * un_y + f01 * un_x * y + f11 * x * y
}

/// Round to nearest and clamp into a sample.
#[inline]
fn to_sample(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Source neighbours and fractional offset for one destination index.
#[inline]
fn neighbours(dst: u32, scale: f64, src_len: u32) -> (u32, u32, f64) {
    let v = dst as f64 / scale;
    let lo = v.floor();
    let hi = v.ceil().min((src_len - 1) as f64);
    (lo as u32, hi as u32, v - lo)
}

/// Resize a square buffer down to `target_width x target_width`.
///
/// `target_width == src.width()` is the identity. Upscaling and a zero
/// target are refused with [`ScaleError::UnsupportedScale`].
#[instrument(err, level = "debug")]
pub fn resize(src: PixelBuffer, target_width: u32) -> Result<PixelBuffer> {
    if !src.is_square() {
        return Err(ScaleError::UnsupportedScale(format!(
            "bilinear resize needs a square buffer, got {}x{}",
            src.width(),
            src.height()
        )));
    }
    if target_width == 0 {
        return Err(ScaleError::UnsupportedScale(
            "target width is 0".to_string(),
        ));
    }
    if target_width > src.width() {
        return Err(ScaleError::UnsupportedScale(format!(
            "refusing to upscale {} to {}",
            src.width(),
            target_width
        )));
    }

    let scale = target_width as f64 / src.width() as f64;
    let raw = src.as_raw();
    let mut out = vec![0u8; target_width as usize * target_width as usize * CHANNELS];

    // Column lookups are the same for every row.
    let cols: Vec<_> = (0..target_width)
        .map(|j| neighbours(j, scale, src.width()))
        .collect();

    for i in 0..target_width {
        let (iy0, iy1, dy) = neighbours(i, scale, src.height());
        for (j, &(ix0, ix1, dx)) in cols.iter().enumerate() {
            let s00 = src.offset(ix0, iy0);
            let s10 = src.offset(ix1, iy0);
            let s01 = src.offset(ix0, iy1);
            let s11 = src.offset(ix1, iy1);
            let d = (i as usize * target_width as usize + j) * CHANNELS;
            for c in 0..CHANNELS {
                out[d + c] = to_sample(blend(
                    raw[s00 + c] as f64,
                    raw[s10 + c] as f64,
                    raw[s01 + c] as f64,
                    raw[s11 + c] as f64,
                    dx,
                    dy,
                ));
            }
        }
    }

    Ok(PixelBuffer::from_parts(target_width, target_width, out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(n: u32) -> PixelBuffer {
        let mut data = Vec::new();
        for y in 0..n {
            for x in 0..n {
                data.extend_from_slice(&[
                    (x * 255 / (n - 1)) as u8,
                    (y * 255 / (n - 1)) as u8,
                    ((x + y) % 256) as u8,
                    (255 - x) as u8,
                ]);
            }
        }
        PixelBuffer::new(n, n, data).unwrap()
    }

    #[test]
    fn same_width_is_identity() {
        let src = gradient(17);
        assert_eq!(resize(src.clone(), 17).unwrap(), src);
    }

    #[test]
    fn output_is_target_square() {
        let out = resize(gradient(150), 100).unwrap();
        assert_eq!((out.width(), out.height()), (100, 100));
        assert_eq!(out.as_raw().len(), 100 * 100 * 4);
    }

    #[test]
    fn blends_fractional_offsets() {
        // 3x3 -> 2x2: scale = 2/3, destination 1 maps to source 1.5.
        let mut data = Vec::new();
        for y in 0..3u8 {
            for x in 0..3u8 {
                data.extend_from_slice(&[x * 100, y * 100, 0, 255 - x * 100]);
            }
        }
        let src = PixelBuffer::new(3, 3, data).unwrap();
        let out = resize(src, 2).unwrap();
        assert_eq!(out.pixel(0, 0), [0, 0, 0, 255]);
        // x in [1, 2] at 0.5: 150; alpha blended the same way: 105.
        assert_eq!(out.pixel(1, 0), [150, 0, 0, 105]);
        assert_eq!(out.pixel(1, 1), [150, 150, 0, 105]);
    }

    #[test]
    fn alpha_is_interpolated_like_color() {
        // Gray pixels with alpha equal to the gray level stay that way.
        let mut data = Vec::new();
        for y in 0..7u32 {
            for x in 0..7u32 {
                let v = (x * 31 + y * 7) as u8;
                data.extend_from_slice(&[v, v, v, v]);
            }
        }
        let out = resize(PixelBuffer::new(7, 7, data).unwrap(), 5).unwrap();
        for px in out.as_raw().chunks(4) {
            assert!(px.iter().all(|&c| c == px[0]), "{px:?}");
        }
    }

    #[test]
    fn refuses_upscale_and_zero() {
        let src = gradient(8);
        assert!(matches!(
            resize(src.clone(), 9),
            Err(ScaleError::UnsupportedScale(_))
        ));
        assert!(matches!(
            resize(src, 0),
            Err(ScaleError::UnsupportedScale(_))
        ));
    }

    #[test]
    fn last_row_and_column_stay_in_bounds() {
        // 5 -> 4: last destination maps to 3.75, ceil clamps to 4.
        let out = resize(gradient(5), 4).unwrap();
        assert_eq!(out.width(), 4);
        let [r, _, _, _] = out.pixel(3, 0);
        // x = 3.75 between 191 and 255.
        assert_eq!(r, 239);
    }
}
