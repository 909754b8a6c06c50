//! Centered square crop.

use crate::{
    pixbuf::*,
    primitive::{tracing::instrument, *},
};

/// Cut the centered `s x s` region out of `src`, `s = min(width, height)`.
///
/// The offset along the long side is `floor((long - s) / 2)`, so odd
/// leftovers lose their extra column/row on the right/bottom.
#[instrument(err, level = "debug")]
pub fn crop(src: PixelBuffer) -> Result<PixelBuffer> {
    let (w, h) = (src.width(), src.height());
    if w == 0 || h == 0 {
        return Err(ScaleError::invalid_image(format!(
            "zero dimension ({w}x{h})"
        )));
    }
    if w == h {
        // Already square. Hand it on.
        return Ok(src);
    }

    let s = w.min(h);
    let dx = (w - s) / 2;
    let dy = (h - s) / 2;

    let row = s as usize * CHANNELS;
    let mut data = Vec::with_capacity(row * s as usize);
    let raw = src.as_raw();
    for y in dy..dy + s {
        let start = src.offset(dx, y);
        data.extend_from_slice(&raw[start..start + row]);
    }
    Ok(PixelBuffer::from_parts(s, s, data))
}
