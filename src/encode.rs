//! Lossy encoding of the finished thumbnail.

use image::codecs::jpeg::JpegEncoder;

use crate::{
    pixbuf::*,
    primitive::{tracing::instrument, *},
};

/// Largest side the JPEG format can describe.
const JPEG_MAX_SIDE: u32 = u16::MAX as u32;

/// Format tag carried next to the encoded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedFormat {
    /// Baseline JPEG.
    Jpeg,
}

impl EncodedFormat {
    /// MIME type, for `Content-Type` headers and multipart parts.
    pub fn mime(self) -> &'static str {
        match self {
            EncodedFormat::Jpeg => "image/jpeg",
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            EncodedFormat::Jpeg => "jpg",
        }
    }
}

/// Encoded thumbnail. Produced once per run and handed to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: EncodedFormat,
    /// Declared width of the encoded picture.
    pub width: u32,
    /// Declared height of the encoded picture.
    pub height: u32,
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Map `[0, 1]` onto the codec's `1..=100`.
pub fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Drop alpha by compositing over black, as a canvas JPEG export does.
fn flatten_over_black(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / CHANNELS * 3);
    for px in rgba.chunks_exact(CHANNELS) {
        let a = px[3] as u32;
        rgb.extend(px[..3].iter().map(|&c| ((c as u32 * a + 127) / 255) as u8));
    }
    rgb
}

/// Encode `buf` as JPEG at `quality` in `[0, 1]`.
#[instrument(err, level = "debug")]
pub fn encode(buf: &PixelBuffer, quality: f32) -> Result<EncodedImage> {
    let (width, height) = (buf.width(), buf.height());
    if width == 0 || height == 0 || byte_len(width, height) != Some(buf.as_raw().len()) {
        return Err(ScaleError::encoding_failed(format!(
            "malformed {width}x{height} buffer"
        )));
    }
    if width > JPEG_MAX_SIDE || height > JPEG_MAX_SIDE {
        return Err(ScaleError::encoding_failed(format!(
            "{width}x{height} exceeds the JPEG limit of {JPEG_MAX_SIDE}"
        )));
    }

    let rgb = flatten_over_black(buf.as_raw());
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, jpeg_quality(quality))
        .encode(&rgb, width, height, image::ColorType::Rgb8)
        .map_err(|e| ScaleError::EncodingFailed {
            msg: "jpeg encoder rejected buffer".to_string(),
            source: Some(e),
        })?;

    tracing::trace!("encoded {width}x{height} into {} bytes", bytes.len());
    Ok(EncodedImage {
        bytes,
        format: EncodedFormat::Jpeg,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    /// Smooth gradient plus seeded noise, so the codec has real work to do.
    fn textured(n: u32, seed: u64) -> PixelBuffer {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut data = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let noise: i32 = rng.gen_range(-40..=40);
                let base = ((x + y) * 255 / (2 * n)) as i32;
                let v = (base + noise).clamp(0, 255) as u8;
                data.extend_from_slice(&[v, 255 - v, (x * 7 % 256) as u8, 255]);
            }
        }
        PixelBuffer::new(n, n, data).unwrap()
    }

    #[test]
    fn quality_mapping() {
        assert_eq!(jpeg_quality(0.88), 88);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(1.0), 100);
    }

    #[test]
    fn produces_jpeg_with_declared_size() {
        let out = encode(&textured(32, 1), 0.88).unwrap();
        assert_eq!(out.format, EncodedFormat::Jpeg);
        assert_eq!((out.width, out.height), (32, 32));
        assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
    }

    #[test]
    fn higher_quality_is_never_smaller() {
        let buf = textured(96, 7);
        let low = encode(&buf, 0.5).unwrap().bytes.len();
        let high = encode(&buf, 0.9).unwrap().bytes.len();
        assert!(high >= low, "q=0.9 gave {high} bytes, q=0.5 gave {low}");
    }

    #[test]
    fn transparent_pixels_become_black() {
        assert_eq!(flatten_over_black(&[200, 100, 50, 0]), vec![0, 0, 0]);
        assert_eq!(flatten_over_black(&[200, 100, 50, 255]), vec![200, 100, 50]);
    }

    #[test]
    fn oversized_buffer_fails() {
        let buf = PixelBuffer::filled(JPEG_MAX_SIDE + 1, 1, [0; 4]).unwrap();
        assert!(matches!(
            encode(&buf, 0.88),
            Err(ScaleError::EncodingFailed { .. })
        ));
    }
}
