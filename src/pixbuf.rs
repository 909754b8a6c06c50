//! The RGBA raster handed from stage to stage.

use crate::primitive::*;

/// Bytes per sample: R, G, B, A.
pub const CHANNELS: usize = 4;

/// An owned, tightly packed, row-major RGBA8 raster.
///
/// `data.len() == width * height * 4` holds for every value of this type.
/// Stages that change the dimensions build a fresh buffer instead of
/// reinterpreting an old one.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    // Don't dump the pixels.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Compute `width * height * 4` without overflowing.
pub(crate) fn byte_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(CHANNELS))
}

impl PixelBuffer {
    /// Wrap decoded RGBA bytes.
    ///
    /// Zero dimensions are rejected before `data` is looked at.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ScaleError::invalid_image(format!(
                "zero dimension ({width}x{height})"
            )));
        }
        let expected = byte_len(width, height).ok_or_else(|| {
            ScaleError::invalid_image(format!("{width}x{height} overflows"))
        })?;
        if data.len() != expected {
            return Err(ScaleError::invalid_image(format!(
                "{width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A buffer where every pixel is `rgba`.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ScaleError::invalid_image(format!(
                "zero dimension ({width}x{height})"
            )));
        }
        let len = byte_len(width, height).ok_or_else(|| {
            ScaleError::invalid_image(format!("{width}x{height} overflows"))
        })?;
        let mut data = Vec::with_capacity(len);
        for _ in 0..len / CHANNELS {
            data.extend_from_slice(&rgba);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Construct from parts already known to agree. Stage-internal.
    pub(crate) fn from_parts(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(Some(data.len()), byte_len(width, height));
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Decide if square.
    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Give up the RGBA bytes.
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Byte offset of `(x, y)`.
    #[inline]
    pub(crate) fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    /// Read one pixel. Panics when out of bounds, like slice indexing.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let i = self.offset(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

impl From<image::RgbaImage> for PixelBuffer {
    fn from(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        PixelBuffer::from_parts(width, height, img.into_raw())
    }
}

impl From<PixelBuffer> for image::RgbaImage {
    fn from(buf: PixelBuffer) -> Self {
        // Length invariant guarantees Some.
        image::RgbaImage::from_raw(buf.width, buf.height, buf.data)
            .unwrap_or_else(|| unreachable!("PixelBuffer length invariant"))
    }
}
