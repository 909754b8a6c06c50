//! Turn uploaded bytes into a [`PixelBuffer`], refusing anything that is
//! not an image.
//!
//! The pipeline assumes it is handed a real, reasonably sized raster. This
//! is where that gets enforced: a cheap type check by name, a sniff of the
//! magic bytes, a header-only size check, and only then a full decode.

use std::{io::Cursor, path::Path};

use image::ImageFormat;
use mime_guess::mime;

use crate::{
    config::ScaleConfig,
    pixbuf::PixelBuffer,
    primitive::{tracing::instrument, *},
};

/// Rejection shown to whoever picked the file.
pub const NOT_AN_IMAGE: &str = "not recognized as an image";

/// Refuse a path whose extension does not name an image type.
///
/// Paths without a known extension pass; the sniff decides for them.
pub fn check_path(path: &Path) -> Result<()> {
    match mime_guess::from_path(path).first() {
        Some(m) if m.type_() != mime::IMAGE => Err(ScaleError::invalid_image(
            format!("{NOT_AN_IMAGE}: {} is {m}", path.display()),
        )),
        _ => Ok(()),
    }
}

/// Identify the container from its magic bytes.
pub fn sniff(bytes: &[u8]) -> Result<ImageFormat> {
    image::guess_format(bytes).map_err(|e| ScaleError::InvalidImage {
        msg: NOT_AN_IMAGE.to_string(),
        source: Some(e),
    })
}

/// Sniff, bound, and decode the first frame to RGBA8.
#[instrument(err, level = "debug", skip(bytes), fields(len = bytes.len()))]
pub fn decode(bytes: &[u8], config: &ScaleConfig) -> Result<PixelBuffer> {
    let format = sniff(bytes)?;
    tracing::debug!("sniffed {format:?}");

    let reader = || image::io::Reader::with_format(Cursor::new(bytes), format);
    let (w, h) = reader().into_dimensions().map_err(|e| ScaleError::InvalidImage {
        msg: "unreadable header".to_string(),
        source: Some(e),
    })?;
    if w == 0 || h == 0 {
        return Err(ScaleError::invalid_image(format!(
            "zero dimension ({w}x{h})"
        )));
    }
    let pixels = w as u64 * h as u64;
    if pixels > config.max_source_pixels {
        return Err(ScaleError::invalid_image(format!(
            "{w}x{h} exceeds the limit of {} pixels",
            config.max_source_pixels
        )));
    }

    let img = reader().decode().map_err(|e| ScaleError::InvalidImage {
        msg: "cannot decode image".to_string(),
        source: Some(e),
    })?;
    Ok(img.into_rgba8().into())
}

/// [`check_path`], read, [`decode`].
pub async fn decode_file(path: &Path, config: &ScaleConfig) -> anyhow::Result<PixelBuffer> {
    use anyhow::Context;

    check_path(path)?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let config = *config;
    tokio::task::spawn_blocking(move || decode(&bytes, &config))
        .await
        .context("decode_file: join error")?
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_png_to_rgba() {
        let buf = decode(&png(5, 3), &ScaleConfig::default()).unwrap();
        assert_eq!((buf.width(), buf.height()), (5, 3));
        assert_eq!(buf.pixel(4, 2), [10, 20, 30, 255]);
    }

    #[test]
    fn text_is_not_an_image() {
        let err = decode(b"hello, world", &ScaleConfig::default()).unwrap_err();
        match err {
            ScaleError::InvalidImage { msg, .. } => assert_eq!(msg, NOT_AN_IMAGE),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        let bytes = png(16, 16);
        let err = decode(&bytes[..40], &ScaleConfig::default()).unwrap_err();
        assert!(matches!(err, ScaleError::InvalidImage { .. }));
    }

    #[test]
    fn oversized_source_refused_before_decode() {
        let config = ScaleConfig {
            max_source_pixels: 10,
            ..ScaleConfig::default()
        };
        let err = decode(&png(4, 4), &config).unwrap_err();
        match err {
            ScaleError::InvalidImage { msg, .. } => assert!(msg.contains("limit"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn path_check_uses_extension() {
        assert!(check_path(Path::new("me.JPG")).is_ok());
        assert!(check_path(Path::new("me.webp")).is_ok());
        assert!(check_path(Path::new("no_extension")).is_ok());
        assert!(check_path(Path::new("notes.txt")).is_err());
    }

    #[tokio::test]
    async fn decode_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, png(6, 6)).unwrap();
        let buf = decode_file(&path, &ScaleConfig::default()).await.unwrap();
        assert_eq!(buf.width(), 6);
    }
}
