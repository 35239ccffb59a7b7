//! Image encoding: `DynamicImage` → PNG bytes on disk.
//!
//! PNG is lossless; rendered slide text and thin rules stay crisp, which is
//! what downstream viewers care about.

use image::DynamicImage;
use std::fs::OpenOptions;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::debug;

/// Encode a rasterised page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Encode `img` as PNG and write it to a new file at `path`.
///
/// Never overwrites: an existing file is an error. Returns the byte length.
pub fn write_png(img: &DynamicImage, path: &Path) -> Result<u64, image::ImageError> {
    let buf = encode_png(img)?;
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(&buf)?;
    file.flush()?;
    debug!(path = %path.display(), bytes = buf.len(), "Wrote page PNG");
    Ok(buf.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_small_image() {
        let data = encode_png(&red(10, 10)).expect("encode should succeed");
        assert_eq!(&data[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn write_png_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.png");
        let len = write_png(&red(4, 3), &path).unwrap();
        assert_eq!(len, std::fs::metadata(&path).unwrap().len());
        assert!(write_png(&red(4, 3), &path).is_err());
    }
}
