//! Image encoding: `DynamicImage` → embeddable data URI, or PNG bytes.
//!
//! Page previews and region crops travel inside every task, so they are
//! JPEG-encoded to keep task records small. The OCR engine gets lossless PNG
//! instead; JPEG artefacts around glyph edges cost recognition accuracy.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Prefix of every data URI produced by [`encode_data_uri`].
pub const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Encode an image as a base64 JPEG data URI.
///
/// Alpha is dropped first; the JPEG encoder only accepts RGB/luma input.
pub fn encode_data_uri(img: &DynamicImage) -> Result<String, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded {}x{} image → {} bytes base64", img.width(), img.height(), b64.len());

    Ok(format!("{DATA_URI_PREFIX}{b64}"))
}

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// True for any inline `data:` URI, whatever its media type.
pub fn is_data_uri(s: &str) -> bool {
    s.starts_with("data:")
}
