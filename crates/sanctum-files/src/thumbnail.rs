//! JPEG thumbnails for image attachments, produced before encryption.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::error::{FileError, FileResult};

/// Decode `data`, shrink so the longest side is at most `max_side`, and
/// return a `data:image/jpeg;base64,…` URI. Runs on the blocking pool.
pub async fn generate(data: Bytes, max_side: u32, quality: u8) -> FileResult<String> {
    let jpeg = tokio::task::spawn_blocking(move || render(&data, max_side, quality))
        .await
        .map_err(|e| FileError::Thumbnail(format!("thumbnail task failed: {e}")))??;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg)))
}

fn render(data: &[u8], max_side: u32, quality: u8) -> FileResult<Vec<u8>> {
    let img = image::load_from_memory(data).map_err(|e| FileError::Thumbnail(e.to_string()))?;
    let img = if img.width() > max_side || img.height() > max_side {
        img.thumbnail(max_side, max_side)
    } else {
        img
    };

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|e| FileError::Thumbnail(e.to_string()))?;
    Ok(out.into_inner())
}
