//! 16:9 center crop applied to uploads before rendering.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage};
use tokio::fs;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// JPEG quality of the prepared still.
pub const JPEG_QUALITY: u8 = 95;

/// Source and cropped dimensions of a prepared still.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropOutcome {
    pub source: (u32, u32),
    pub cropped: (u32, u32),
}

/// Largest centered 16:9 window for a `width`x`height` image.
///
/// Wider than 16:9 keeps the height; anything else keeps the width.
/// Fractional sizes are floored.
pub fn widescreen_dimensions(width: u32, height: u32) -> (u32, u32) {
    let (w, h) = (width as u64, height as u64);
    if w * 9 > h * 16 {
        ((h * 16 / 9) as u32, height)
    } else {
        (width, (w * 9 / 16) as u32)
    }
}

/// Decode an image, crop it to 16:9 around its center and re-encode it as
/// JPEG.
pub fn crop_bytes_to_widescreen(bytes: &[u8]) -> MediaResult<(Vec<u8>, CropOutcome)> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = (img.width(), img.height());
    let (new_w, new_h) = widescreen_dimensions(width, height);

    if new_w == 0 || new_h == 0 {
        return Err(MediaError::ImageTooSmall { width, height });
    }

    let x = (width - new_w) / 2;
    let y = (height - new_h) / 2;
    let cropped = img.crop_imm(x, y, new_w, new_h);

    let encoded = encode_jpeg(&cropped)?;
    Ok((
        encoded,
        CropOutcome {
            source: (width, height),
            cropped: (new_w, new_h),
        },
    ))
}

fn encode_jpeg(img: &DynamicImage) -> MediaResult<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), JPEG_QUALITY);
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    Ok(buf)
}

/// Crop the image at `input` to 16:9 and write it as JPEG to `output`.
///
/// Decoding and encoding run on the blocking pool.
pub async fn crop_to_widescreen(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> MediaResult<CropOutcome> {
    let input = input.as_ref();
    let output = output.as_ref();

    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    let bytes = fs::read(input).await?;
    let (encoded, outcome) = tokio::task::spawn_blocking(move || crop_bytes_to_widescreen(&bytes))
        .await
        .map_err(|e| MediaError::internal(format!("Crop task join error: {}", e)))??;

    fs::write(output, encoded).await?;

    debug!(
        input = %input.display(),
        output = %output.display(),
        source = ?outcome.source,
        cropped = ?outcome.cropped,
        "Cropped still to 16:9"
    );

    Ok(outcome)
}
