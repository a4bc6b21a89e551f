//! Animated sticker flattening
//!
//! TGS stickers are gzipped Lottie JSON; WEBM stickers are VP9 video. Both are
//! reduced to a single PNG frame so the model receives a still image.

use super::tools::FrameExtractor;
use super::MediaError;
use flate2::read::GzDecoder;
use image::ImageFormat;
use serde_json::{Number, Value};
use std::io::{Cursor, Read};

/// Decimal places kept when stripping Lottie float noise.
pub const LOTTIE_FLOAT_PRECISION: i32 = 3;

/// Frame rendered from animated stickers.
pub const LOTTIE_PREVIEW_FRAME: u32 = 1;

/// Decode a `.tgs` payload into Lottie JSON.
///
/// # Errors
///
/// Returns `MediaError::Decode` if the payload is not gzipped JSON.
pub fn decode_tgs(data: &[u8]) -> Result<Value, MediaError> {
    let mut json = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut json)
        .map_err(|e| MediaError::Decode(format!("tgs is not gzip: {e}")))?;
    serde_json::from_slice(&json).map_err(|e| MediaError::Decode(format!("tgs is not JSON: {e}")))
}

/// Round every fractional number in the animation to [`LOTTIE_FLOAT_PRECISION`] places.
pub fn strip_floats(value: &mut Value) {
    match value {
        Value::Number(n) if n.is_f64() => {
            if let Some(rounded) = n.as_f64().map(round_float).and_then(Number::from_f64) {
                *n = rounded;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_floats),
        Value::Object(map) => map.values_mut().for_each(strip_floats),
        _ => {}
    }
}

fn round_float(x: f64) -> f64 {
    let scale = 10_f64.powi(LOTTIE_FLOAT_PRECISION);
    (x * scale).round() / scale
}

/// Re-encode arbitrary image bytes as PNG, rejecting anything that is not a raster image.
///
/// # Errors
///
/// Returns `MediaError::Decode` if the bytes cannot be decoded as an image.
pub fn to_png(encoded: &[u8]) -> Result<Vec<u8>, MediaError> {
    let image = image::load_from_memory(encoded)
        .map_err(|e| MediaError::Decode(format!("renderer output is not an image: {e}")))?;
    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| MediaError::Decode(e.to_string()))?;
    Ok(png.into_inner())
}

/// Flatten a `.tgs` sticker into PNG bytes.
///
/// # Errors
///
/// Fails if the sticker cannot be decoded, rendered or re-encoded.
pub async fn tgs_to_png(tools: &dyn FrameExtractor, data: &[u8]) -> Result<Vec<u8>, MediaError> {
    let mut animation = decode_tgs(data)?;
    strip_floats(&mut animation);
    let json = serde_json::to_vec(&animation).map_err(|e| MediaError::Decode(e.to_string()))?;
    let frame = tools.lottie_frame(&json, LOTTIE_PREVIEW_FRAME).await?;
    to_png(&frame)
}

/// Flatten a `.webm` sticker into PNG bytes.
///
/// # Errors
///
/// Fails if no frame can be extracted or re-encoded.
pub async fn webm_to_png(tools: &dyn FrameExtractor, data: &[u8]) -> Result<Vec<u8>, MediaError> {
    let frame = tools.first_video_frame(data).await?;
    to_png(&frame)
}
