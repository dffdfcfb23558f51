use super::CapturedImage;
use crate::{Error, Result};
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

pub const JPEG_QUALITY: u8 = 75;

/// Base64 (standard alphabet) text of an encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload(String);

impl EncodedPayload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn from_base64(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(base64::engine::general_purpose::STANDARD.decode(&self.0)?)
    }
}

fn encode_jpeg_sync(image: DynamicImage) -> Result<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut bytes = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY))?;
    Ok(bytes)
}

/// Re-encode a captured frame as JPEG and wrap it in base64.
///
/// No size ceiling is applied here; the HTTP layer bounds upload size.
pub async fn encode(captured: CapturedImage) -> Result<EncodedPayload> {
    let image = captured.into_inner();
    let jpeg = tokio::task::spawn_blocking(move || encode_jpeg_sync(image))
        .await
        .map_err(|e| Error::Invariant(format!("Image encoding task join error: {}", e)))??;

    tracing::debug!("Encoded captured image as JPEG ({} bytes)", jpeg.len());
    Ok(EncodedPayload::from_bytes(&jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_frame(width: u32, height: u32) -> CapturedImage {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 90, 200])
        });
        CapturedImage::from_image(DynamicImage::ImageRgba8(img))
    }

    #[test]
    fn test_base64_round_trip_is_exact() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(4099).collect();
        let payload = EncodedPayload::from_bytes(&bytes);
        assert_eq!(payload.decode().unwrap(), bytes);
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        let payload = EncodedPayload::from_base64("not*base64!".to_string());
        assert!(matches!(payload.decode(), Err(Error::Base64(_))));
    }

    #[tokio::test]
    async fn test_encode_produces_jpeg_with_same_dimensions() {
        let payload = encode(test_frame(640, 480)).await.unwrap();
        let bytes = payload.decode().unwrap();

        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 640);
        assert_eq!(decoded.height(), 480);
    }

    #[tokio::test]
    async fn test_encode_accepts_rgb_input() {
        let img = image::RgbImage::from_pixel(3, 3, image::Rgb([10, 20, 30]));
        let payload = encode(CapturedImage::from_image(DynamicImage::ImageRgb8(img)))
            .await
            .unwrap();
        assert!(!payload.as_str().is_empty());
    }
}
