//! ABOUTME: Shared testing fixtures for bambucam crates
//! ABOUTME: Deterministic JPEG fixtures and cancellation-token helpers used across crate boundaries

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use tokio_util::sync::CancellationToken;

/// A small, deterministic solid-color JPEG for tests that need real
/// (decodable) frame bytes without depending on `bc_source::fake`.
pub fn solid_color_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Bytes {
    let image = RgbImage::from_fn(width, height, |_, _| image::Rgb(rgb));
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, 100);
    encoder
        .encode(image.as_raw(), width, height, ColorType::Rgb8.into())
        .expect("encoding a solid-color buffer to JPEG cannot fail");
    Bytes::from(out)
}

/// A `CancellationToken` pre-wired to fire after `delay`, for tests that
/// need a bounded wait instead of an unconditional one.
pub fn cancel_after(delay: std::time::Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let fired = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        fired.cancel();
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_color_jpeg_starts_with_jpeg_magic_bytes() {
        let jpeg = solid_color_jpeg(8, 8, [255, 0, 0]);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn cancel_after_fires_once_elapsed() {
        let token = cancel_after(std::time::Duration::from_millis(10));
        assert!(!token.is_cancelled());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(token.is_cancelled());
    }
}
