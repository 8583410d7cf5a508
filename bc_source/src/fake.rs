//! Fake Frame Source: cycles three solid-color JPEGs at 1 fps.
//! Grounded on `bambu_fake.c`, which pre-renders the same three colors
//! once at startup rather than re-encoding per frame.

use async_trait::async_trait;
use bc_core::{Error, Result};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::FrameSource;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const QUALITY: u8 = 100;
const FRAME_RATE: u32 = 1;

fn encode_solid(rgb: [u8; 3]) -> Bytes {
    let image = RgbImage::from_fn(WIDTH, HEIGHT, |_, _| image::Rgb(rgb));
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, QUALITY);
    encoder
        .encode(image.as_raw(), WIDTH, HEIGHT, ColorType::Rgb8.into())
        .expect("encoding a solid-color buffer to JPEG cannot fail");
    Bytes::from(out)
}

/// Cycles solid red, green, and blue JPEGs round-robin, one per call to
/// `next_frame`, pacing itself at `FRAME_RATE` like a real source would.
pub struct FakeFrameSource {
    frames: [Bytes; 3],
    max_frame_size: usize,
    index: AtomicUsize,
    connected: AtomicBool,
}

impl FakeFrameSource {
    pub fn new() -> Self {
        let frames = [
            encode_solid([255, 0, 0]),
            encode_solid([0, 255, 0]),
            encode_solid([0, 0, 255]),
        ];
        let max_frame_size = frames.iter().map(Bytes::len).max().unwrap_or(0);
        Self {
            frames,
            max_frame_size,
            index: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
        }
    }
}

impl Default for FakeFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSource for FakeFrameSource {
    async fn connect(&self, _cancel: CancellationToken) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn frame_rate(&self) -> u32 {
        FRAME_RATE
    }

    fn width(&self) -> u32 {
        WIDTH
    }

    fn height(&self) -> u32 {
        HEIGHT
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    async fn next_frame(&self, cancel: CancellationToken) -> Result<crate::Frame> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::Protocol("next_frame called before connect".into()));
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1) / FRAME_RATE) => {}
            _ = cancel.cancelled() => return Err(Error::Unreachable("cancelled".into())),
        }

        let i = self.index.fetch_add(1, Ordering::SeqCst) % self.frames.len();
        debug!(index = i, "emitting fake frame");
        Ok(crate::Frame {
            bytes: self.frames[i].clone(),
            width: WIDTH,
            height: HEIGHT,
            timestamp: Some(bc_core::utc_now()),
        })
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cycles_colors_deterministically() {
        let src = FakeFrameSource::new();
        src.connect(CancellationToken::new()).await.unwrap();

        for i in 0..6u64 {
            let frame = src.next_frame(CancellationToken::new()).await.unwrap();
            assert_eq!(frame.bytes, src.frames[(i as usize) % 3]);
        }
    }

    #[tokio::test]
    async fn lifecycle_flips_connected_flag() {
        let src = FakeFrameSource::new();
        assert!(!src.is_connected());
        src.connect(CancellationToken::new()).await.unwrap();
        assert!(src.is_connected());
        src.disconnect().await;
        assert!(!src.is_connected());
    }

    #[test]
    fn max_frame_size_is_largest_of_three() {
        let src = FakeFrameSource::new();
        let largest = src.frames.iter().map(Bytes::len).max().unwrap();
        assert_eq!(src.max_frame_size(), largest);
    }
}
