//! The Latest-Frame Slot: the broker's single-writer, multi-reader
//! most-recent-frame buffer. Grounded on `gl_stream::frame_buffer`'s
//! bookkeeping shape, generalized to the generation-counter and
//! `wait_for_new` contract spelled out in the spec rather than
//! `gl_stream`'s broadcast-channel fan-out.

use bc_core::{Error, Result};
use bytes::Bytes;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

struct SlotInner {
    buf: Vec<u8>,
    size: usize,
    generation: u64,
}

/// A bounded, reusable frame buffer plus a monotonically increasing
/// generation counter. One producer publishes; any number of readers
/// snapshot or wait for a newer generation.
pub struct LatestFrameSlot {
    capacity: usize,
    inner: Mutex<SlotInner>,
    new_frame: Notify,
}

impl LatestFrameSlot {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(SlotInner {
                buf: vec![0u8; capacity],
                size: 0,
                generation: 0,
            }),
            new_frame: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Atomically replaces the slot contents and bumps `generation`.
    /// Oversize frames are dropped (the slot retains its prior
    /// contents) and reported as an error for the caller to log; the
    /// pacing loop continues regardless.
    pub async fn publish(&self, bytes: &[u8]) -> Result<u64> {
        if bytes.len() > self.capacity {
            return Err(Error::FrameTooLarge {
                size: bytes.len(),
                capacity: self.capacity,
            });
        }

        let generation = {
            let mut inner = self.inner.lock().await;
            inner.buf[..bytes.len()].copy_from_slice(bytes);
            inner.size = bytes.len();
            inner.generation += 1;
            inner.generation
        };
        self.new_frame.notify_waiters();
        Ok(generation)
    }

    /// Copies the current slot contents into a fresh, owned buffer
    /// under the slot lock and returns it alongside the generation it
    /// was copied at. This is the only place a reader touches the
    /// shared buffer; everything downstream (a Viewer's BODY phase, the
    /// RTP encoder) works from its own copy, so no reader ever races
    /// the producer mid-frame.
    pub async fn snapshot(&self) -> (Bytes, u64) {
        let inner = self.inner.lock().await;
        (Bytes::copy_from_slice(&inner.buf[..inner.size]), inner.generation)
    }

    pub async fn generation(&self) -> u64 {
        self.inner.lock().await.generation
    }

    /// Resets `generation` and `size` to zero. Called when a Frame
    /// Source reconnects: the generation sequence is only monotonic
    /// for the lifetime of a single connection (spec §8).
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.size = 0;
        inner.generation = 0;
    }

    /// Suspends until `generation > after_generation` or `cancel` fires.
    pub async fn wait_for_new(&self, after_generation: u64, cancel: &CancellationToken) -> Option<u64> {
        loop {
            let current = self.generation().await;
            if current > after_generation {
                return Some(current);
            }

            let notified = self.new_frame.notified();
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_bumps_generation_monotonically() {
        let slot = LatestFrameSlot::new(16);
        assert_eq!(slot.publish(b"abc").await.unwrap(), 1);
        assert_eq!(slot.publish(b"de").await.unwrap(), 2);
        assert_eq!(slot.publish(b"f").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn snapshot_reflects_last_publish() {
        let slot = LatestFrameSlot::new(16);
        slot.publish(b"hello").await.unwrap();
        let (bytes, generation) = slot.snapshot().await;
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(generation, 1);
    }

    #[tokio::test]
    async fn oversize_publish_is_rejected_and_slot_is_unchanged() {
        let slot = LatestFrameSlot::new(4);
        slot.publish(b"ok!!").await.unwrap();
        let err = slot.publish(b"too big").await.unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { .. }));
        let (bytes, generation) = slot.snapshot().await;
        assert_eq!(&bytes[..], b"ok!!");
        assert_eq!(generation, 1);
    }

    #[tokio::test]
    async fn wait_for_new_returns_immediately_if_already_newer() {
        let slot = LatestFrameSlot::new(16);
        slot.publish(b"x").await.unwrap();
        let cancel = CancellationToken::new();
        let generation = slot.wait_for_new(0, &cancel).await;
        assert_eq!(generation, Some(1));
    }

    #[tokio::test]
    async fn wait_for_new_wakes_on_publish() {
        let slot = std::sync::Arc::new(LatestFrameSlot::new(16));
        let cancel = CancellationToken::new();

        let waiter_slot = slot.clone();
        let waiter_cancel = cancel.clone();
        let waiter = tokio::spawn(async move { waiter_slot.wait_for_new(0, &waiter_cancel).await });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        slot.publish(b"new").await.unwrap();

        assert_eq!(waiter.await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn wait_for_new_returns_none_on_cancel() {
        let slot = std::sync::Arc::new(LatestFrameSlot::new(16));
        let cancel = CancellationToken::new();

        let waiter_slot = slot.clone();
        let waiter_cancel = cancel.clone();
        let waiter = tokio::spawn(async move { waiter_slot.wait_for_new(0, &waiter_cancel).await });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), None);
    }
}
