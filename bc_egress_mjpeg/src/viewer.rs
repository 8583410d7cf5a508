//! Per-viewer bookkeeping and the multipart body generator. Grounded on
//! `gl_stream::mjpeg`'s `StreamManager`/`SubscriptionGuard` pair and on
//! `server_microhttpd.c`'s `response_callback` state machine, adapted
//! to the Latest-Frame Slot's snapshot-at-BOUNDARY contract instead of
//! a single shared read cursor (spec §4.4.1: the original's
//! connection-limit-of-1 is the thing this redesign replaces).

use crate::metrics::MjpegMetrics;
use bc_broker::LifecycleController;
use bc_core::Id;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const BOUNDARY: &str = "boundary";
/// Reference read-callback block size from `server_microhttpd.c`'s
/// `RESPONSE_BLOCK_SIZE_BYTES`.
pub const REFERENCE_BLOCK_SIZE: usize = 128 * 1024;

pub type ViewerRegistry = DashMap<Id, ()>;

/// RAII registration of one live viewer. Mirrors `gl_capture`'s
/// `CaptureHandle`: the runtime handle is captured at construction so
/// `Drop` can spawn the async lifecycle notification that a plain
/// `Drop::drop` cannot `.await` directly.
pub struct ViewerGuard {
    id: Id,
    registry: Arc<ViewerRegistry>,
    lifecycle: Arc<LifecycleController>,
    metrics: MjpegMetrics,
    runtime_handle: Option<tokio::runtime::Handle>,
}

impl ViewerGuard {
    pub fn register(
        registry: Arc<ViewerRegistry>,
        lifecycle: Arc<LifecycleController>,
        metrics: MjpegMetrics,
    ) -> Self {
        let id = Id::new();
        registry.insert(id, ());
        let count = registry.len();

        metrics.connections_total.inc();
        metrics.active_viewers.set(count as i64);

        let runtime_handle = tokio::runtime::Handle::try_current().ok();
        if runtime_handle.is_none() {
            warn!("ViewerGuard created outside a tokio runtime; lifecycle will not be notified");
        }
        if let Some(handle) = &runtime_handle {
            let lifecycle = lifecycle.clone();
            handle.spawn(async move {
                if let Err(e) = lifecycle.on_viewer_count_changed(count).await {
                    warn!(error = %e, "lifecycle controller rejected viewer-count increase");
                }
            });
        }

        debug!(viewer_id = %id, viewer_count = count, "viewer connected");
        Self {
            id,
            registry,
            lifecycle,
            metrics,
            runtime_handle,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
        let count = self.registry.len();

        self.metrics.disconnections_total.inc();
        self.metrics.active_viewers.set(count as i64);
        debug!(viewer_id = %self.id, viewer_count = count, "viewer disconnected");

        if let Some(handle) = self.runtime_handle.take() {
            let lifecycle = self.lifecycle.clone();
            handle.spawn(async move {
                let _ = lifecycle.on_viewer_count_changed(count).await;
            });
        }
    }
}

/// Builds the per-frame multipart chunks for one viewer as an
/// `async_stream`. Each loop iteration latches the slot's current
/// `(bytes, generation)` in a single snapshot call — the slot lock is
/// held only for that one copy, never across the chunked emission that
/// follows, so no viewer can ever observe a frame made of bytes from
/// two generations (spec §4.4, §8 "no torn frames").
pub fn mjpeg_body(
    slot: Arc<bc_broker::LatestFrameSlot>,
    metrics: MjpegMetrics,
    cancel: CancellationToken,
) -> impl futures_util::Stream<Item = Result<Bytes, actix_web::Error>> {
    async_stream::stream! {
        let mut frame_index: u64 = 0;
        let mut last_generation: u64 = 0;

        loop {
            let generation = match slot.wait_for_new(last_generation, &cancel).await {
                Some(g) => g,
                None => break,
            };
            let (body, snapshot_generation) = slot.snapshot().await;
            last_generation = generation.max(snapshot_generation);

            let mut header = BytesMut::with_capacity(body.len() + 128);
            if frame_index == 0 {
                header.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            }
            header.extend_from_slice(
                format!(
                    "Content-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                    body.len()
                )
                .as_bytes(),
            );
            yield Ok(header.freeze());

            for chunk in body.chunks(REFERENCE_BLOCK_SIZE) {
                yield Ok(Bytes::copy_from_slice(chunk));
            }

            yield Ok(Bytes::from(format!("\r\n--{BOUNDARY}\r\n")));

            metrics.frames_emitted.inc();
            frame_index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bc_broker::LatestFrameSlot;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn first_frame_carries_leading_boundary_and_correct_content_length() {
        let slot = Arc::new(LatestFrameSlot::new(1024));
        let jpeg = b"\xff\xd8fakejpegbytes";
        slot.publish(jpeg).await.unwrap();

        let cancel = CancellationToken::new();
        let body = mjpeg_body(slot, MjpegMetrics::new(), cancel);
        tokio::pin!(body);

        let header = body.next().await.unwrap().unwrap();
        let header_text = String::from_utf8_lossy(&header);
        assert!(header_text.starts_with("--boundary\r\n"));
        assert!(header_text.contains(&format!("Content-Length: {}\r\n\r\n", jpeg.len())));

        let payload = body.next().await.unwrap().unwrap();
        assert_eq!(&payload[..], jpeg);

        let trailer = body.next().await.unwrap().unwrap();
        assert_eq!(&trailer[..], b"\r\n--boundary\r\n");
    }

    #[tokio::test]
    async fn second_frame_has_no_leading_boundary_line_of_its_own() {
        let slot = Arc::new(LatestFrameSlot::new(1024));
        slot.publish(b"\xff\xd8one").await.unwrap();

        let cancel = CancellationToken::new();
        let body = mjpeg_body(slot.clone(), MjpegMetrics::new(), cancel.clone());
        tokio::pin!(body);
        body.next().await.unwrap().unwrap(); // header
        body.next().await.unwrap().unwrap(); // payload
        body.next().await.unwrap().unwrap(); // trailer: "\r\n--boundary\r\n"

        slot.publish(b"\xff\xd8two").await.unwrap();
        let header = body.next().await.unwrap().unwrap();
        let header_text = String::from_utf8_lossy(&header);
        assert!(!header_text.starts_with("--boundary"));
        assert!(header_text.starts_with("Content-Type"));
    }

    #[tokio::test]
    async fn cancellation_ends_the_stream() {
        let slot = Arc::new(LatestFrameSlot::new(1024));
        let cancel = CancellationToken::new();
        let body = mjpeg_body(slot, MjpegMetrics::new(), cancel.clone());
        tokio::pin!(body);

        cancel.cancel();
        assert!(body.next().await.is_none());
    }
}
