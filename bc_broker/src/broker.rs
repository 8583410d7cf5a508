//! Frame Broker: pulls frames from a Frame Source at the upstream
//! cadence and publishes them into the Latest-Frame Slot. Grounded on
//! `gl_stream::lib.rs`'s `StreamSession` producer loop.

use crate::metrics::BrokerMetrics;
use crate::slot::LatestFrameSlot;
use bc_core::{Error, Result};
use bc_source::FrameSource;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub struct FrameBroker {
    source: Arc<dyn FrameSource>,
    slot: Arc<LatestFrameSlot>,
    metrics: BrokerMetrics,
}

impl FrameBroker {
    pub fn new(source: Arc<dyn FrameSource>, metrics: BrokerMetrics) -> Self {
        let capacity = source.max_frame_size();
        Self {
            source,
            slot: Arc::new(LatestFrameSlot::new(capacity)),
            metrics,
        }
    }

    pub fn slot(&self) -> &LatestFrameSlot {
        &self.slot
    }

    /// A cloned handle to the slot, for egress tasks that need to hold
    /// it across a `'static` future (e.g. an actix streaming body).
    pub fn slot_handle(&self) -> Arc<LatestFrameSlot> {
        self.slot.clone()
    }

    pub fn metrics(&self) -> &BrokerMetrics {
        &self.metrics
    }

    /// Runs until `cancel` fires or the Frame Source returns a fatal
    /// error. Pulls one frame, publishes it, then sleeps `1/frame_rate`
    /// before pulling the next — the producer yields the slot lock
    /// during the sleep since `publish` only holds it for the copy.
    #[instrument(skip(self, cancel))]
    pub async fn run_producer(&self, cancel: CancellationToken) -> Result<()> {
        let period = frame_period(self.source.frame_rate());
        info!(frame_rate = self.source.frame_rate(), "frame broker producer starting");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let frame = tokio::select! {
                result = self.source.next_frame(cancel.clone()) => result,
                _ = cancel.cancelled() => break,
            };

            match frame {
                Ok(frame) => match self.slot.publish(&frame.bytes).await {
                    Ok(generation) => {
                        self.metrics.frames_published.inc();
                        self.metrics.generation.set(generation as i64);
                        debug!(generation, size = frame.bytes.len(), "published frame");
                    }
                    Err(Error::FrameTooLarge { size, capacity }) => {
                        self.metrics.frames_dropped_oversize.inc();
                        warn!(size, capacity, "dropped oversize frame, slot retains prior contents");
                    }
                    Err(e) => {
                        self.metrics.publish_errors.inc();
                        warn!(error = %e, "unexpected publish error");
                    }
                },
                // Resource exhaustion is non-fatal (spec's "oversize frames
                // are dropped with a warning and the slot retains its prior
                // contents"): the Frame Source already checks its sample
                // against the same ceiling the slot was built with, so this
                // arm — not the one on `slot.publish`'s result above — is
                // the one that actually fires on the live path.
                Err(Error::FrameTooLarge { size, capacity }) => {
                    self.metrics.frames_dropped_oversize.inc();
                    warn!(size, capacity, "dropped oversize sample from frame source, slot retains prior contents");
                }
                Err(e) => {
                    warn!(error = %e, "frame source failed, stopping producer");
                    return Err(e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = cancel.cancelled() => break,
            }
        }

        info!("frame broker producer stopped");
        Ok(())
    }
}

fn frame_period(frame_rate: u32) -> Duration {
    if frame_rate == 0 {
        Duration::from_secs(1)
    } else {
        Duration::from_micros(1_000_000 / frame_rate as u64)
    }
}
