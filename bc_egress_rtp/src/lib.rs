//! RTP/MPEG-2 Egress Transport: an alternative to the MJPEG-HTTP
//! egress for consumers that expect a standard video transport.
//! Grounded on `server_ffmpeg_rtp.c`'s `server_start`.

pub mod metrics;
pub mod pipeline;

pub use metrics::RtpMetrics;
pub use pipeline::RtpPipelineConfig;

use bc_broker::LifecycleController;
use bc_core::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs the RTP egress until `cancel` fires.
///
/// Unlike the MJPEG egress, which tracks one `ViewerGuard` per HTTP
/// connection, RTP/UDP has no connection-close signal to hook real
/// consumer tracking into. This reports a constant pseudo-viewer count
/// of 1 to the Lifecycle Controller for as long as the egress is
/// running — an intentional simplification (see DESIGN.md), not a
/// placeholder for unfinished bookkeeping. It mirrors the original's
/// unconditional `on_client_change(ctx, 1)` call but documents the
/// choice instead of leaving it implicit.
///
/// Because this holds the shared Lifecycle Controller's upstream
/// connection open for as long as this function runs, `app` only
/// calls it when the operator explicitly selected the `rtp` or `both`
/// transport — the default `mjpeg`-only invocation never calls this
/// at all, so it never trades away spec's "connect only when a viewer
/// is present" invariant unless asked to.
pub async fn serve(
    config: RtpPipelineConfig,
    lifecycle: Arc<LifecycleController>,
    metrics: RtpMetrics,
    cancel: CancellationToken,
) -> Result<()> {
    if let Err(e) = lifecycle.on_viewer_count_changed(1).await {
        error!(error = %e, "rtp egress: frame source connect failed");
        return Err(e);
    }
    metrics.running.set(1);

    let slot = lifecycle.broker().slot_handle();
    let handle = tokio::runtime::Handle::current();
    let pipeline_cancel = cancel.clone();
    let pipeline_metrics = metrics.clone();

    info!(port = config.port, "rtp egress starting");
    let result = tokio::task::spawn_blocking(move || {
        pipeline::run_pipeline(&config, slot, pipeline_metrics, pipeline_cancel, handle)
    })
    .await
    .map_err(|e| Error::Protocol(format!("rtp pipeline task panicked: {e}")))?;

    metrics.running.set(0);
    if let Err(e) = lifecycle.on_viewer_count_changed(0).await {
        warn!(error = %e, "rtp egress: frame source disconnect reported an error");
    }

    result
}
