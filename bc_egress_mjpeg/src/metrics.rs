//! Metrics for the MJPEG-HTTP egress. Grounded on
//! `gl_stream::metrics::StreamMetrics`.

use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

#[derive(Debug, Clone, Default)]
pub struct MjpegMetrics {
    pub connections_total: Counter,
    pub disconnections_total: Counter,
    pub active_viewers: Gauge,
    pub frames_emitted: Counter,
    pub write_errors: Counter,
}

impl MjpegMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}
