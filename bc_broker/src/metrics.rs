//! Metrics for the Frame Broker and Lifecycle Controller. Grounded on
//! `gl_stream::metrics::StreamMetrics`, trimmed to the fields this
//! broker actually produces.

use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

#[derive(Debug, Clone, Default)]
pub struct BrokerMetrics {
    pub frames_published: Counter,
    pub frames_dropped_oversize: Counter,
    pub publish_errors: Counter,
    pub active_viewers: Gauge,
    pub generation: Gauge,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}
