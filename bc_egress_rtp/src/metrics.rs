//! Metrics for the RTP/MPEG-2 egress. Grounded on
//! `bc_broker::metrics::BrokerMetrics`'s shape.

use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

#[derive(Debug, Clone, Default)]
pub struct RtpMetrics {
    pub frames_transcoded: Counter,
    pub decode_errors: Counter,
    pub encode_errors: Counter,
    pub packets_written: Counter,
    pub running: Gauge,
}

impl RtpMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}
