//! Frame Broker (FB) and Lifecycle Controller (LC): the in-process
//! fan-out point between the Frame Source and the Egress Transports.

pub mod broker;
pub mod lifecycle;
pub mod metrics;
pub mod slot;

pub use broker::FrameBroker;
pub use lifecycle::LifecycleController;
pub use metrics::BrokerMetrics;
pub use slot::LatestFrameSlot;
