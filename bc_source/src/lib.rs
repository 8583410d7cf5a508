//! Frame Source (FS): opaque producer of JPEG frames. Two
//! implementations live here — [`live::LiveFrameSource`], which
//! terminates the printer's vendor tunnel, and [`fake::FakeFrameSource`],
//! a deterministic three-color cycle used for local testing.

pub mod fake;
pub mod live;

use async_trait::async_trait;
use bc_core::Result;
use bytes::Bytes;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

/// A single JPEG frame handed from a Frame Source to the Frame Broker.
///
/// `bytes` is a cheaply-cloneable, ref-counted buffer rather than a
/// borrowed slice: the underlying C API hands back a pointer valid only
/// until the next read, but modeling that lifetime across an `async fn`
/// trait boundary in safe Rust is awkward, so sources copy once into a
/// `Bytes` on read. The Frame Broker still copies out of this buffer
/// into the Latest-Frame Slot under its own lock, so the "single
/// producer, no torn reads" contract is unaffected.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub timestamp: Option<SystemTime>,
}

impl Frame {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Contract shared by every Frame Source. Implementations are expected
/// to retry transient upstream conditions internally and only return
/// `Err` for conditions the caller must act on (see `bc_core::Error`'s
/// `Auth`/`Unreachable`/`UnexpectedStream`/`Protocol` variants).
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Opens the upstream connection. Bounded only by `cancel`; callers
    /// that want a timeout race this future against their own deadline.
    async fn connect(&self, cancel: CancellationToken) -> Result<()>;

    /// Valid only after a successful `connect`.
    fn frame_rate(&self) -> u32;
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Conservative upper bound on any single frame's encoded size.
    /// Every `next_frame` result must be checked against this bound by
    /// the caller before copying it anywhere fixed-capacity.
    fn max_frame_size(&self) -> usize;

    /// Blocks until the next frame is available. Bounded only by
    /// `cancel`.
    async fn next_frame(&self, cancel: CancellationToken) -> Result<Frame>;

    /// Idempotent; safe to call without a prior `connect`.
    async fn disconnect(&self);

    /// Whether the source currently believes it holds an open upstream
    /// connection. Exposed for lifecycle tests (spec scenario 5).
    fn is_connected(&self) -> bool;
}
