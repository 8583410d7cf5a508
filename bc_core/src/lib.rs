//! Core types, errors, IDs, and tracing utilities shared by every
//! bambucam component.

pub mod error;
pub mod id;
pub mod telemetry;
pub mod time;

pub use error::{Error, Result};
pub use id::Id;
pub use time::{to_rfc3339, utc_now, MonotonicTimer};
