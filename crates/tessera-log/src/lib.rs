//! Tessera Log
//!
//! Decision models reserve stdout for their output, so everything else has
//! to end up on stderr. This crate provides two ways to get there:
//!
//! - [`Logger`]: an explicit, cloneable handle that owns its writer (stderr by
//!   default). [`Logger::capture`] returns a [`CaptureGuard`] that buffers
//!   messages until it is flushed or dropped.
//! - [`init`]: installs a `tracing` subscriber that writes structured events
//!   to stderr.

mod logger;
mod subscriber;

pub use logger::{CaptureGuard, LogWriter, Logger};
pub use subscriber::init;
