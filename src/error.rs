//! # Error types for bus operations.
//!
//! [`BusError`] covers the two ways a bus call can fail:
//!
//! - [`BusError::NoChannel`]: the target channel does not exist (bad handle,
//!   closed while the caller was parked, or a broadcast over an empty bus).
//! - [`BusError::WouldBlock`]: a non-blocking call could not make progress.
//!
//! Blocking calls never return `WouldBlock`; they park instead and either
//! succeed or come back with `NoChannel` when the channel vanished under them.
//! Besides the `Result` values, every transfer operation also records its
//! outcome in the bus-wide last-error slot (see [`Bus::last_error`]).
//!
//! [`Bus::last_error`]: crate::Bus::last_error

use thiserror::Error;

/// Errors produced by bus operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The handle does not refer to a live channel, the channel was closed
    /// while the caller was parked on it, or a broadcast found no open
    /// channels at all.
    #[error("no such channel")]
    NoChannel,

    /// A non-blocking call could not make progress: the buffer was full on
    /// send, or empty on receive. Retry later or use the blocking variant.
    #[error("operation would block")]
    WouldBlock,
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::NoChannel => "no_channel",
            BusError::WouldBlock => "would_block",
        }
    }

    /// Indicates whether retrying the same call later may succeed.
    ///
    /// `WouldBlock` clears once another task makes room or delivers data;
    /// `NoChannel` is final for the handle that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BusError::WouldBlock)
    }
}
