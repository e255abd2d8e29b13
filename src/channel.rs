//! # Bounded message channel.
//!
//! [`Channel`] is the unit of storage behind each bus slot: a FIFO buffer
//! capped at a fixed capacity, plus the two [`WaitQueue`]s of tasks parked
//! on it (senders waiting for space, receivers waiting for data).
//!
//! Only the non-blocking transfer steps live here; every mutation performs
//! the wakes it owes so the bus layer cannot forget them:
//!
//! - pushing a message wakes one parked receiver,
//! - popping a message wakes one parked sender,
//! - a batch of `k` messages wakes up to `k` on the opposite side.
//!
//! Invariants kept at every return: the buffer never exceeds capacity, no
//! sender stays parked while space is free, and no receiver stays parked
//! while data is buffered.

use std::collections::VecDeque;

use crate::error::BusError;
use crate::waitq::WaitQueue;
use crate::Message;

/// A bounded FIFO of messages with a wait queue per direction.
#[derive(Debug)]
pub(crate) struct Channel {
    capacity: usize,
    buffer: VecDeque<Message>,
    send_waiters: WaitQueue,
    recv_waiters: WaitQueue,
}

impl Channel {
    /// Creates an empty channel. `capacity` must be positive.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "channel capacity must be positive");
        Self {
            capacity,
            buffer: VecDeque::new(),
            send_waiters: WaitQueue::new(),
            recv_waiters: WaitQueue::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered messages.
    pub(crate) fn len(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    /// Queue of senders parked because the buffer was full.
    pub(crate) fn send_waiters(&self) -> &WaitQueue {
        &self.send_waiters
    }

    /// Queue of receivers parked because the buffer was empty.
    pub(crate) fn recv_waiters(&self) -> &WaitQueue {
        &self.recv_waiters
    }

    /// True if any task is still parked on either side.
    pub(crate) fn has_parked_waiters(&self) -> bool {
        self.send_waiters.has_parked() || self.recv_waiters.has_parked()
    }

    /// Appends one message, waking one parked receiver.
    pub(crate) fn try_push(&mut self, value: Message) -> Result<(), BusError> {
        if self.is_full() {
            return Err(BusError::WouldBlock);
        }
        self.push(value);
        Ok(())
    }

    /// Pops the oldest message, waking one parked sender.
    pub(crate) fn try_pop(&mut self) -> Result<Message, BusError> {
        let Some(value) = self.buffer.pop_front() else {
            return Err(BusError::WouldBlock);
        };
        self.send_waiters.wake_one();
        Ok(value)
    }

    /// Appends a message to a channel already verified to have free space.
    pub(crate) fn push(&mut self, value: Message) {
        debug_assert!(!self.is_full());
        self.buffer.push_back(value);
        self.recv_waiters.wake_one();
    }

    /// Appends as many of `values` as fit, waking one parked receiver per
    /// appended message. Fails only when the buffer has no free space at
    /// all; otherwise the transfer is partial and the count is returned.
    #[cfg(feature = "batch")]
    pub(crate) fn try_push_slice(&mut self, values: &[Message]) -> Result<usize, BusError> {
        if values.is_empty() {
            return Ok(0);
        }
        let free = self.capacity - self.buffer.len();
        if free == 0 {
            return Err(BusError::WouldBlock);
        }
        let count = values.len().min(free);
        self.buffer.extend(values[..count].iter().copied());
        self.recv_waiters.wake_n(count);
        Ok(count)
    }

    /// Moves up to `out.len()` buffered messages into `out`, waking one
    /// parked sender per popped message. Fails only on an empty buffer.
    #[cfg(feature = "batch")]
    pub(crate) fn try_pop_slice(&mut self, out: &mut [Message]) -> Result<usize, BusError> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.buffer.is_empty() {
            return Err(BusError::WouldBlock);
        }
        let count = out.len().min(self.buffer.len());
        for (slot, value) in out[..count].iter_mut().zip(self.buffer.drain(..count)) {
            *slot = value;
        }
        self.send_waiters.wake_n(count);
        Ok(count)
    }
}
