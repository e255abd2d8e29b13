//! # The bus: a table of channels addressed by integer handles.
//!
//! [`Bus`] owns a growable array of slots, each holding at most one open
//! [`Channel`](crate::channel::Channel) plus a generation counter that
//! survives the channel itself. Handles are plain slot indices; the
//! generation is what lets a task parked across a close observe that its
//! channel is gone even if the slot was already reused:
//!
//! ```text
//! send(h) ──try──► full ──park on send_waiters──► . . . ──resume──►
//!     generation changed?  yes → NoChannel
//!                          no  → try again
//! ```
//!
//! ## Blocking model
//! Blocking calls are `async fn`s; "parking" suspends the calling task on
//! the channel's wait queue until another task makes progress or closes
//! the channel. The bus is single-threaded by construction (`Rc` inside,
//! so `Bus` is `!Send`): between two await points no other task runs, and
//! every try-step executes atomically without locks.
//!
//! ## Closing
//! [`Bus::channel_close`] detaches the channel, bumps the slot generation,
//! and only then wakes everything parked on it; each woken task sees the
//! generation mismatch and fails with [`BusError::NoChannel`]. Buffered
//! messages are discarded with the channel.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::channel::Channel;
use crate::error::BusError;
use crate::waitq::Park;
use crate::Message;

/// Identifies a channel slot within a [`Bus`].
///
/// Handles are plain indices: cheap to copy and to pass between tasks.
/// A handle stays valid until its channel is closed; afterwards every
/// operation on it reports [`BusError::NoChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(usize);

impl ChannelHandle {
    /// The underlying slot index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One bus slot: a generation counter and, while open, a channel.
///
/// The generation starts at 1 and is bumped on every close, never reset,
/// so two channel lifetimes in the same slot are distinguishable.
#[derive(Debug)]
struct Slot {
    generation: u64,
    channel: Option<Channel>,
}

#[derive(Debug)]
struct Inner {
    slots: RefCell<Vec<Slot>>,
    last_error: Cell<Option<BusError>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Callers must close channels (which wakes their waiters) before
        // dropping the last bus handle; a task still parked here would be
        // stranded forever.
        for (index, slot) in self.slots.get_mut().iter().enumerate() {
            if let Some(channel) = &slot.channel {
                assert!(
                    !channel.has_parked_waiters(),
                    "bus dropped while tasks are parked on channel {index}",
                );
            }
        }
    }
}

/// Which side of a channel a task parks on.
#[derive(Debug, Clone, Copy)]
enum Side {
    Send,
    Recv,
}

/// Single-threaded cooperative message bus.
///
/// Cloning a `Bus` produces a second handle to the same underlying slot
/// table; clones are how producer and consumer tasks share the bus.
///
/// All state lives behind `Rc`, so a `Bus` never leaves the thread it was
/// created on and must be driven by a single-threaded executor (a tokio
/// `LocalSet`, a `futures` `LocalPool`, or similar).
#[derive(Debug, Clone)]
pub struct Bus {
    inner: Rc<Inner>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Creates an empty bus with no channels.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                slots: RefCell::new(Vec::new()),
                last_error: Cell::new(None),
            }),
        }
    }

    // ---------------------------
    // Last-error slot
    // ---------------------------

    /// Outcome of the most recent transfer operation on this bus:
    /// `None` after a success, `Some(..)` after a failure.
    ///
    /// Every `send`/`recv`/broadcast variant overwrites the slot on every
    /// path; [`channel_open`](Self::channel_open) clears it and
    /// [`channel_close`](Self::channel_close) leaves it untouched.
    pub fn last_error(&self) -> Option<BusError> {
        self.inner.last_error.get()
    }

    /// Overwrites the last-error slot.
    pub fn set_last_error(&self, error: Option<BusError>) {
        self.inner.last_error.set(error);
    }

    /// Records an operation outcome in the last-error slot and passes it
    /// through.
    fn record<T>(&self, outcome: Result<T, BusError>) -> Result<T, BusError> {
        match &outcome {
            Ok(_) => self.inner.last_error.set(None),
            Err(error) => self.inner.last_error.set(Some(*error)),
        }
        outcome
    }

    // ---------------------------
    // Channel lifecycle
    // ---------------------------

    /// Opens a channel holding at most `capacity` messages and returns its
    /// handle.
    ///
    /// The lowest-indexed free slot is preferred; the slot table grows only
    /// when every slot is occupied. A reused slot keeps the generation its
    /// last close left behind, a fresh slot starts at generation 1.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn channel_open(&self, capacity: usize) -> ChannelHandle {
        let mut slots = self.inner.slots.borrow_mut();
        let index = match slots.iter().position(|slot| slot.channel.is_none()) {
            Some(index) => {
                slots[index].channel = Some(Channel::new(capacity));
                index
            }
            None => {
                slots.push(Slot {
                    generation: 1,
                    channel: Some(Channel::new(capacity)),
                });
                slots.len() - 1
            }
        };
        drop(slots);
        self.inner.last_error.set(None);
        ChannelHandle(index)
    }

    /// Closes a channel: buffered messages are discarded and every task
    /// parked on it resumes with [`BusError::NoChannel`].
    ///
    /// Closing an unknown or already-closed handle is a silent no-op, and
    /// no path through this call touches the last-error slot.
    pub fn channel_close(&self, handle: ChannelHandle) {
        let mut slots = self.inner.slots.borrow_mut();
        let Some(slot) = slots.get_mut(handle.0) else {
            return;
        };
        let Some(channel) = slot.channel.take() else {
            return;
        };
        // The generation bump must precede the wakes so every woken task
        // observes the mismatch.
        slot.generation += 1;
        drop(slots);
        channel.send_waiters().wake_all();
        channel.recv_waiters().wake_all();
    }

    // ---------------------------
    // Introspection
    // ---------------------------

    /// True if `handle` currently names an open channel.
    pub fn is_open(&self, handle: ChannelHandle) -> bool {
        self.inner
            .slots
            .borrow()
            .get(handle.0)
            .is_some_and(|slot| slot.channel.is_some())
    }

    /// Number of currently open channels.
    pub fn channel_count(&self) -> usize {
        self.inner
            .slots
            .borrow()
            .iter()
            .filter(|slot| slot.channel.is_some())
            .count()
    }

    /// Number of messages buffered in a channel, `None` for dead handles.
    pub fn channel_len(&self, handle: ChannelHandle) -> Option<usize> {
        let slots = self.inner.slots.borrow();
        Some(slots.get(handle.0)?.channel.as_ref()?.len())
    }

    /// Capacity a channel was opened with, `None` for dead handles.
    pub fn channel_capacity(&self, handle: ChannelHandle) -> Option<usize> {
        let slots = self.inner.slots.borrow();
        Some(slots.get(handle.0)?.channel.as_ref()?.capacity())
    }

    // ---------------------------
    // Single-message transfer
    // ---------------------------

    /// Appends `value` to the channel without blocking.
    ///
    /// Fails with [`BusError::WouldBlock`] on a full buffer and
    /// [`BusError::NoChannel`] on a dead handle. On success one parked
    /// receiver, if any, is woken.
    pub fn try_send(&self, handle: ChannelHandle, value: Message) -> Result<(), BusError> {
        let mut slots = self.inner.slots.borrow_mut();
        let outcome = match channel_mut(&mut slots, handle) {
            Some(channel) => channel.try_push(value),
            None => Err(BusError::NoChannel),
        };
        drop(slots);
        self.record(outcome)
    }

    /// Appends `value`, parking until the channel has space.
    ///
    /// Never returns [`BusError::WouldBlock`]; fails only with
    /// [`BusError::NoChannel`] when the handle is dead at entry or the
    /// channel is closed while this task is parked.
    pub async fn send(&self, handle: ChannelHandle, value: Message) -> Result<(), BusError> {
        loop {
            match self.try_send(handle, value) {
                Err(BusError::WouldBlock) => {}
                outcome => return outcome,
            }
            self.park_for_space(handle).await?;
        }
    }

    /// Pops the oldest message from the channel without blocking.
    ///
    /// Fails with [`BusError::WouldBlock`] on an empty buffer and
    /// [`BusError::NoChannel`] on a dead handle. On success one parked
    /// sender, if any, is woken.
    pub fn try_recv(&self, handle: ChannelHandle) -> Result<Message, BusError> {
        let mut slots = self.inner.slots.borrow_mut();
        let outcome = match channel_mut(&mut slots, handle) {
            Some(channel) => channel.try_pop(),
            None => Err(BusError::NoChannel),
        };
        drop(slots);
        self.record(outcome)
    }

    /// Pops the oldest message, parking until one is available.
    ///
    /// Never returns [`BusError::WouldBlock`]; fails only with
    /// [`BusError::NoChannel`] as [`send`](Self::send) does.
    pub async fn recv(&self, handle: ChannelHandle) -> Result<Message, BusError> {
        loop {
            match self.try_recv(handle) {
                Err(BusError::WouldBlock) => {}
                outcome => return outcome,
            }
            self.park_for_data(handle).await?;
        }
    }

    // ---------------------------
    // Batch transfer
    // ---------------------------

    /// Appends as many of `values` as currently fit, without blocking.
    ///
    /// Returns the number appended (`Ok(0)` only for an empty input).
    /// Fails with [`BusError::WouldBlock`] when the buffer has no free
    /// space at all. Wakes one parked receiver per appended message.
    #[cfg(feature = "batch")]
    pub fn try_send_v(&self, handle: ChannelHandle, values: &[Message]) -> Result<usize, BusError> {
        if values.is_empty() {
            return self.record(Ok(0));
        }
        let mut slots = self.inner.slots.borrow_mut();
        let outcome = match channel_mut(&mut slots, handle) {
            Some(channel) => channel.try_push_slice(values),
            None => Err(BusError::NoChannel),
        };
        drop(slots);
        self.record(outcome)
    }

    /// Appends a batch, parking only while the channel has no free space.
    ///
    /// One call transfers at most one batch: as soon as *any* space
    /// appears, however much of `values` fits is appended and the count
    /// (`≥ 1`) is returned. Callers loop if they need all-or-nothing.
    #[cfg(feature = "batch")]
    pub async fn send_v(&self, handle: ChannelHandle, values: &[Message]) -> Result<usize, BusError> {
        if values.is_empty() {
            return self.record(Ok(0));
        }
        loop {
            match self.try_send_v(handle, values) {
                Err(BusError::WouldBlock) => {}
                outcome => return outcome,
            }
            self.park_for_space(handle).await?;
        }
    }

    /// Moves up to `out.len()` buffered messages into `out`, without
    /// blocking.
    ///
    /// Returns the number moved (`Ok(0)` only for an empty `out`). Fails
    /// with [`BusError::WouldBlock`] on an empty buffer. Wakes one parked
    /// sender per popped message.
    #[cfg(feature = "batch")]
    pub fn try_recv_v(&self, handle: ChannelHandle, out: &mut [Message]) -> Result<usize, BusError> {
        if out.is_empty() {
            return self.record(Ok(0));
        }
        let mut slots = self.inner.slots.borrow_mut();
        let outcome = match channel_mut(&mut slots, handle) {
            Some(channel) => channel.try_pop_slice(out),
            None => Err(BusError::NoChannel),
        };
        drop(slots);
        self.record(outcome)
    }

    /// Receives a batch, parking until at least one message is buffered.
    ///
    /// Returns the number moved into `out` (`≥ 1`, in buffer order);
    /// symmetric to [`send_v`](Self::send_v).
    #[cfg(feature = "batch")]
    pub async fn recv_v(&self, handle: ChannelHandle, out: &mut [Message]) -> Result<usize, BusError> {
        if out.is_empty() {
            return self.record(Ok(0));
        }
        loop {
            match self.try_recv_v(handle, out) {
                Err(BusError::WouldBlock) => {}
                outcome => return outcome,
            }
            self.park_for_data(handle).await?;
        }
    }

    // ---------------------------
    // Broadcast
    // ---------------------------

    /// Appends `value` to every open channel, or to none.
    ///
    /// Fails with [`BusError::NoChannel`] when the bus has no open channel
    /// and with [`BusError::WouldBlock`] when any open channel is full; in
    /// the latter case no buffer is touched. On success every channel
    /// receives exactly one copy and one parked receiver per channel is
    /// woken.
    #[cfg(feature = "broadcast")]
    pub fn try_broadcast(&self, value: Message) -> Result<(), BusError> {
        let outcome = match self.broadcast_step(value) {
            BroadcastStep::Delivered => Ok(()),
            BroadcastStep::NoChannels => Err(BusError::NoChannel),
            BroadcastStep::FullAt(_) => Err(BusError::WouldBlock),
        };
        self.record(outcome)
    }

    /// Appends `value` to every open channel, parking while any is full.
    ///
    /// Parks on the first full channel found and, once woken, re-scans the
    /// then-current set of open channels from scratch; channels opened or
    /// closed in the meantime are picked up on the retry. The publish
    /// itself is one non-yielding step, so every channel observes the
    /// broadcast at the same logical instant.
    #[cfg(feature = "broadcast")]
    pub async fn broadcast(&self, value: Message) -> Result<(), BusError> {
        loop {
            let full = match self.broadcast_step(value) {
                BroadcastStep::Delivered => return self.record(Ok(())),
                BroadcastStep::NoChannels => return self.record(Err(BusError::NoChannel)),
                BroadcastStep::FullAt(handle) => handle,
            };
            let Some((_, park)) = self.prepare_park(full, Side::Send) else {
                // The blocking channel vanished between scan and park;
                // re-scan immediately.
                continue;
            };
            park.await;
        }
    }

    /// One atomic broadcast attempt: scan every open channel and either
    /// deliver to all of them or report why not.
    #[cfg(feature = "broadcast")]
    fn broadcast_step(&self, value: Message) -> BroadcastStep {
        let mut slots = self.inner.slots.borrow_mut();
        let mut any_open = false;
        for (index, slot) in slots.iter().enumerate() {
            let Some(channel) = &slot.channel else {
                continue;
            };
            any_open = true;
            if channel.is_full() {
                return BroadcastStep::FullAt(ChannelHandle(index));
            }
        }
        if !any_open {
            return BroadcastStep::NoChannels;
        }
        for slot in slots.iter_mut() {
            if let Some(channel) = &mut slot.channel {
                channel.push(value);
            }
        }
        BroadcastStep::Delivered
    }

    // ---------------------------
    // Parking
    // ---------------------------

    /// Parks until a sender slot frees up, then re-checks that the channel
    /// survived the suspension.
    async fn park_for_space(&self, handle: ChannelHandle) -> Result<(), BusError> {
        self.park_on(handle, Side::Send).await
    }

    /// Parks until data arrives, with the same liveness re-check.
    async fn park_for_data(&self, handle: ChannelHandle) -> Result<(), BusError> {
        self.park_on(handle, Side::Recv).await
    }

    async fn park_on(&self, handle: ChannelHandle, side: Side) -> Result<(), BusError> {
        let Some((generation, park)) = self.prepare_park(handle, side) else {
            self.set_last_error(Some(BusError::NoChannel));
            return Err(BusError::NoChannel);
        };
        park.await;
        if !self.is_live(handle, generation) {
            self.set_last_error(Some(BusError::NoChannel));
            return Err(BusError::NoChannel);
        }
        Ok(())
    }

    /// Captures the slot generation and an unpolled park future in one
    /// non-yielding step. `None` if the channel is already gone.
    fn prepare_park(&self, handle: ChannelHandle, side: Side) -> Option<(u64, Park)> {
        let slots = self.inner.slots.borrow();
        let slot = slots.get(handle.0)?;
        let channel = slot.channel.as_ref()?;
        let queue = match side {
            Side::Send => channel.send_waiters(),
            Side::Recv => channel.recv_waiters(),
        };
        Some((slot.generation, queue.park()))
    }

    /// True if the slot still holds a channel of the observed generation.
    fn is_live(&self, handle: ChannelHandle, generation: u64) -> bool {
        self.inner
            .slots
            .borrow()
            .get(handle.0)
            .is_some_and(|slot| slot.channel.is_some() && slot.generation == generation)
    }
}

fn channel_mut(slots: &mut [Slot], handle: ChannelHandle) -> Option<&mut Channel> {
    slots.get_mut(handle.0)?.channel.as_mut()
}

#[cfg(feature = "broadcast")]
enum BroadcastStep {
    /// Every open channel took the message.
    Delivered,
    /// The bus holds no open channel.
    NoChannels,
    /// This channel is full; nothing was delivered.
    FullAt(ChannelHandle),
}
