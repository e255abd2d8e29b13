//! # corobus
//!
//! **Corobus** is a single-threaded cooperative message bus: many async
//! tasks sharing one thread exchange unsigned-integer messages through
//! bounded FIFO channels addressed by small integer handles.
//!
//! It is built for current-thread executors (a tokio `LocalSet`, a
//! `futures` `LocalPool`): the bus holds no lock or atomic, tasks
//! interleave only at explicit await points, and waiting is expressed
//! through the standard `Waker` protocol, so any executor can drive it.
//!
//! ## Features
//!
//! | Area                | Description                                                             | Key types               |
//! |---------------------|-------------------------------------------------------------------------|-------------------------|
//! | **Channels**        | Bounded FIFO channels, opened and closed at runtime, handles reusable.  | [`Bus`], [`ChannelHandle`] |
//! | **Blocking calls**  | `send`/`recv` park the calling task and resume in FIFO order.           | [`Bus::send`], [`Bus::recv`] |
//! | **Non-blocking**    | `try_*` variants fail fast with [`BusError::WouldBlock`].               | [`Bus::try_send`], [`Bus::try_recv`] |
//! | **Batch** *(feature `batch`)* | `send_v`/`recv_v` move several messages per call, partial on contention. | [`Bus::send_v`], [`Bus::recv_v`] |
//! | **Broadcast** *(feature `broadcast`)* | All-or-nothing fan-out to every open channel.           | [`Bus::broadcast`]      |
//! | **Errors**          | Typed results plus an errno-style last-error slot.                      | [`BusError`], [`Bus::last_error`] |
//!
//! ## Teardown
//!
//! Closing a channel wakes everything parked on it; each woken task
//! resumes with [`BusError::NoChannel`] instead of a spurious success,
//! even if the slot was already reused for a new channel. Close channels
//! before dropping the last `Bus` clone: dropping a bus with tasks still
//! parked on it is a caller bug and panics.
//!
//! ## Example
//!
//! Non-blocking usage needs no executor at all:
//!
//! ```
//! use corobus::{Bus, BusError};
//!
//! let bus = Bus::new();
//! let ch = bus.channel_open(2);
//!
//! bus.try_send(ch, 7).unwrap();
//! bus.try_send(ch, 8).unwrap();
//! assert_eq!(bus.try_send(ch, 9), Err(BusError::WouldBlock));
//!
//! assert_eq!(bus.try_recv(ch), Ok(7));
//! assert_eq!(bus.try_recv(ch), Ok(8));
//! bus.channel_close(ch);
//! ```
//!
//! Blocking calls park the task; a producer faster than its consumer is
//! simply paced by the channel capacity:
//!
//! ```
//! use corobus::Bus;
//! use futures::executor::LocalPool;
//! use futures::task::LocalSpawnExt;
//!
//! let mut pool = LocalPool::new();
//! let bus = Bus::new();
//! let ch = bus.channel_open(2);
//!
//! let producer = bus.clone();
//! pool.spawner()
//!     .spawn_local(async move {
//!         for value in [10, 20, 30, 40] {
//!             producer.send(ch, value).await.unwrap();
//!         }
//!     })
//!     .unwrap();
//!
//! let consumer = bus.clone();
//! let received = pool.run_until(async move {
//!     let mut got = Vec::new();
//!     for _ in 0..4 {
//!         got.push(consumer.recv(ch).await.unwrap());
//!     }
//!     got
//! });
//!
//! assert_eq!(received, vec![10, 20, 30, 40]);
//! bus.channel_close(ch);
//! ```

mod bus;
mod channel;
mod error;
mod waitq;

pub use bus::{Bus, ChannelHandle};
pub use error::BusError;

/// Message payload carried by bus channels.
///
/// Messages are fixed-width unsigned integers; the bus never interprets
/// them.
pub type Message = u32;
