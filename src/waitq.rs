//! # FIFO wait queues for parked tasks.
//!
//! A [`WaitQueue`] holds the tasks suspended on one side of a channel
//! (senders waiting for space, receivers waiting for data) and wakes them
//! in the order they parked.
//!
//! ## Protocol
//! - [`WaitQueue::park`] returns a [`Park`] future. Its first poll appends
//!   an entry for the calling task at the tail and suspends; the queue and
//!   the future share the entry via `Rc`.
//! - [`WaitQueue::wake_one`] pops the oldest live entry, flips it to
//!   `Woken`, and fires its waker. The woken task observes the grant on its
//!   next poll and resumes.
//! - A `Park` future dropped while still parked marks its entry `Detached`;
//!   the queue skips such entries lazily. Dropped *after* being granted a
//!   wake but before resuming, it hands the grant to the next parked entry
//!   so a wake is never lost to async cancellation.
//!
//! Everything here is single-threaded: entries live behind `Rc`/`RefCell`
//! and wakers fire synchronously into the local executor.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// State of one wait-queue entry.
#[derive(Debug)]
enum WaitState {
    /// Task is suspended; wake it through the stored waker.
    Parked(Waker),
    /// A waker granted this entry a wake; the task has not resumed yet.
    Woken,
    /// The entry is dead: either the task consumed its wake, or the
    /// `Park` future was dropped. Queues skip these on pop.
    Detached,
}

/// One suspended task, shared between a queue and its `Park` future.
#[derive(Debug)]
struct Waiter {
    state: RefCell<WaitState>,
}

impl Waiter {
    fn new(waker: Waker) -> Self {
        Self {
            state: RefCell::new(WaitState::Parked(waker)),
        }
    }

    /// Grants a wake: `Parked` becomes `Woken` and the waker is handed
    /// back to the caller to fire. Returns `None` for dead entries.
    fn grant(&self) -> Option<Waker> {
        let mut state = self.state.borrow_mut();
        match mem::replace(&mut *state, WaitState::Woken) {
            WaitState::Parked(waker) => Some(waker),
            other => {
                *state = other;
                None
            }
        }
    }

    /// Consumes a granted wake. Returns `false` if no grant is pending.
    fn consume_grant(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if matches!(*state, WaitState::Woken) {
            *state = WaitState::Detached;
            true
        } else {
            false
        }
    }

    /// Refreshes the stored waker on a spurious executor poll.
    fn register(&self, waker: &Waker) {
        if let WaitState::Parked(stored) = &mut *self.state.borrow_mut() {
            stored.clone_from(waker);
        }
    }

    /// Kills the entry, returning its previous state.
    fn detach(&self) -> WaitState {
        mem::replace(&mut *self.state.borrow_mut(), WaitState::Detached)
    }

    fn is_parked(&self) -> bool {
        matches!(*self.state.borrow(), WaitState::Parked(_))
    }
}

/// FIFO queue of tasks suspended on a channel condition.
#[derive(Debug, Clone)]
pub(crate) struct WaitQueue {
    entries: Rc<RefCell<VecDeque<Rc<Waiter>>>>,
}

impl WaitQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Returns a future that parks the calling task at the tail of this
    /// queue. It completes once [`wake_one`](Self::wake_one) (or a bulk
    /// wake) grants the entry a wake.
    pub(crate) fn park(&self) -> Park {
        Park {
            queue: self.clone(),
            waiter: None,
        }
    }

    /// Wakes the task that parked earliest. Returns `false` when no live
    /// entry remains.
    pub(crate) fn wake_one(&self) -> bool {
        let waker = {
            let mut entries = self.entries.borrow_mut();
            loop {
                let Some(entry) = entries.pop_front() else {
                    return false;
                };
                if let Some(waker) = entry.grant() {
                    break waker;
                }
                // Detached entry, keep scanning.
            }
        };
        waker.wake();
        true
    }

    /// Wakes every parked task, in FIFO order.
    pub(crate) fn wake_all(&self) {
        while self.wake_one() {}
    }

    /// Wakes up to `count` parked tasks, in FIFO order.
    pub(crate) fn wake_n(&self, count: usize) {
        for _ in 0..count {
            if !self.wake_one() {
                return;
            }
        }
    }

    /// True if any entry is still parked (detached leftovers don't count).
    pub(crate) fn has_parked(&self) -> bool {
        self.entries.borrow().iter().any(|entry| entry.is_parked())
    }
}

/// Future returned by [`WaitQueue::park`].
///
/// Suspends the calling task until a waker grants it a wake. Cancellation
/// safe: dropping it detaches the entry and forwards any unconsumed grant.
#[derive(Debug)]
pub(crate) struct Park {
    queue: WaitQueue,
    waiter: Option<Rc<Waiter>>,
}

impl Future for Park {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match &this.waiter {
            None => {
                let waiter = Rc::new(Waiter::new(cx.waker().clone()));
                this.queue.entries.borrow_mut().push_back(Rc::clone(&waiter));
                this.waiter = Some(waiter);
                Poll::Pending
            }
            Some(waiter) => {
                if waiter.consume_grant() {
                    Poll::Ready(())
                } else {
                    waiter.register(cx.waker());
                    Poll::Pending
                }
            }
        }
    }
}

impl Drop for Park {
    fn drop(&mut self) {
        let Some(waiter) = self.waiter.take() else {
            return;
        };
        if matches!(waiter.detach(), WaitState::Woken) {
            // The wake granted to this entry was never consumed; pass it
            // on so the condition it signals is not lost.
            self.queue.wake_one();
        }
    }
}
