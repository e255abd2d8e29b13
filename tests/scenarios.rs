//! End-to-end scenarios for the bus: blocking transfers, closure while
//! parked, slot reuse, batch transfers and broadcast.
//!
//! Most tests drive tasks with a `futures` `LocalPool` because
//! `run_until_stalled` makes the parked/runnable boundary explicit: after
//! it returns, every spawned task is suspended on a wait queue and the
//! test can mutate the bus from outside before letting them resume.

use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;

use corobus::{Bus, BusError};

#[tokio::test]
async fn pipeline_delivers_in_order_under_tokio() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let bus = Bus::new();
            let ch = bus.channel_open(2);

            let producer = tokio::task::spawn_local({
                let bus = bus.clone();
                async move {
                    let mut outcomes = Vec::new();
                    for value in [10, 20, 30, 40] {
                        outcomes.push(bus.send(ch, value).await);
                    }
                    outcomes
                }
            });

            let mut received = Vec::new();
            for _ in 0..4 {
                received.push(bus.recv(ch).await.unwrap());
            }

            let outcomes = producer.await.unwrap();
            assert_eq!(received, vec![10, 20, 30, 40]);
            assert!(outcomes.iter().all(|outcome| outcome.is_ok()));
            assert_eq!(bus.channel_len(ch), Some(0));
            bus.channel_close(ch);
        })
        .await;
}

#[test]
fn blocking_calls_fail_fast_on_a_dead_handle() {
    let bus = Bus::new();
    let ch = bus.channel_open(1);
    bus.channel_close(ch);

    assert_eq!(futures::executor::block_on(bus.send(ch, 1)), Err(BusError::NoChannel));
    assert_eq!(futures::executor::block_on(bus.recv(ch)), Err(BusError::NoChannel));
    assert_eq!(bus.last_error(), Some(BusError::NoChannel));
}

#[test]
fn close_wakes_every_parked_task() {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let bus = Bus::new();
    let ch = bus.channel_open(1);
    bus.try_send(ch, 1).unwrap();

    let failures = Rc::new(RefCell::new(Vec::new()));
    for value in [9, 10] {
        let bus = bus.clone();
        let failures = Rc::clone(&failures);
        spawner
            .spawn_local(async move {
                let outcome = bus.send(ch, value).await.err();
                failures.borrow_mut().push(outcome);
            })
            .unwrap();
    }
    pool.run_until_stalled();
    assert!(failures.borrow().is_empty()); // both senders parked on the full buffer

    {
        let bus = bus.clone();
        let failures = Rc::clone(&failures);
        spawner
            .spawn_local(async move {
                let outcome = bus.recv(ch).await.err();
                failures.borrow_mut().push(outcome);
            })
            .unwrap();
    }

    // Close before the receiver runs: nobody may observe the buffered 1.
    bus.channel_close(ch);
    pool.run_until_stalled();

    let failures = failures.borrow();
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().all(|f| *f == Some(BusError::NoChannel)));
    assert_eq!(bus.last_error(), Some(BusError::NoChannel));
}

#[test]
fn close_fails_a_parked_receiver() {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let bus = Bus::new();
    let ch = bus.channel_open(1);

    let outcome = Rc::new(RefCell::new(None));
    {
        let bus = bus.clone();
        let outcome = Rc::clone(&outcome);
        spawner
            .spawn_local(async move {
                *outcome.borrow_mut() = Some(bus.recv(ch).await);
            })
            .unwrap();
    }
    pool.run_until_stalled();
    assert!(outcome.borrow().is_none()); // parked on the empty buffer

    bus.channel_close(ch);
    pool.run_until_stalled();
    assert_eq!(*outcome.borrow(), Some(Err(BusError::NoChannel)));
}

#[test]
fn parked_senders_resume_in_fifo_order() {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let bus = Bus::new();
    let ch = bus.channel_open(1);
    bus.try_send(ch, 0).unwrap();

    for value in [1, 2, 3] {
        let bus = bus.clone();
        spawner
            .spawn_local(async move {
                bus.send(ch, value).await.unwrap();
            })
            .unwrap();
        pool.run_until_stalled(); // park in a known order
    }

    let mut received = Vec::new();
    for _ in 0..4 {
        received.push(bus.try_recv(ch).unwrap());
        pool.run_until_stalled(); // the freed slot goes to the oldest parked sender
    }
    assert_eq!(received, vec![0, 1, 2, 3]);
    bus.channel_close(ch);
}

#[test]
fn parked_sender_observes_slot_reuse_as_closed() {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let bus = Bus::new();
    let ch = bus.channel_open(1);
    bus.try_send(ch, 1).unwrap();

    let outcome = Rc::new(RefCell::new(None));
    {
        let bus = bus.clone();
        let outcome = Rc::clone(&outcome);
        spawner
            .spawn_local(async move {
                *outcome.borrow_mut() = Some(bus.send(ch, 5).await);
            })
            .unwrap();
    }
    pool.run_until_stalled(); // sender parked

    bus.channel_close(ch);
    let reopened = bus.channel_open(1);
    assert_eq!(reopened, ch); // the slot is reused, the handle compares equal
    pool.run_until_stalled();

    // The stale sender must fail instead of writing into the new channel,
    // even though that channel has free space.
    assert_eq!(*outcome.borrow(), Some(Err(BusError::NoChannel)));
    assert_eq!(bus.try_recv(reopened), Err(BusError::WouldBlock));
    bus.channel_close(reopened);
}

#[cfg(feature = "batch")]
#[test]
fn blocking_send_v_transfers_a_partial_batch_after_waking() {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let bus = Bus::new();
    let ch = bus.channel_open(2);
    assert_eq!(bus.try_send_v(ch, &[1, 2]), Ok(2));

    let outcome = Rc::new(RefCell::new(None));
    {
        let bus = bus.clone();
        let outcome = Rc::clone(&outcome);
        spawner
            .spawn_local(async move {
                *outcome.borrow_mut() = Some(bus.send_v(ch, &[3, 4, 5]).await);
            })
            .unwrap();
    }
    pool.run_until_stalled();
    assert!(outcome.borrow().is_none()); // no free space at all, sender parked

    assert_eq!(bus.try_recv(ch), Ok(1));
    pool.run_until_stalled();

    // One slot freed up: the batch goes through partially, one call one batch.
    assert_eq!(*outcome.borrow(), Some(Ok(1)));
    assert_eq!(bus.try_recv(ch), Ok(2));
    assert_eq!(bus.try_recv(ch), Ok(3));
    assert_eq!(bus.try_recv(ch), Err(BusError::WouldBlock));
    bus.channel_close(ch);
}

#[cfg(feature = "batch")]
#[test]
fn blocking_recv_v_wakes_on_first_message() {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let bus = Bus::new();
    let ch = bus.channel_open(4);

    let outcome = Rc::new(RefCell::new(None));
    {
        let bus = bus.clone();
        let outcome = Rc::clone(&outcome);
        spawner
            .spawn_local(async move {
                let mut out = [0; 4];
                let n = bus.recv_v(ch, &mut out).await;
                *outcome.borrow_mut() = Some((n, out));
            })
            .unwrap();
    }
    pool.run_until_stalled();
    assert!(outcome.borrow().is_none()); // parked on the empty buffer

    bus.try_send(ch, 42).unwrap();
    pool.run_until_stalled();
    assert_eq!(*outcome.borrow(), Some((Ok(1), [42, 0, 0, 0])));
    bus.channel_close(ch);
}

#[cfg(feature = "broadcast")]
#[test]
fn broadcast_reaches_every_channel_and_parked_receivers() {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let bus = Bus::new();
    let a = bus.channel_open(2);
    let b = bus.channel_open(2);
    let c = bus.channel_open(2);

    let got = Rc::new(RefCell::new(None));
    {
        let bus = bus.clone();
        let got = Rc::clone(&got);
        spawner
            .spawn_local(async move {
                *got.borrow_mut() = Some(bus.recv(b).await);
            })
            .unwrap();
    }
    pool.run_until_stalled(); // receiver parked on the empty middle channel

    assert_eq!(pool.run_until(bus.broadcast(99)), Ok(()));
    pool.run_until_stalled();

    assert_eq!(*got.borrow(), Some(Ok(99)));
    assert_eq!(bus.try_recv(a), Ok(99));
    assert_eq!(bus.try_recv(c), Ok(99));
    assert_eq!(bus.channel_len(b), Some(0));
    for ch in [a, b, c] {
        bus.channel_close(ch);
    }
}

#[cfg(feature = "broadcast")]
#[test]
fn broadcast_parks_until_the_full_channel_drains() {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let bus = Bus::new();
    let a = bus.channel_open(2);
    let b = bus.channel_open(2);
    let c = bus.channel_open(2);
    bus.try_send(b, 1).unwrap();
    bus.try_send(b, 2).unwrap(); // middle channel full

    let done = Rc::new(RefCell::new(None));
    {
        let bus = bus.clone();
        let done = Rc::clone(&done);
        spawner
            .spawn_local(async move {
                *done.borrow_mut() = Some(bus.broadcast(7).await);
            })
            .unwrap();
    }
    pool.run_until_stalled(); // broadcast parked on the full channel
    assert!(done.borrow().is_none());
    assert_eq!(bus.channel_len(a), Some(0)); // nothing delivered anywhere yet

    assert_eq!(bus.try_recv(b), Ok(1)); // make room; this wakes the broadcast
    pool.run_until_stalled();

    assert_eq!(*done.borrow(), Some(Ok(())));
    assert_eq!(bus.try_recv(a), Ok(7)); // exactly one copy per channel
    assert_eq!(bus.try_recv(a), Err(BusError::WouldBlock));
    assert_eq!(bus.try_recv(c), Ok(7));
    assert_eq!(bus.try_recv(c), Err(BusError::WouldBlock));
    assert_eq!(bus.try_recv(b), Ok(2));
    assert_eq!(bus.try_recv(b), Ok(7));
    for ch in [a, b, c] {
        bus.channel_close(ch);
    }
}

#[cfg(feature = "broadcast")]
#[test]
fn broadcast_retry_covers_channels_opened_while_parked() {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let bus = Bus::new();
    let a = bus.channel_open(1);
    bus.try_send(a, 9).unwrap(); // the only channel is full

    let done = Rc::new(RefCell::new(None));
    {
        let bus = bus.clone();
        let done = Rc::clone(&done);
        spawner
            .spawn_local(async move {
                *done.borrow_mut() = Some(bus.broadcast(5).await);
            })
            .unwrap();
    }
    pool.run_until_stalled();
    assert!(done.borrow().is_none());

    // A channel opened while the broadcast is parked joins the fan-out
    // once the retry re-scans the bus.
    let b = bus.channel_open(1);
    assert_eq!(bus.try_recv(a), Ok(9));
    pool.run_until_stalled();

    assert_eq!(*done.borrow(), Some(Ok(())));
    assert_eq!(bus.try_recv(a), Ok(5));
    assert_eq!(bus.try_recv(b), Ok(5));
    bus.channel_close(a);
    bus.channel_close(b);
}
