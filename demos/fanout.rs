//! # Broadcast fan-out
//!
//! Three subscribers each own a channel; a publisher broadcasts a value to
//! all of them at once. The blocking broadcast parks whenever any
//! subscriber's buffer is full, so slow consumers exert backpressure on
//! the publisher.
//!
//! Run with: `cargo run --example fanout`

use corobus::Bus;
use tokio::task::LocalSet;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let bus = Bus::new();
            let channels: Vec<_> = (0..3).map(|_| bus.channel_open(2)).collect();

            let mut subscribers = Vec::new();
            for (id, ch) in channels.iter().copied().enumerate() {
                let bus = bus.clone();
                subscribers.push(tokio::task::spawn_local(async move {
                    loop {
                        match bus.recv(ch).await {
                            Ok(value) => println!("subscriber {id}: got {value}"),
                            Err(_) => {
                                println!("subscriber {id}: channel closed, exiting");
                                return;
                            }
                        }
                    }
                }));
            }

            for round in 0..5 {
                bus.broadcast(round * 11).await.expect("no open channels");
                tokio::task::yield_now().await;
            }

            for ch in channels {
                bus.channel_close(ch);
            }
            for subscriber in subscribers {
                subscriber.await.unwrap();
            }
        })
        .await;
}
