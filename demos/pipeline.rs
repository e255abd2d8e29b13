//! # Producer/consumer pipeline
//!
//! Demonstrates the basic blocking workflow:
//! - one producer paced by channel capacity (it parks whenever the
//!   consumer falls behind),
//! - one consumer draining the channel,
//! - clean teardown via `channel_close`.
//!
//! Run with: `cargo run --example pipeline`

use corobus::Bus;
use tokio::task::LocalSet;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let bus = Bus::new();
            let ch = bus.channel_open(3);

            let producer = tokio::task::spawn_local({
                let bus = bus.clone();
                async move {
                    for value in 0..10 {
                        bus.send(ch, value)
                            .await
                            .expect("channel closed under the producer");
                        println!("producer: sent {value}");
                    }
                }
            });

            let consumer = tokio::task::spawn_local({
                let bus = bus.clone();
                async move {
                    for _ in 0..10 {
                        let value = bus
                            .recv(ch)
                            .await
                            .expect("channel closed under the consumer");
                        println!("consumer: got {value}");
                        // Give the producer a chance to refill the buffer.
                        tokio::task::yield_now().await;
                    }
                }
            });

            producer.await.unwrap();
            consumer.await.unwrap();
            bus.channel_close(ch);
            println!("pipeline drained, channel closed");
        })
        .await;
}
