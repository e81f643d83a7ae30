//! Message bus: one bounded inbound queue and one bounded outbound
//! queue per running instance, plus an outbound subscriber fan-out list
//! invoked in registration order, matching the bounded-channel idiom the
//! terminal session manager uses for its own output queues.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::warn;

use crate::error::{CommanderError, Result};

const DEFAULT_CAPACITY: usize = 256;

pub type BoxedAsyncHandler =
    Box<dyn Fn(OutboundMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: String,
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub channel: String,
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Mutex<mpsc::Receiver<OutboundMessage>>,
    subscribers: Mutex<Vec<(String, BoxedAsyncHandler)>>,
    stopped: Notify,
}

impl MessageBus {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        Arc::new(Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
            subscribers: Mutex::new(Vec::new()),
            stopped: Notify::new(),
        })
    }

    pub async fn publish_inbound(&self, message: InboundMessage) -> Result<()> {
        self.inbound_tx
            .send(message)
            .await
            .map_err(|_| CommanderError::Other(anyhow::anyhow!("inbound queue closed")))
    }

    /// Pop the next inbound message, or `None` once the bus has stopped
    /// and the queue has drained.
    pub async fn recv_inbound(&self) -> Option<InboundMessage> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await
    }

    /// Enqueue an outbound message and fan it out to subscribers
    /// registered so far, in registration order.
    pub async fn publish_outbound(&self, message: OutboundMessage) -> Result<()> {
        self.outbound_tx
            .send(message.clone())
            .await
            .map_err(|_| CommanderError::Other(anyhow::anyhow!("outbound queue closed")))?;

        let subscribers = self.subscribers.lock().await;
        for (name, handler) in subscribers.iter() {
            // Sequential, not concurrent: subscribers observe outbound
            // traffic in a stable order (e.g. transcript logger before UI).
            let fut = handler(message.clone());
            fut.await;
            let _ = name;
        }
        Ok(())
    }

    pub async fn recv_outbound(&self) -> Option<OutboundMessage> {
        let mut rx = self.outbound_rx.lock().await;
        rx.recv().await
    }

    pub async fn subscribe_outbound(&self, name: impl Into<String>, handler: BoxedAsyncHandler) {
        self.subscribers.lock().await.push((name.into(), handler));
    }

    pub async fn unsubscribe_outbound(&self, name: &str) {
        self.subscribers.lock().await.retain(|(n, _)| n != name);
    }

    pub fn stop(&self) {
        self.stopped.notify_waiters();
    }

    pub async fn stopped(&self) {
        self.stopped.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use serde_json::Map;

    #[tokio::test]
    async fn inbound_round_trips() {
        let bus = MessageBus::new();
        bus.publish_inbound(InboundMessage {
            channel: "cli".into(),
            text: "hello".into(),
            metadata: Map::new(),
        })
        .await
        .unwrap();
        let msg = bus.recv_inbound().await.unwrap();
        assert_eq!(msg.text, "hello");
    }

    #[tokio::test]
    async fn outbound_subscribers_fire_in_order() {
        let bus = MessageBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        bus.subscribe_outbound(
            "a",
            Box::new(move |_msg| {
                let order_a = Arc::clone(&order_a);
                Box::pin(async move { order_a.lock().await.push("a") })
            }),
        )
        .await;

        let order_b = Arc::clone(&order);
        bus.subscribe_outbound(
            "b",
            Box::new(move |_msg| {
                let order_b = Arc::clone(&order_b);
                Box::pin(async move { order_b.lock().await.push("b") })
            }),
        )
        .await;

        bus.publish_outbound(OutboundMessage {
            channel: "cli".into(),
            text: "hi".into(),
            metadata: Map::new(),
        })
        .await
        .unwrap();

        assert_eq!(*order.lock().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_calls() {
        let bus = MessageBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        bus.subscribe_outbound(
            "counter",
            Box::new(move |_msg| {
                let count_clone = Arc::clone(&count_clone);
                Box::pin(async move {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                })
            }),
        )
        .await;
        bus.publish_outbound(OutboundMessage { channel: "x".into(), text: "1".into(), metadata: Map::new() })
            .await
            .unwrap();
        bus.unsubscribe_outbound("counter").await;
        bus.publish_outbound(OutboundMessage { channel: "x".into(), text: "2".into(), metadata: Map::new() })
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
