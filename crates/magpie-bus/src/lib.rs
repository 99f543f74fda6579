//! In-process message bus.
//!
//! The bus decouples channel adapters from the agent: adapters publish
//! [`InboundMessage`]s into a bounded fan-in queue, the agent worker
//! consumes them, and outbound events fan out to named subscriptions (one
//! per SSE request or WebSocket dispatcher) plus a global queue.
//!
//! Delivery is best-effort: a full inbound queue drops the
//! message, and a slow outbound subscriber is skipped rather than allowed
//! to stall the rest.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use magpie_types::{InboundMessage, OutboundMessage};

/// Default capacity for the inbound, outbound, and subscription queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Result type alias using the bus error type.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors raised by bus operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// The target queue was full; the message was dropped.
    #[error("channel full, message dropped")]
    ChannelFull,

    /// The bus has been closed.
    #[error("bus closed")]
    Closed,

    /// The blocking operation was cancelled.
    #[error("cancelled")]
    Cancelled,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Queue capacities for a bus instance.
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
    /// Capacity of each named subscription queue.
    pub subscription_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_capacity: DEFAULT_QUEUE_CAPACITY,
            subscription_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bus
// ─────────────────────────────────────────────────────────────────────────────

/// The in-process queue plane.
pub struct MessageBus {
    config: BusConfig,
    inbound_tx: RwLock<Option<mpsc::Sender<InboundMessage>>>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: RwLock<Option<mpsc::Sender<OutboundMessage>>>,
    outbound_rx: parking_lot::Mutex<Option<mpsc::Receiver<OutboundMessage>>>,
    subscribers: RwLock<HashMap<String, mpsc::Sender<OutboundMessage>>>,
}

impl MessageBus {
    /// Create a bus with default capacities.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with the given capacities.
    pub fn with_config(config: BusConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        Self {
            config,
            inbound_tx: RwLock::new(Some(inbound_tx)),
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx: RwLock::new(Some(outbound_tx)),
            outbound_rx: parking_lot::Mutex::new(Some(outbound_rx)),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Publish an inbound message without blocking.
    ///
    /// A full queue drops the message: the caller gets [`BusError::ChannelFull`]
    /// and a warning is logged, but adapters are free to ignore it.
    pub fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        let guard = self.inbound_tx.read();
        let tx = guard.as_ref().ok_or(BusError::Closed)?;

        match tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!(
                    channel = %dropped.channel,
                    chat_id = %dropped.chat_id,
                    "Inbound queue full, dropping message"
                );
                Err(BusError::ChannelFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(BusError::Closed),
        }
    }

    /// Receive the next inbound message.
    ///
    /// Blocks until a message arrives, the token cancels, or the bus
    /// closes. Each message is delivered to exactly one caller.
    pub async fn consume_inbound(&self, cancel: &CancellationToken) -> Result<InboundMessage> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Err(BusError::Cancelled),
            msg = rx.recv() => msg.ok_or(BusError::Closed),
        }
    }

    /// Create (or replace) a named outbound subscription and return its
    /// receiving end.
    ///
    /// Re-subscribing under an existing name closes the previous queue and
    /// starts a fresh one.
    pub fn subscribe_outbound(&self, name: impl Into<String>) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(self.config.subscription_capacity.max(1));
        self.subscribers.write().insert(name.into(), tx);
        rx
    }

    /// Close and remove a named subscription. Further publishes no longer
    /// reach it.
    pub fn unsubscribe_outbound(&self, name: &str) {
        self.subscribers.write().remove(name);
    }

    /// Number of live named subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Publish an outbound event.
    ///
    /// Every named subscriber gets a non-blocking send first (a slow or
    /// closed subscriber is skipped, never waited on), then the global
    /// queue. The publish succeeds if any subscriber took the message or
    /// the subscriber map was non-empty; [`BusError::ChannelFull`] is only
    /// reported when there were no subscribers and the global queue was
    /// full too.
    pub fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        let mut delivered = 0usize;
        let mut dead: Vec<String> = Vec::new();
        let subscriber_count;

        {
            let subscribers = self.subscribers.read();
            subscriber_count = subscribers.len();
            for (name, tx) in subscribers.iter() {
                match tx.try_send(msg.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!(subscription = %name, "Slow subscriber, skipping event");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(name.clone());
                    }
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write();
            for name in dead {
                subscribers.remove(&name);
            }
        }

        let global_ok = {
            let guard = self.outbound_tx.read();
            match guard.as_ref() {
                Some(tx) => tx.try_send(msg).is_ok(),
                None => false,
            }
        };

        if global_ok || delivered > 0 || subscriber_count > 0 {
            Ok(())
        } else {
            Err(BusError::ChannelFull)
        }
    }

    /// Take the receiving end of the global outbound queue.
    ///
    /// There is one global consumer (the broadcast dispatcher); the first
    /// caller gets the receiver and later callers get `None`.
    pub fn take_outbound(&self) -> Option<mpsc::Receiver<OutboundMessage>> {
        self.outbound_rx.lock().take()
    }

    /// Close the inbound and outbound queues and every named subscription.
    pub fn close(&self) {
        self.inbound_tx.write().take();
        self.outbound_tx.write().take();
        self.subscribers.write().clear();
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn inbound(content: &str) -> InboundMessage {
        InboundMessage::new("test", "chat-1", "user-1", content)
    }

    fn outbound(content: &str) -> OutboundMessage {
        OutboundMessage::chunk("test", "chat-1", content)
    }

    #[tokio::test]
    async fn test_inbound_round_trip() {
        let bus = MessageBus::new();
        bus.publish_inbound(inbound("hello")).unwrap();

        let cancel = CancellationToken::new();
        let msg = bus.consume_inbound(&cancel).await.unwrap();
        assert_eq!(msg.content, "hello");
    }

    #[tokio::test]
    async fn test_inbound_fifo() {
        let bus = MessageBus::new();
        for i in 0..5 {
            bus.publish_inbound(inbound(&format!("msg-{}", i))).unwrap();
        }

        let cancel = CancellationToken::new();
        for i in 0..5 {
            let msg = bus.consume_inbound(&cancel).await.unwrap();
            assert_eq!(msg.content, format!("msg-{}", i));
        }
    }

    #[tokio::test]
    async fn test_inbound_drops_when_full() {
        let bus = MessageBus::with_config(BusConfig {
            inbound_capacity: 2,
            ..Default::default()
        });

        bus.publish_inbound(inbound("a")).unwrap();
        bus.publish_inbound(inbound("b")).unwrap();
        assert_eq!(bus.publish_inbound(inbound("c")), Err(BusError::ChannelFull));

        // The first two survive in order.
        let cancel = CancellationToken::new();
        assert_eq!(bus.consume_inbound(&cancel).await.unwrap().content, "a");
        assert_eq!(bus.consume_inbound(&cancel).await.unwrap().content, "b");
    }

    #[tokio::test]
    async fn test_consume_honors_cancellation() {
        let bus = Arc::new(MessageBus::new());
        let cancel = CancellationToken::new();

        let consumer = {
            let bus = bus.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { bus.consume_inbound(&cancel).await })
        };

        cancel.cancel();
        assert_eq!(consumer.await.unwrap(), Err(BusError::Cancelled));
    }

    #[tokio::test]
    async fn test_exactly_once_delivery() {
        let bus = Arc::new(MessageBus::new());
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let bus = bus.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(
                async move { bus.consume_inbound(&cancel).await },
            ));
        }

        bus.publish_inbound(inbound("only-one")).unwrap();
        bus.publish_inbound(inbound("other")).unwrap();

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap().unwrap().content);
        }
        seen.sort();
        assert_eq!(seen, vec!["only-one".to_string(), "other".to_string()]);
    }

    #[tokio::test]
    async fn test_subscription_fifo() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe_outbound("sub-1");

        for i in 0..5 {
            bus.publish_outbound(outbound(&format!("ev-{}", i))).unwrap();
        }

        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.content.as_deref(), Some(format!("ev-{}", i).as_str()));
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_skipped() {
        let bus = MessageBus::with_config(BusConfig {
            subscription_capacity: 1,
            ..Default::default()
        });
        let mut slow = bus.subscribe_outbound("slow");
        let mut fast = bus.subscribe_outbound("fast");

        // First event fills the slow queue; the second is skipped for it
        // but still reaches the fast one.
        bus.publish_outbound(outbound("first")).unwrap();
        bus.publish_outbound(outbound("second")).unwrap();

        assert_eq!(slow.recv().await.unwrap().content.as_deref(), Some("first"));
        assert_eq!(fast.recv().await.unwrap().content.as_deref(), Some("first"));
        assert_eq!(fast.recv().await.unwrap().content.as_deref(), Some("second"));

        // Nothing else queued for the slow subscriber.
        assert!(slow.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe_outbound("sub");

        bus.publish_outbound(outbound("before")).unwrap();
        bus.unsubscribe_outbound("sub");
        // Publishing after unsubscribe does not reach the old receiver.
        let _ = bus.publish_outbound(outbound("after"));

        assert_eq!(rx.recv().await.unwrap().content.as_deref(), Some("before"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let bus = MessageBus::new();
        let rx = bus.subscribe_outbound("gone");
        drop(rx);

        // First publish notices the closed queue and prunes it.
        let _ = bus.publish_outbound(outbound("x"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_outbound_success_semantics() {
        // No subscribers, global queue capacity 1: first publish lands in
        // the global queue, second reports ChannelFull.
        let bus = MessageBus::with_config(BusConfig {
            outbound_capacity: 1,
            ..Default::default()
        });
        assert!(bus.publish_outbound(outbound("a")).is_ok());
        assert_eq!(bus.publish_outbound(outbound("b")), Err(BusError::ChannelFull));

        // With a subscriber present, publish succeeds even when the global
        // queue stays full.
        let _rx = bus.subscribe_outbound("sub");
        assert!(bus.publish_outbound(outbound("c")).is_ok());
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_queue() {
        let bus = MessageBus::new();
        let mut old = bus.subscribe_outbound("name");
        let mut new = bus.subscribe_outbound("name");

        bus.publish_outbound(outbound("x")).unwrap();
        assert!(old.recv().await.is_none());
        assert_eq!(new.recv().await.unwrap().content.as_deref(), Some("x"));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_close_wakes_consumer_and_rejects_publish() {
        let bus = Arc::new(MessageBus::new());
        let cancel = CancellationToken::new();

        let consumer = {
            let bus = bus.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { bus.consume_inbound(&cancel).await })
        };

        // Give the consumer a chance to park.
        tokio::task::yield_now().await;
        bus.close();

        assert_eq!(consumer.await.unwrap(), Err(BusError::Closed));
        assert_eq!(bus.publish_inbound(inbound("late")), Err(BusError::Closed));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_global_outbound_receiver() {
        let bus = MessageBus::new();
        let mut rx = bus.take_outbound().unwrap();
        assert!(bus.take_outbound().is_none());

        bus.publish_outbound(outbound("global")).unwrap();
        assert_eq!(rx.recv().await.unwrap().content.as_deref(), Some("global"));
    }
}
