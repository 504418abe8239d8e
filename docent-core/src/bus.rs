//! In-process message bus with topic pub/sub and correlated request/reply.
//!
//! Each subscriber owns one mailbox (an unbounded queue) drained by a
//! dedicated dispatch task, so a subscriber sees messages in arrival order
//! and publish order is preserved per topic. Requests suspend the caller on
//! a one-shot channel keyed by correlation ID; a reply that arrives after
//! the caller timed out finds no pending entry and is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use uuid::Uuid;

use crate::error::BusError;
use crate::types::{Message, Payload, Topic};

/// A bus subscriber. Agents implement this and are registered per topic.
///
/// `handle` is invoked from the subscriber's dispatch task, one message at
/// a time, so implementations may assume their own calls never overlap.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Stable subscriber name; subscription is idempotent per (topic, name).
    fn name(&self) -> &str;

    /// Process one delivered message.
    async fn handle(&self, message: Message);
}

#[derive(Default)]
struct Registry {
    /// Topic -> subscriber names, in subscription order.
    subscriptions: HashMap<Topic, Vec<String>>,
    /// Subscriber name -> mailbox sender.
    mailboxes: HashMap<String, mpsc::UnboundedSender<Message>>,
}

/// In-process publish/subscribe router with request/reply correlation.
///
/// Constructed once and handed to each agent by `Arc`; there is no global
/// instance.
pub struct MessageBus {
    registry: Mutex<Registry>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Payload>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a subscriber for a topic. Idempotent per (topic, name).
    ///
    /// The first subscription for a given name spawns its mailbox dispatch
    /// task; must be called from within a tokio runtime.
    pub async fn subscribe(&self, topic: Topic, subscriber: Arc<dyn Subscriber>) {
        let name = subscriber.name().to_string();
        let mut registry = self.registry.lock().await;

        if !registry.mailboxes.contains_key(&name) {
            let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
            registry.mailboxes.insert(name.clone(), tx);
            let subscriber = Arc::clone(&subscriber);
            tokio::spawn(async move {
                while let Some(message) = rx.recv().await {
                    subscriber.handle(message).await;
                }
            });
        }

        let entry = registry.subscriptions.entry(topic).or_default();
        if !entry.iter().any(|n| n == &name) {
            tracing::debug!(topic = %topic, subscriber = %name, "Subscribed");
            entry.push(name);
        }
    }

    /// Publish fire-and-forget. Delivered asynchronously to every current
    /// subscriber of the topic in FIFO order; publishing to a topic with no
    /// subscribers is not an error.
    pub async fn publish(&self, sender: &str, topic: Topic, payload: Payload) {
        self.deliver(Message::new(topic, sender, payload)).await;
    }

    /// Publish with a fresh correlation ID and suspend until the matching
    /// reply arrives or `timeout` elapses.
    ///
    /// Fails with [`BusError::UnknownTopic`] when no subscriber is
    /// registered for `topic` at call time, and [`BusError::Timeout`] on
    /// expiry. A timeout aborts only this caller's wait; a reply arriving
    /// later is dropped.
    pub async fn request(
        &self,
        sender: &str,
        topic: Topic,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Payload, BusError> {
        {
            let registry = self.registry.lock().await;
            let subscribed = registry
                .subscriptions
                .get(&topic)
                .is_some_and(|names| !names.is_empty());
            if !subscribed {
                return Err(BusError::UnknownTopic { topic });
            }
        }

        let correlation_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(correlation_id, tx);

        let message = Message::new(topic, sender, payload).with_correlation(correlation_id);
        self.deliver(message).await;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(BusError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&correlation_id);
                Err(BusError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Answer a request. At most one reply is honored per correlation ID;
    /// a reply with no pending requester is silently dropped.
    pub async fn reply(&self, sender: &str, correlation_id: Uuid, payload: Payload) {
        match self.pending.lock().await.remove(&correlation_id) {
            Some(tx) => {
                if tx.send(payload).is_err() {
                    tracing::debug!(
                        sender,
                        %correlation_id,
                        "Requester gone before reply arrived, dropping"
                    );
                }
            }
            None => {
                tracing::debug!(
                    sender,
                    %correlation_id,
                    "No pending request for correlation, reply dropped"
                );
            }
        }
    }

    /// Number of registered subscribers (distinct mailboxes).
    pub async fn subscriber_count(&self) -> usize {
        self.registry.lock().await.mailboxes.len()
    }

    /// Number of requests currently awaiting a reply.
    pub async fn pending_request_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Route a message to every subscriber of its topic.
    ///
    /// Holds the registry lock across the fan-out so that two deliveries on
    /// the same topic cannot interleave per subscriber.
    async fn deliver(&self, message: Message) {
        let registry = self.registry.lock().await;
        let targets = match registry.subscriptions.get(&message.topic) {
            Some(names) if !names.is_empty() => names,
            _ => {
                tracing::debug!(
                    topic = %message.topic,
                    payload = message.payload.name(),
                    "No subscribers for topic, message dropped"
                );
                return;
            }
        };
        for name in targets {
            match registry.mailboxes.get(name) {
                Some(tx) => {
                    if tx.send(message.clone()).is_err() {
                        tracing::warn!(
                            subscriber = %name,
                            topic = %message.topic,
                            "Subscriber mailbox closed, message dropped"
                        );
                    }
                }
                None => {
                    tracing::warn!(subscriber = %name, "Subscription without mailbox");
                }
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
