//! Per-topic publish/subscribe fan-out.
//!
//! Every session owns four topics (status, timer, code, evaluation). Each
//! topic is backed by its own `tokio::sync::broadcast` channel, created on
//! first subscription and dropped once the last subscriber goes away.
//! Publishing to a topic nobody listens to is a silent no-op: there is no
//! queue and no replay.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    Status,
    Timer,
    Code,
    Evaluation,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::Status => "status",
            TopicKind::Timer => "timer",
            TopicKind::Code => "code",
            TopicKind::Evaluation => "evaluation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic {
    pub session_id: Uuid,
    pub kind: TopicKind,
}

impl Topic {
    pub fn new(session_id: Uuid, kind: TopicKind) -> Self {
        Self { session_id, kind }
    }

    pub fn status(session_id: Uuid) -> Self {
        Self::new(session_id, TopicKind::Status)
    }

    pub fn timer(session_id: Uuid) -> Self {
        Self::new(session_id, TopicKind::Timer)
    }

    pub fn code(session_id: Uuid) -> Self {
        Self::new(session_id, TopicKind::Code)
    }

    pub fn evaluation(session_id: Uuid) -> Self {
        Self::new(session_id, TopicKind::Evaluation)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/topic/session/{}/{}", self.session_id, self.kind.as_str())
    }
}

/// A message as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: Topic,
    pub payload: Value,
}

#[derive(Debug)]
struct Channel {
    sender: broadcast::Sender<Arc<Published>>,
    generation: u64,
}

type Channels = RwLock<HashMap<Topic, Channel>>;

#[derive(Debug)]
pub struct BroadcastHub {
    channels: Arc<Channels>,
    capacity: usize,
    generations: AtomicU64,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            generations: AtomicU64::new(0),
        }
    }

    /// Serializes `message` and fans it out. Returns the number of
    /// subscribers that received it.
    pub fn publish<T: Serialize>(&self, topic: Topic, message: &T) -> usize {
        let payload = match serde_json::to_value(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping unserializable message for {}: {}", topic, e);
                return 0;
            }
        };

        let sender = match self.channels.read().get(&topic) {
            Some(channel) => channel.sender.clone(),
            None => {
                debug!("No subscribers on {}", topic);
                return 0;
            }
        };

        match sender.send(Arc::new(Published { topic, payload })) {
            Ok(delivered) => delivered,
            Err(_) => {
                // every receiver is gone; forget the channel
                let mut channels = self.channels.write();
                if channels.get(&topic).map_or(false, |c| c.sender.receiver_count() == 0) {
                    channels.remove(&topic);
                }
                0
            }
        }
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (receiver, generation) = {
            let mut channels = self.channels.write();
            let channel = channels.entry(topic).or_insert_with(|| Channel {
                sender: broadcast::channel(self.capacity).0,
                generation: self.generations.fetch_add(1, Ordering::Relaxed),
            });
            (channel.sender.subscribe(), channel.generation)
        };
        debug!("New subscriber on {}", topic);
        Subscription {
            topic,
            generation,
            channels: Arc::downgrade(&self.channels),
            inner: BroadcastStream::new(receiver),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.channels
            .read()
            .get(&topic)
            .map_or(0, |channel| channel.sender.receiver_count())
    }

    /// Drops every channel belonging to a session. Live subscriptions end.
    pub fn close_session(&self, session_id: Uuid) {
        self.channels.write().retain(|topic, _| topic.session_id != session_id);
    }

    #[cfg(test)]
    fn channel_count(&self) -> usize {
        self.channels.read().len()
    }
}

/// Stream of messages on one topic. Messages missed because the subscriber
/// fell more than the hub capacity behind are skipped with a warning.
/// Dropping the last subscription on a topic removes its channel.
pub struct Subscription {
    topic: Topic,
    generation: u64,
    channels: Weak<Channels>,
    inner: BroadcastStream<Arc<Published>>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub async fn recv(&mut self) -> Option<Arc<Published>> {
        self.next().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(channels) = self.channels.upgrade() else {
            return;
        };
        let mut channels = channels.write();
        // our own receiver is still alive here; a channel recreated after
        // close_session carries a newer generation and is left alone
        let last = channels
            .get(&self.topic)
            .map_or(false, |c| c.generation == self.generation && c.sender.receiver_count() <= 1);
        if last {
            channels.remove(&self.topic);
            debug!("Last subscriber left {}", self.topic);
        }
    }
}

impl Stream for Subscription {
    type Item = Arc<Published>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(message))) => return Poll::Ready(Some(message)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!("Subscriber on {} lagged, skipped {} messages", self.topic, skipped);
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
