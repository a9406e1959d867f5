//! Named publish/subscribe topics backed by broadcast channels.

use std::sync::Arc;

use async_stream::stream;
use dashmap::DashMap;
use futures::{
    FutureExt, StreamExt,
    future::{self, BoxFuture},
    stream::{self, BoxStream},
};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Channel, ChannelError, closed_signal};
use crate::dto::message::Message;

const DEFAULT_CAPACITY: usize = 64;

/// Topic every lobby socket listens on.
pub const LOBBY_TOPIC: &str = "lobby";

/// Topic every member of a room listens to.
pub fn room_topic(id: Uuid) -> String {
    format!("room:{id}")
}

/// Scheduling topic of a room, never relayed to clients.
pub fn internal_topic(id: Uuid) -> String {
    format!("room:{id}:internal")
}

/// Registry of broadcast topics keyed by name.
#[derive(Clone)]
pub struct TopicHub {
    topics: Arc<DashMap<String, broadcast::Sender<Message>>>,
    capacity: usize,
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TopicHub {
    /// Hub whose topics buffer `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// Subscribe to `topic`, creating it when needed.
    ///
    /// The subscription starts now, so messages published before the stream is polled are kept.
    pub fn channel(&self, topic: impl Into<String>) -> TopicChannel {
        let topic = topic.into();
        let receiver = self
            .topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        let (closed, _) = watch::channel(false);
        TopicChannel {
            hub: self.clone(),
            topic,
            receiver: Mutex::new(Some(receiver)),
            closed,
        }
    }

    /// Deliver to the current subscribers of `topic`. Nobody listening is not an error.
    pub fn publish(&self, topic: &str, message: Message) {
        let Some(sender) = self.topics.get(topic).map(|entry| entry.value().clone()) else {
            debug!(topic, event = ?message.event, "no subscribers for topic");
            return;
        };
        let _ = sender.send(message);
    }

    /// Drop the topic so that every subscriber's stream ends.
    pub fn shutdown(&self, topic: &str) {
        if self.topics.remove(topic).is_some() {
            debug!(topic, "topic shut down");
        }
    }

    /// Whether `topic` currently exists.
    #[cfg(test)]
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }
}

/// One subscriber handle on a named topic.
pub struct TopicChannel {
    hub: TopicHub,
    topic: String,
    receiver: Mutex<Option<broadcast::Receiver<Message>>>,
    closed: watch::Sender<bool>,
}

impl Channel for TopicChannel {
    fn send(&self, message: Message) -> BoxFuture<'static, Result<(), ChannelError>> {
        let result = if *self.closed.borrow() {
            Err(ChannelError::Closed)
        } else {
            self.hub.publish(&self.topic, message);
            Ok(())
        };
        future::ready(result).boxed()
    }

    fn receive(&self) -> BoxStream<'static, Message> {
        let receiver = self.receiver.try_lock().ok().and_then(|mut guard| guard.take());
        let Some(mut receiver) = receiver else {
            warn!(topic = %self.topic, "topic stream already taken");
            return stream::empty().boxed();
        };
        let topic = self.topic.clone();
        let closed = closed_signal(self.closed.subscribe());

        stream! {
            tokio::pin!(closed);
            loop {
                let next = tokio::select! {
                    _ = &mut closed => None,
                    received = receiver.recv() => match received {
                        Ok(message) => Some(Some(message)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped, "topic subscriber lagged");
                            Some(None)
                        }
                        Err(broadcast::error::RecvError::Closed) => None,
                    },
                };
                match next {
                    Some(Some(message)) => yield message,
                    Some(None) => continue,
                    None => break,
                }
            }
        }
        .boxed()
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.closed.send_replace(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::dto::message::Event;

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let hub = TopicHub::default();
        let first = hub.channel(LOBBY_TOPIC);
        let second = hub.channel(LOBBY_TOPIC);
        let mut first_stream = first.receive();
        let mut second_stream = second.receive();

        first.send(Message::signal(Event::GameEnded)).await.unwrap();

        assert_eq!(first_stream.next().await.unwrap().event, Event::GameEnded);
        assert_eq!(second_stream.next().await.unwrap().event, Event::GameEnded);
    }

    #[tokio::test]
    async fn receive_is_single_pass() {
        let hub = TopicHub::default();
        let channel = hub.channel("room:x");
        let _stream = channel.receive();

        assert!(channel.receive().next().await.is_none());
    }

    #[tokio::test]
    async fn close_ends_only_that_subscriber() {
        let hub = TopicHub::default();
        let closing = hub.channel(LOBBY_TOPIC);
        let staying = hub.channel(LOBBY_TOPIC);
        let mut closing_stream = closing.receive();
        let mut staying_stream = staying.receive();

        closing.close().unwrap();
        assert!(closing_stream.next().await.is_none());
        assert!(matches!(
            closing.send(Message::signal(Event::Chat)).await,
            Err(ChannelError::Closed)
        ));

        hub.publish(LOBBY_TOPIC, Message::signal(Event::Chat));
        assert_eq!(staying_stream.next().await.unwrap().event, Event::Chat);
    }

    #[tokio::test]
    async fn shutdown_ends_every_stream() {
        let hub = TopicHub::default();
        let id = Uuid::new_v4();
        let channel = hub.channel(room_topic(id));
        let mut stream = channel.receive();

        hub.shutdown(&room_topic(id));

        let ended = timeout(Duration::from_secs(1), stream.next()).await.unwrap();
        assert!(ended.is_none());
        assert!(!hub.contains(&room_topic(id)));
    }

    #[test]
    fn topic_names() {
        let id = Uuid::nil();
        assert_eq!(room_topic(id), format!("room:{id}"));
        assert_eq!(internal_topic(id), format!("room:{id}:internal"));
    }
}
