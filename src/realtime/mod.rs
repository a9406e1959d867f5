//! Message channels between clients, processors and the room topics.

pub mod topics;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

use futures::{future::BoxFuture, stream::BoxStream};
use thiserror::Error;
use tokio::sync::watch;

use crate::dto::message::Message;

pub use self::{
    topics::{TopicChannel, TopicHub},
    websocket::WsChannel,
};

/// Transport failures surfaced by a [`Channel`].
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The other side is gone or the channel was closed.
    #[error("channel closed")]
    Closed,
    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Duplex message channel.
///
/// `receive` is single-pass: the first call hands out the stream and later calls yield an empty
/// one. The stream ends when the transport goes away or [`Channel::close`] is called.
pub trait Channel: Send + Sync {
    /// Deliver one message.
    fn send(&self, message: Message) -> BoxFuture<'static, Result<(), ChannelError>>;
    /// Incoming messages.
    fn receive(&self) -> BoxStream<'static, Message>;
    /// Stop both directions.
    fn close(&self) -> Result<(), ChannelError>;
}

/// Resolves once the closing flag is raised or its owner is gone.
pub(crate) async fn closed_signal(mut closed: watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}
