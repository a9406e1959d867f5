//! In-memory client channel driven from tests.

use std::{sync::Arc, time::Duration};

use futures::{
    FutureExt, StreamExt,
    future::{self, BoxFuture},
    stream::{self, BoxStream},
};
use tokio::{
    sync::{Mutex, mpsc, watch},
    time::timeout,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Channel, ChannelError, closed_signal};
use crate::dto::message::{Event, Message};

/// Server side of the pair, handed to the code under test.
pub struct MemoryChannel {
    outbound: mpsc::UnboundedSender<Message>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    closed: watch::Sender<bool>,
}

/// Test side of the pair: pushes what the client "types", reads what the server sent.
pub struct ClientHandle {
    pub incoming: Option<mpsc::UnboundedSender<Message>>,
    pub outgoing: mpsc::UnboundedReceiver<Message>,
    closed: watch::Receiver<bool>,
}

pub fn client_pair() -> (Arc<MemoryChannel>, ClientHandle) {
    let (incoming, inbound) = mpsc::unbounded_channel();
    let (outbound, outgoing) = mpsc::unbounded_channel();
    let (closed, closed_rx) = watch::channel(false);
    let channel = Arc::new(MemoryChannel {
        outbound,
        inbound: Mutex::new(Some(inbound)),
        closed,
    });
    let handle = ClientHandle {
        incoming: Some(incoming),
        outgoing,
        closed: closed_rx,
    };
    (channel, handle)
}

impl ClientHandle {
    pub fn push(&self, message: Message) {
        if let Some(incoming) = &self.incoming {
            incoming.send(message).unwrap();
        }
    }

    /// Simulate the client going away.
    pub fn disconnect(&mut self) {
        self.incoming.take();
    }

    pub async fn next(&mut self) -> Message {
        timeout(Duration::from_secs(5), self.outgoing.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("channel dropped")
    }

    /// Skip messages until one with the given tag arrives.
    pub async fn next_of(&mut self, event: Event) -> Message {
        loop {
            let message = self.next().await;
            if message.event == event {
                return message;
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub async fn wait_closed(&mut self) {
        timeout(Duration::from_secs(5), self.closed.wait_for(|closed| *closed))
            .await
            .expect("timed out waiting for close")
            .expect("channel dropped");
    }
}

impl Channel for MemoryChannel {
    fn send(&self, message: Message) -> BoxFuture<'static, Result<(), ChannelError>> {
        let result = if *self.closed.borrow() {
            Err(ChannelError::Closed)
        } else {
            self.outbound.send(message).map_err(|_| ChannelError::Closed)
        };
        future::ready(result).boxed()
    }

    fn receive(&self) -> BoxStream<'static, Message> {
        let Some(inbound) = self.inbound.try_lock().ok().and_then(|mut guard| guard.take()) else {
            return stream::empty().boxed();
        };
        UnboundedReceiverStream::new(inbound)
            .take_until(closed_signal(self.closed.subscribe()))
            .boxed()
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.closed.send_replace(true);
        Ok(())
    }
}
