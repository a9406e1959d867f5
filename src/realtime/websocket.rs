//! Client channel over an axum WebSocket.

use async_stream::stream;
use axum::extract::ws::{Message as Frame, WebSocket};
use futures::{
    FutureExt, SinkExt, StreamExt,
    future::{self, BoxFuture},
    stream::{self, BoxStream, SplitStream},
};
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use super::{Channel, ChannelError, closed_signal};
use crate::dto::message::Message;

/// WebSocket split into a writer task fed by an unbounded queue and a lazily decoded reader.
pub struct WsChannel {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: Mutex<Option<SplitStream<WebSocket>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    closed: watch::Sender<bool>,
}

impl WsChannel {
    /// Split `socket` and start its reader and writer tasks.
    pub fn new(socket: WebSocket) -> Self {
        let (mut sender, receiver) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let closing = matches!(frame, Frame::Close(_));
                if sender.send(frame).await.is_err() || closing {
                    break;
                }
            }
        });

        let (closed, _) = watch::channel(false);
        Self {
            outbound,
            inbound: Mutex::new(Some(receiver)),
            writer: Mutex::new(Some(writer)),
            closed,
        }
    }

    /// Close the socket and wait for the writer task to flush and stop.
    pub async fn finalize(&self) {
        if let Err(err) = self.close() {
            debug!(error = %err, "websocket writer already gone");
        }
        if let Some(writer) = self.writer.lock().await.take() {
            let _ = writer.await;
        }
    }
}

impl Channel for WsChannel {
    fn send(&self, message: Message) -> BoxFuture<'static, Result<(), ChannelError>> {
        let result = serde_json::to_string(&message)
            .map_err(ChannelError::from)
            .and_then(|text| {
                self.outbound
                    .send(Frame::Text(text.into()))
                    .map_err(|_| ChannelError::Closed)
            });
        future::ready(result).boxed()
    }

    fn receive(&self) -> BoxStream<'static, Message> {
        let inbound = self.inbound.try_lock().ok().and_then(|mut guard| guard.take());
        let Some(mut inbound) = inbound else {
            warn!("websocket stream already taken");
            return stream::empty().boxed();
        };
        let outbound = self.outbound.clone();
        let closed = closed_signal(self.closed.subscribe());

        stream! {
            tokio::pin!(closed);
            loop {
                let frame = tokio::select! {
                    _ = &mut closed => None,
                    frame = inbound.next() => frame,
                };
                let Some(frame) = frame else {
                    break;
                };
                match frame {
                    Ok(Frame::Text(text)) => match serde_json::from_str::<Message>(&text) {
                        Ok(message) => yield message,
                        Err(err) => warn!(error = %err, "ignoring undecodable client message"),
                    },
                    Ok(Frame::Ping(payload)) => {
                        let _ = outbound.send(Frame::Pong(payload));
                    }
                    Ok(Frame::Close(_)) => {
                        debug!("client closed websocket");
                        break;
                    }
                    Ok(Frame::Binary(_)) | Ok(Frame::Pong(_)) => {}
                    Err(err) => {
                        warn!(error = %err, "websocket error");
                        break;
                    }
                }
            }
        }
        .boxed()
    }

    fn close(&self) -> Result<(), ChannelError> {
        if self.closed.send_replace(true) {
            return Ok(());
        }
        self.outbound
            .send(Frame::Close(None))
            .map_err(|_| ChannelError::Closed)
    }
}
