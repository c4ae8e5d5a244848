//! Realtime socket to the relay.
//!
//! A connector opens the socket and then owns a reader task that turns every
//! inbound frame into a [`RelaySignal`] on the session event queue. The
//! session keeps the write half as a [`RelaySocket`].

use crate::session::{EventSink, RelaySignal};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::SplitSink,
};
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, info, instrument, warn};

/// Opens relay sockets.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Opens a socket to `url`.
    ///
    /// On success the connector reports `Opened`, then each inbound text frame
    /// as `Message`, then exactly one `Closed` or `Failed` through `events`,
    /// unless the socket is closed locally first.
    async fn connect(&self, url: &str, events: EventSink) -> Result<Box<dyn RelaySocket>>;
}

/// Write half of an open relay socket.
#[async_trait]
pub trait RelaySocket: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Closes the socket. No further signals are reported for it.
    async fn close(&mut self);
}

/// `RelayConnector` over `tokio-tungstenite`.
#[derive(Default, Clone, Copy)]
pub struct WsConnector;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

pub struct WsSocket {
    sink: WsSink,
    reader: JoinHandle<()>,
}

#[async_trait]
impl RelayConnector for WsConnector {
    #[instrument(name = "relay_connect", skip_all)]
    async fn connect(&self, url: &str, events: EventSink) -> Result<Box<dyn RelaySocket>> {
        let (ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to relay WebSocket")?;
        let (sink, mut stream) = ws_stream.split();
        info!("Connected to relay.");
        events.relay(RelaySignal::Opened);

        let reader = tokio::spawn(async move {
            while let Some(msg_result) = stream.next().await {
                match msg_result {
                    Ok(WsMessage::Text(text)) => {
                        if !events.relay(RelaySignal::Message(text.as_str().to_owned())) {
                            return;
                        }
                    }
                    Ok(WsMessage::Close(close_frame)) => {
                        info!(?close_frame, "Relay closed the connection.");
                        events.relay(RelaySignal::Closed {
                            reason: close_frame.map(|frame| frame.reason.as_str().to_owned()),
                        });
                        return;
                    }
                    Ok(WsMessage::Binary(data)) => {
                        debug!(len = data.len(), "Ignoring binary frame from relay.");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Error reading from relay WebSocket: {}", e);
                        events.relay(RelaySignal::Failed(e.to_string()));
                        return;
                    }
                }
            }
            events.relay(RelaySignal::Closed { reason: None });
        });

        Ok(Box::new(WsSocket { sink, reader }))
    }
}

#[async_trait]
impl RelaySocket for WsSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink
            .send(WsMessage::Text(text.into()))
            .await
            .context("Failed to send to relay")
    }

    async fn close(&mut self) {
        self.reader.abort();
        if let Err(e) = self.sink.send(WsMessage::Close(None)).await {
            debug!("Close frame not sent: {}", e);
        }
        let _ = self.sink.close().await;
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
