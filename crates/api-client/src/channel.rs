use crate::error::ChannelError;
use core_types::ChannelEndpoint;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// Events are buffered up to this many before the socket reader waits on the consumer.
const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// Everything the channel reports, in arrival order.
///
/// `Open` comes at most once and first. `Closed` comes exactly once and last;
/// after it `next_event` returns `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

enum Command {
    Send(String),
    Close,
}

/// A bidirectional text channel to a running backtest.
///
/// The socket is driven by a background task. The handle only flips the
/// shared state and queues commands, so `send` and `close` never block.
pub struct StreamChannel {
    uri: Url,
    state: Arc<AtomicU8>,
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::Receiver<ChannelEvent>,
}

impl StreamChannel {
    /// Starts connecting to `endpoint`. A bare port is combined with `page_host`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(endpoint: &ChannelEndpoint, page_host: &str) -> Result<Self, ChannelError> {
        let uri = resolve_uri(endpoint, page_host)?;
        let state = Arc::new(AtomicU8::new(CONNECTING));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        tracing::debug!(%uri, "Opening stream channel.");
        tokio::spawn(drive_channel(uri.clone(), state.clone(), command_rx, event_tx));

        Ok(Self {
            uri,
            state,
            commands: command_tx,
            events: event_rx,
        })
    }

    /// Queues a text message. Only allowed while the channel is open.
    pub fn send(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        if self.state() != ChannelState::Open {
            return Err(ChannelError::NotOpen);
        }
        self.commands
            .send(Command::Send(text.into()))
            .map_err(|_| ChannelError::NotOpen)
    }

    /// Closes the channel. Idempotent.
    pub fn close(&self) {
        if self.state.swap(CLOSED, Ordering::SeqCst) != CLOSED {
            let _ = self.commands.send(Command::Close);
        }
    }

    /// Waits for the next event. `None` once `Closed` has been delivered.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Returns an already-buffered event without waiting.
    pub fn try_next_event(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    pub fn state(&self) -> ChannelState {
        match self.state.load(Ordering::SeqCst) {
            CONNECTING => ChannelState::Connecting,
            OPEN => ChannelState::Open,
            _ => ChannelState::Closed,
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Turns a run endpoint into the WebSocket URI to connect to.
pub fn resolve_uri(endpoint: &ChannelEndpoint, page_host: &str) -> Result<Url, ChannelError> {
    let raw = match endpoint {
        ChannelEndpoint::Port(0) => {
            return Err(ChannelError::InvalidEndpoint("port 0".to_string()));
        }
        ChannelEndpoint::Port(port) => {
            let host = page_host.trim();
            if host.is_empty() {
                return Err(ChannelError::InvalidEndpoint(format!(
                    "port {} given but no page host to pair it with",
                    port
                )));
            }
            format!("ws://{}:{}/", host, port)
        }
        ChannelEndpoint::Uri(uri) => uri.trim().to_string(),
    };

    let uri = Url::parse(&raw).map_err(|e| ChannelError::InvalidEndpoint(format!("{}: {}", raw, e)))?;
    match uri.scheme() {
        "ws" | "wss" if uri.host_str().is_some() => Ok(uri),
        _ => Err(ChannelError::InvalidEndpoint(format!("not a WebSocket URI: {}", raw))),
    }
}

async fn drive_channel(
    uri: Url,
    state: Arc<AtomicU8>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<ChannelEvent>,
) {
    // While connecting, the only possible command is a close.
    let connected = tokio::select! {
        result = connect_async(uri.as_str()) => Some(result),
        _ = commands.recv() => None,
    };

    let mut ws = match connected {
        Some(Ok((ws, _response))) => ws,
        Some(Err(e)) => {
            tracing::warn!(%uri, error = %e, "Stream channel failed to connect.");
            state.store(CLOSED, Ordering::SeqCst);
            let _ = events.send(ChannelEvent::Error(e.to_string())).await;
            let _ = events
                .send(ChannelEvent::Closed {
                    code: None,
                    reason: "connect failed".to_string(),
                })
                .await;
            return;
        }
        None => {
            let _ = events
                .send(ChannelEvent::Closed {
                    code: None,
                    reason: "closed before open".to_string(),
                })
                .await;
            return;
        }
    };

    if state
        .compare_exchange(CONNECTING, OPEN, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        // Closed locally while the handshake was completing.
        let _ = ws.close(None).await;
        let _ = events
            .send(ChannelEvent::Closed {
                code: None,
                reason: "closed before open".to_string(),
            })
            .await;
        return;
    }

    tracing::info!(%uri, "Stream channel open.");
    if events.send(ChannelEvent::Open).await.is_err() {
        let _ = ws.close(None).await;
        return;
    }

    let (mut write, mut read) = ws.split();
    let (code, reason) = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        let _ = events.send(ChannelEvent::Error(e.to_string())).await;
                        break (None, "send failed".to_string());
                    }
                }
                Some(Command::Close) | None => {
                    let _ = write.close().await;
                    break (None, "closed by client".to_string());
                }
            },
            message = read.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                            None => (None, String::new()),
                        };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(%uri, error = %e, "Stream channel read failed.");
                        let _ = events.send(ChannelEvent::Error(e.to_string())).await;
                        break (None, "read failed".to_string());
                    }
                    None => break (None, "stream ended".to_string()),
                };
                if events.send(ChannelEvent::Message(text)).await.is_err() {
                    let _ = write.close().await;
                    break (None, "receiver dropped".to_string());
                }
            }
        }
    };

    state.store(CLOSED, Ordering::SeqCst);
    tracing::debug!(%uri, ?code, %reason, "Stream channel closed.");
    let _ = events.send(ChannelEvent::Closed { code, reason }).await;
}
