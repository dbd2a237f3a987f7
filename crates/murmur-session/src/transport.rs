//! Network transport for the live session.
//!
//! A [`Connector`] opens the remote session and hands back a
//! [`Connection`]: an outbound sender for client frames, an inbound
//! receiver of decoded server frames, and a close handle. The session
//! never touches the socket directly.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::protocol::{ClientMessage, ServerMessage};

/// Public endpoint of the bidirectional generation service.
pub const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// How long to wait for the socket and the `setupComplete` reply.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// How long the reader may linger after the socket was asked to close.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// One item from the inbound side of a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ServerMessage),
    /// A frame that was not valid protocol JSON.
    Malformed(String),
    /// The remote end closed, with its reason if it gave one.
    Closed(Option<String>),
}

/// An open session with the remote model.
#[derive(Debug)]
pub struct Connection {
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
    /// Fire (or drop) to close the connection.
    pub closer: oneshot::Sender<()>,
}

/// The far side of an in-memory connection.
#[derive(Debug)]
pub struct RemoteEnd {
    /// Frames the session sent.
    pub sent: mpsc::UnboundedReceiver<ClientMessage>,
    inbound: mpsc::UnboundedSender<Inbound>,
    closed: oneshot::Receiver<()>,
}

impl RemoteEnd {
    /// Delivers a server frame to the session.
    pub fn push(&self, message: ServerMessage) -> bool {
        self.inbound.send(Inbound::Message(message)).is_ok()
    }

    /// Delivers a server frame given as JSON text.
    pub fn push_json(&self, json: &str) -> bool {
        let item = match ServerMessage::from_json(json) {
            Ok(message) => Inbound::Message(message),
            Err(e) => Inbound::Malformed(e.to_string()),
        };
        self.inbound.send(item).is_ok()
    }

    /// Simulates the server closing the connection.
    pub fn hang_up(&self, reason: Option<&str>) {
        let _ = self.inbound.send(Inbound::Closed(reason.map(str::to_string)));
    }

    /// Whether the session asked to close (or dropped its close handle).
    pub fn is_closed(&mut self) -> bool {
        !matches!(self.closed.try_recv(), Err(oneshot::error::TryRecvError::Empty))
    }
}

impl Connection {
    /// A connection wired to a [`RemoteEnd`] instead of a socket.
    pub fn in_memory() -> (Connection, RemoteEnd) {
        let (outbound, sent) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (closer, closed) = oneshot::channel();
        (
            Connection {
                outbound,
                inbound,
                closer,
            },
            RemoteEnd {
                sent,
                inbound: inbound_tx,
                closed,
            },
        )
    }
}

/// Opens remote sessions.
pub trait Connector: Send + Sync {
    /// Opens a session configured by `config` and completes its setup
    /// handshake.
    fn connect<'a>(
        &'a self,
        config: &'a SessionConfig,
    ) -> BoxFuture<'a, Result<Connection, SessionError>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for the live generation service over a websocket.
#[derive(Clone)]
pub struct GeminiConnector {
    endpoint: String,
    api_key: String,
    handshake_timeout: Duration,
}

impl std::fmt::Debug for GeminiConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConnector")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

impl GeminiConnector {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    fn url(&self) -> String {
        if self.api_key.is_empty() {
            self.endpoint.clone()
        } else {
            format!("{}?key={}", self.endpoint, self.api_key)
        }
    }

    async fn open(&self, config: &SessionConfig) -> Result<Connection, SessionError> {
        info!(endpoint = %self.endpoint, model = %config.model, voice = %config.voice, "opening live session");

        let (ws, _response) = tokio::time::timeout(self.handshake_timeout, connect_async(self.url()))
            .await
            .map_err(|_| SessionError::ConnectionFailed("websocket connect timed out".into()))?
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let setup = ClientMessage::setup(
            &config.qualified_model(),
            &config.voice,
            &config.system_instruction,
            &config.tools,
        )
        .to_json()
        .map_err(|e| SessionError::Protocol(e.to_string()))?;
        sink.send(Message::Text(setup.into()))
            .await
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;

        tokio::time::timeout(self.handshake_timeout, await_setup_complete(&mut stream))
            .await
            .map_err(|_| SessionError::ConnectionFailed("setup handshake timed out".into()))??;
        debug!("setup complete");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (closer_tx, closer_rx) = oneshot::channel();

        let reader = tokio::spawn(read_loop(stream, inbound_tx));
        let reader_abort = reader.abort_handle();
        tokio::spawn(async move {
            write_loop(sink, outbound_rx, closer_rx).await;
            if tokio::time::timeout(CLOSE_GRACE, reader).await.is_err() {
                reader_abort.abort();
            }
        });

        Ok(Connection {
            outbound: outbound_tx,
            inbound: inbound_rx,
            closer: closer_tx,
        })
    }
}

impl Connector for GeminiConnector {
    fn connect<'a>(
        &'a self,
        config: &'a SessionConfig,
    ) -> BoxFuture<'a, Result<Connection, SessionError>> {
        Box::pin(self.open(config))
    }
}

/// Text payload of a data frame. The service sends JSON in both text and
/// binary frames.
fn frame_text(frame: &Message) -> Option<Result<&str, std::str::Utf8Error>> {
    match frame {
        Message::Text(text) => Some(Ok(text.as_str())),
        Message::Binary(bytes) => Some(std::str::from_utf8(bytes)),
        _ => None,
    }
}

fn close_reason(frame: &Message) -> Option<String> {
    match frame {
        Message::Close(Some(close)) => Some(format!(
            "{} {}",
            u16::from(close.code),
            close.reason.as_str()
        )),
        _ => None,
    }
}

async fn await_setup_complete(stream: &mut SplitStream<WsStream>) -> Result<(), SessionError> {
    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;
        if let Message::Close(_) = frame {
            let reason = close_reason(&frame).unwrap_or_else(|| "no reason".into());
            return Err(SessionError::ConnectionFailed(format!(
                "closed during setup: {reason}"
            )));
        }
        let Some(text) = frame_text(&frame) else {
            continue;
        };
        let text = text.map_err(|e| SessionError::Protocol(e.to_string()))?;
        match ServerMessage::from_json(text) {
            Ok(message) if message.setup_complete.is_some() => return Ok(()),
            Ok(_) => debug!("ignoring frame before setup completed"),
            Err(e) => warn!(error = %e, "malformed frame during setup"),
        }
    }
    Err(SessionError::ConnectionFailed(
        "connection closed during setup".into(),
    ))
}

async fn read_loop(mut stream: SplitStream<WsStream>, inbound: mpsc::UnboundedSender<Inbound>) {
    while let Some(frame) = stream.next().await {
        let item = match frame {
            Ok(frame @ Message::Close(_)) => {
                let reason = close_reason(&frame);
                info!(reason = reason.as_deref().unwrap_or("none"), "server closed session");
                let _ = inbound.send(Inbound::Closed(reason));
                return;
            }
            Ok(frame) => match frame_text(&frame) {
                Some(Ok(text)) => match ServerMessage::from_json(text) {
                    Ok(message) => Inbound::Message(message),
                    Err(e) => Inbound::Malformed(e.to_string()),
                },
                Some(Err(e)) => Inbound::Malformed(e.to_string()),
                None => continue,
            },
            Err(e) => {
                warn!(error = %e, "websocket read failed");
                let _ = inbound.send(Inbound::Closed(Some(e.to_string())));
                return;
            }
        };
        if inbound.send(item).is_err() {
            return;
        }
    }
    let _ = inbound.send(Inbound::Closed(None));
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    mut closer: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else { break };
                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "failed to encode client frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    warn!(error = %e, "websocket write failed");
                    break;
                }
            }
            _ = &mut closer => break,
        }
    }
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
    debug!("websocket writer finished");
}
