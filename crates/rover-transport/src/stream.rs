//! Persistent WebSocket transport.
//!
//! [`StreamTransport`] keeps one WebSocket open to the device and writes one
//! text frame per [`Command`]:
//!
//! ```text
//! forward 100
//! left 50
//! forward 0     <- Stop
//! right 0       <- Center
//! ```
//!
//! The neutral commands reuse the two-token `"<direction> <magnitude>"`
//! shape with a zero magnitude; the device firmware has no dedicated
//! stop/center tokens.
//!
//! A reader task owns the receive half of the socket.  Text the device sends
//! back is published as [`EventPayload::DeviceMessage`]; the end of the
//! connection is published as [`EventPayload::Closed`] or
//! [`EventPayload::TransportError`] on the
//! [`Topic::Lifecycle`][crate::bus::Topic::Lifecycle] channel.
//!
//! The WebSocket handshake runs without holding the connection lock, so a
//! `send` or `close` issued while a connect is still pending returns at
//! once instead of queueing behind it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rover_types::{Command, Event, EventPayload, HostAddress, RoverError, TransportKind};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use crate::bus::{EventBus, Topic};
use crate::transport::{ConnectOutcome, Delivery, Transport};

/// Port the device firmware listens on when the address does not name one.
pub const DEFAULT_STREAM_PORT: u16 = 81;

const EVENT_SOURCE: &str = "rover-transport::stream";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Text frame for `command`.
pub fn stream_frame(command: &Command) -> String {
    match command {
        Command::Stop => "forward 0".to_string(),
        Command::Center => "right 0".to_string(),
        _ => format!("{} {}", command.direction(), command.magnitude()),
    }
}

struct Connection {
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
    ready: Arc<AtomicBool>,
}

/// WebSocket transport holding at most one open connection.
pub struct StreamTransport {
    bus: Arc<EventBus>,
    default_port: u16,
    connection: Mutex<Option<Connection>>,
    /// Readiness flag of the most recent connection.
    ready: parking_lot::Mutex<Arc<AtomicBool>>,
    /// Set while a handshake is in flight.
    connecting: AtomicBool,
    /// Bumped by `close`; a handshake that finishes under a newer epoch is
    /// discarded.
    epoch: AtomicU64,
}

/// Clears the `connecting` flag however the connect attempt ends.
struct PendingConnect<'a>(&'a AtomicBool);

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl StreamTransport {
    /// Create a transport that publishes lifecycle events on `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_default_port(bus, DEFAULT_STREAM_PORT)
    }

    /// Like [`new`](Self::new), with a different fallback port.
    pub fn with_default_port(bus: Arc<EventBus>, default_port: u16) -> Self {
        Self {
            bus,
            default_port,
            connection: Mutex::new(None),
            ready: parking_lot::Mutex::new(Arc::new(AtomicBool::new(false))),
            connecting: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    /// Normalise `host` into a WebSocket URL.
    ///
    /// No scheme means `ws://`; `http`/`https` map to `ws`/`wss`; a missing
    /// port becomes `default_port`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Configuration`] when the address cannot be parsed
    /// or names an unsupported scheme.
    pub fn stream_url(host: &HostAddress, default_port: u16) -> Result<Url, RoverError> {
        let raw = host.as_str();
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("ws://{raw}")
        };
        let mut url = Url::parse(&with_scheme)
            .map_err(|e| RoverError::Configuration(format!("invalid stream address '{raw}': {e}")))?;

        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(RoverError::Configuration(format!(
                    "unsupported stream scheme '{other}'"
                )));
            }
        };
        if url.scheme() != scheme {
            url.set_scheme(scheme)
                .map_err(|_| RoverError::Configuration(format!("cannot use '{raw}' as a stream address")))?;
        }
        if url.port().is_none() {
            url.set_port(Some(default_port))
                .map_err(|_| RoverError::Configuration(format!("cannot set port on '{raw}'")))?;
        }
        Ok(url)
    }

    async fn write(&self, message: Message) -> Result<(), RoverError> {
        let mut guard = self.connection.lock().await;
        let Some(conn) = guard.as_mut() else {
            return Err(RoverError::TransportUnavailable);
        };
        if !conn.ready.load(Ordering::SeqCst) {
            return Err(RoverError::TransportUnavailable);
        }
        match conn.sink.send(message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                conn.ready.store(false, Ordering::SeqCst);
                Err(RoverError::NetworkFailure(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Transport for StreamTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    async fn connect(&self, host: &HostAddress) -> Result<ConnectOutcome, RoverError> {
        if self.connecting.swap(true, Ordering::SeqCst) {
            return Ok(ConnectOutcome::Pending);
        }
        let _pending = PendingConnect(&self.connecting);

        let epoch = {
            let mut guard = self.connection.lock().await;
            if let Some(conn) = guard.as_ref()
                && conn.ready.load(Ordering::SeqCst)
            {
                return Ok(ConnectOutcome::AlreadyOpen);
            }
            // The peer hung up on the previous connection; discard what is left.
            if let Some(stale) = guard.take() {
                stale.reader.abort();
            }
            self.epoch.load(Ordering::SeqCst)
        };

        let url = Self::stream_url(host, self.default_port)?;
        info!(url = %url, "opening stream connection");
        let (mut ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| RoverError::NetworkFailure(format!("{url}: {e}")))?;

        let mut guard = self.connection.lock().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            drop(guard);
            let _ = ws.close(None).await;
            info!(url = %url, "connection closed before the handshake finished");
            return Err(RoverError::TransportUnavailable);
        }

        let (sink, source) = ws.split();
        let ready = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(source, Arc::clone(&self.bus), Arc::clone(&ready)));
        *self.ready.lock() = Arc::clone(&ready);
        *guard = Some(Connection { sink, reader, ready });
        Ok(ConnectOutcome::Opened)
    }

    /// Write one frame.  Fails with [`RoverError::TransportUnavailable`]
    /// without touching the network when no connection is ready.
    async fn send(&self, _host: &HostAddress, command: Command) -> Result<Delivery, RoverError> {
        let frame = stream_frame(&command);
        self.write(Message::Text(frame.clone().into())).await?;
        debug!(frame = %frame, "frame sent");
        Ok(Delivery {
            target: frame,
            echo: None,
        })
    }

    /// Write a WebSocket ping over the open connection.
    async fn test_connection(&self, _host: &HostAddress) -> Result<Delivery, RoverError> {
        self.write(Message::Ping(Default::default())).await?;
        Ok(Delivery {
            target: "ping".to_string(),
            echo: None,
        })
    }

    /// Close the open connection and cancel any pending handshake.
    async fn close(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.connection.lock().await;
        if let Some(mut conn) = guard.take() {
            conn.ready.store(false, Ordering::SeqCst);
            if let Err(e) = conn.sink.send(Message::Close(None)).await {
                debug!(error = %e, "close frame not delivered");
            }
            let _ = conn.sink.close().await;
            conn.reader.abort();
            info!("stream connection closed");
        }
    }

    fn is_open(&self) -> bool {
        self.ready.lock().load(Ordering::SeqCst)
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        // The reader holds the other half of the socket; stopping it closes the connection.
        if let Some(conn) = self.connection.get_mut().take() {
            conn.reader.abort();
        }
    }
}

async fn read_loop(mut source: SplitStream<WsStream>, bus: Arc<EventBus>, ready: Arc<AtomicBool>) {
    let last = loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(message = %text.as_str(), "device message");
                publish(&bus, EventPayload::DeviceMessage(text.as_str().to_string()));
            }
            Some(Ok(Message::Close(_))) | None => break EventPayload::Closed,
            Some(Err(e)) => {
                warn!(error = %e, "stream connection failed");
                break EventPayload::TransportError(e.to_string());
            }
            Some(Ok(_)) => {}
        }
    };
    ready.store(false, Ordering::SeqCst);
    publish(&bus, last);
}

fn publish(bus: &EventBus, payload: EventPayload) {
    // Nobody listening is fine: the bridge may already be gone.
    let _ = bus.publish_to(Topic::Lifecycle, Event::new(EVENT_SOURCE, payload));
}
