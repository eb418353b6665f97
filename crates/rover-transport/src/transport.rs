//! The transport capability.
//!
//! The bridge never speaks HTTP or WebSocket itself.  It hands a
//! [`Command`] to a [`Transport`], which translates it into the wire format
//! of the device and reports the outcome.
//!
//! # Overview
//!
//! - [`Transport`] – the trait every delivery mechanism implements.
//! - [`RequestTransport`][crate::request::RequestTransport] – one HTTP GET
//!   per command.
//! - [`StreamTransport`][crate::stream::StreamTransport] – one persistent
//!   WebSocket, one text frame per command.
//!
//! # Lifecycle events
//!
//! Results of caller-initiated operations come back as return values.
//! Everything that happens on its own (the device closing the socket, a read
//! error, an echoed message) is published on the
//! [`Topic::Lifecycle`][crate::bus::Topic::Lifecycle] channel of the
//! [`EventBus`][crate::bus::EventBus] the transport was built with.

use async_trait::async_trait;
use rover_types::{Command, HostAddress, RoverError, TransportKind};

/// What `connect` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A connection was established (or, for the request transport, the
    /// health check succeeded).
    Opened,
    /// A connection was already open; nothing new was opened.
    AlreadyOpen,
    /// Another connect is still in flight; nothing new was started.
    Pending,
}

/// Confirmation of a delivered command or health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// What went on the wire: the request URL or the text frame.
    pub target: String,
    /// Response body, for transports that receive one.
    pub echo: Option<String>,
}

/// Every delivery mechanism must implement this trait.
///
/// # Contract
///
/// * `connect` – establish reachability.  At most one open connection per
///   instance; a repeat call returns [`ConnectOutcome::AlreadyOpen`], or
///   [`ConnectOutcome::Pending`] while the first is still in flight.
/// * `send` – deliver one command.  Never panics; every fault is a
///   [`RoverError`].
/// * `test_connection` – transport-specific health check.
/// * `close` – release any open connection.  Idempotent.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn connect(&self, host: &HostAddress) -> Result<ConnectOutcome, RoverError>;

    async fn send(&self, host: &HostAddress, command: Command) -> Result<Delivery, RoverError>;

    async fn test_connection(&self, host: &HostAddress) -> Result<Delivery, RoverError>;

    async fn close(&self);

    /// `true` while a connection is open and ready to write.  Stateless
    /// transports always report `false`.
    fn is_open(&self) -> bool;
}
