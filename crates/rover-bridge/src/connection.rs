//! [`ConnectionStateMachine`] – reachability tracking for one transport.
//!
//! ```text
//!              connect()            onOpen
//! Disconnected ─────────> Connecting ──────> Connected
//!      ^                      │                  │
//!      │      onClose         │ onError          │ onClose / onError
//!      └──────────────────────┴──────> Error <───┘
//! ```
//!
//! `Error` ends the attempt; a fresh `connect()` re-enters `Connecting`.
//! Request-per-command transports have no session, so for them the last send
//! decides: success means `Connected`, failure means `Error`.

use rover_types::{ConnectionState, RoverError, TransportKind};

// ────────────────────────────────────────────────────────────────────────────
// ConnectionStateMachine
// ────────────────────────────────────────────────────────────────────────────

/// Owns a [`ConnectionState`] and the rules for moving it.
///
/// # Example
///
/// ```
/// use rover_bridge::connection::ConnectionStateMachine;
/// use rover_types::{ConnectionState, TransportKind};
///
/// let mut sm = ConnectionStateMachine::new();
/// assert!(sm.begin_connect(TransportKind::Stream));
/// assert!(sm.on_open());
/// assert_eq!(sm.state(), &ConnectionState::Connected);
///
/// // Already connected: a second stream connect does nothing.
/// assert!(!sm.begin_connect(TransportKind::Stream));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    /// Start in [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Enter `Connecting` if a connect attempt should go ahead.
    ///
    /// Returns `false`, leaving the state untouched, when a stream transport
    /// is already `Connecting` or `Connected`.  Request transports always
    /// proceed: connecting again re-checks reachability.
    pub fn begin_connect(&mut self, kind: TransportKind) -> bool {
        if kind == TransportKind::Stream
            && matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected)
        {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// The transport opened.  Only acts while `Connecting`; returns whether
    /// the state changed.
    pub fn on_open(&mut self) -> bool {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
            true
        } else {
            false
        }
    }

    /// The transport closed, from any state.
    pub fn on_close(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// The transport failed, from any state.
    pub fn on_error(&mut self, reason: impl Into<String>) {
        self.state = ConnectionState::Error(reason.into());
    }

    /// A request-per-command send reached the device.
    pub fn record_send_success(&mut self) {
        self.state = ConnectionState::Connected;
    }

    /// Apply a failed operation.
    ///
    /// | Error | New state |
    /// |---|---|
    /// | `InvalidHost` | unchanged (nothing was sent) |
    /// | `TransportUnavailable` | `Disconnected` |
    /// | anything else | `Error(message)` |
    pub fn record_failure(&mut self, error: &RoverError) {
        match error {
            RoverError::InvalidHost => {}
            RoverError::TransportUnavailable => self.on_close(),
            other => self.on_error(other.to_string()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
