//! [`MotionBridge`] – the operator-facing control surface.
//!
//! Ties the command encoder, one [`Transport`] and the
//! [`ConnectionStateMachine`] together.  Callers only ever talk to the bridge:
//!
//! ```text
//! set_axis / reset / connect ──> MotionBridge ──> Transport ──> device
//!                                     ^               │
//!                                     └── Lifecycle ──┘   (EventBus)
//!                                     │
//!                                     └── Status ──> subscribers
//! ```
//!
//! Every change to the connection state or the status message is published
//! as an [`EventPayload::Status`] snapshot on [`Topic::Status`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rover_transport::{
    ConnectOutcome, Delivery, EventBus, RequestTransport, StreamTransport, Topic, TopicReceiver,
    Transport, DEFAULT_STREAM_PORT,
};
use rover_types::{
    Axis, AxisValue, BridgeStatus, Command, ConnectionState, Event, EventPayload, HostAddress,
    RoverError, TransportKind, encode,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::ConnectionStateMachine;

const EVENT_SOURCE: &str = "rover-bridge";

/// Status message of a freshly built bridge.
pub const READY_MESSAGE: &str = "Ready to connect";
/// Status message after [`MotionBridge::reset`].
pub const RESET_MESSAGE: &str = "Controls reset";

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Everything needed to build a [`MotionBridge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Delivery mechanism.
    #[serde(default)]
    pub transport: TransportKind,

    /// Device address; may be left blank and set later.
    #[serde(default = "default_host")]
    pub host: String,

    /// WebSocket port used when the host names none.
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,

    /// Per-request timeout for the request transport.  Unset means no
    /// timeout beyond the HTTP client's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,

    /// Buffered events per bus topic.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

fn default_host() -> String {
    "http://192.168.18.250".to_string()
}
fn default_stream_port() -> u16 {
    DEFAULT_STREAM_PORT
}
fn default_bus_capacity() -> usize {
    64
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: default_host(),
            stream_port: default_stream_port(),
            request_timeout_ms: None,
            bus_capacity: default_bus_capacity(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

struct BridgeState {
    machine: ConnectionStateMachine,
    status_message: String,
    forward_backward: AxisValue,
    left_right: AxisValue,
    host: String,
    transport: TransportKind,
}

impl BridgeState {
    fn snapshot(&self) -> BridgeStatus {
        BridgeStatus {
            connection: self.machine.state().clone(),
            status_message: self.status_message.clone(),
            forward_backward: self.forward_backward,
            left_right: self.left_right,
            host: self.host.clone(),
            transport: self.transport,
        }
    }
}

/// State reachable from both the caller and the lifecycle listener task.
struct Shared {
    state: Mutex<BridgeState>,
    bus: Arc<EventBus>,
}

impl Shared {
    /// Mutate the state and publish the resulting snapshot.
    ///
    /// The lock is released before returning and must never be held across
    /// an `.await`.
    fn update<R>(&self, f: impl FnOnce(&mut BridgeState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        let event = Event::new(EVENT_SOURCE, EventPayload::Status(state.snapshot()));
        // Publishing under the lock keeps snapshots in mutation order.
        let _ = self.bus.publish_to(Topic::Status, event);
        result
    }

    /// Record a failed operation and hand the error back.
    fn fail(&self, error: RoverError) -> RoverError {
        warn!(error = %error, "bridge operation failed");
        self.update(|st| {
            st.machine.record_failure(&error);
            st.status_message = format!("Error: {error}");
        });
        error
    }

    fn host(&self) -> Result<HostAddress, RoverError> {
        let raw = self.state.lock().host.clone();
        HostAddress::parse(&raw)
    }

    fn apply_lifecycle(&self, payload: EventPayload) {
        match payload {
            EventPayload::Opened => self.update(|st| {
                if st.machine.on_open() {
                    st.status_message = format!("Connected to {}", st.host.trim());
                }
            }),
            EventPayload::Closed => {
                info!("device closed the connection");
                self.update(|st| {
                    st.machine.on_close();
                    st.status_message = "Connection closed".to_string();
                });
            }
            EventPayload::TransportError(reason) => {
                warn!(reason = %reason, "transport error");
                self.update(|st| {
                    st.status_message = format!("Error: {reason}");
                    st.machine.on_error(reason);
                });
            }
            EventPayload::DeviceMessage(raw) => debug!(message = %raw, "device says"),
            EventPayload::Status(_) => {}
        }
    }
}

async fn listen(shared: Arc<Shared>, mut lifecycle: TopicReceiver) {
    loop {
        match lifecycle.recv().await {
            Ok(event) => shared.apply_lifecycle(event.payload),
            Err(RecvError::Lagged(n)) => warn!(lagged_by = n, "lifecycle listener lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MotionBridge
// ────────────────────────────────────────────────────────────────────────────

/// Maps two axes of operator input onto directional commands and delivers
/// them to the device.
///
/// All operations take `&self`; the bridge can be shared behind an [`Arc`]
/// between the operator loop and a signal handler.  Construction spawns a
/// listener task, so it must happen inside a Tokio runtime.
pub struct MotionBridge {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    listener: JoinHandle<()>,
}

impl MotionBridge {
    /// Build a bridge around `transport`.  `bus` must be the bus the
    /// transport publishes its lifecycle events on.
    pub fn new(transport: Arc<dyn Transport>, bus: Arc<EventBus>, host: impl Into<String>) -> Self {
        let state = BridgeState {
            machine: ConnectionStateMachine::new(),
            status_message: READY_MESSAGE.to_string(),
            forward_backward: AxisValue::ZERO,
            left_right: AxisValue::ZERO,
            host: host.into(),
            transport: transport.kind(),
        };
        let lifecycle = bus.subscribe_to(Topic::Lifecycle);
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            bus,
        });
        let listener = tokio::spawn(listen(Arc::clone(&shared), lifecycle));

        Self {
            shared,
            transport,
            listener,
        }
    }

    /// Build the bus and the transport selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, RoverError> {
        let bus = Arc::new(EventBus::new(config.bus_capacity.max(1)));
        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::Request => match config.request_timeout_ms {
                Some(ms) => Arc::new(RequestTransport::with_timeout(Duration::from_millis(ms))?),
                None => Arc::new(RequestTransport::new()),
            },
            TransportKind::Stream => Arc::new(StreamTransport::with_default_port(
                Arc::clone(&bus),
                config.stream_port,
            )),
        };
        info!(transport = %config.transport, host = %config.host, "motion bridge configured");
        Ok(Self::new(transport, bus, config.host.clone()))
    }

    /// Replace the host text.  Takes effect on the next operation; an open
    /// connection is left alone.
    pub fn set_host(&self, host: impl Into<String>) {
        let host = host.into();
        self.shared.update(|st| st.host = host);
    }

    pub fn host(&self) -> String {
        self.shared.state.lock().host.clone()
    }

    /// Current snapshot.
    pub fn status(&self) -> BridgeStatus {
        self.shared.state.lock().snapshot()
    }

    /// Receive a [`EventPayload::Status`] event after every change.
    pub fn subscribe(&self) -> TopicReceiver {
        self.shared.bus.subscribe_to(Topic::Status)
    }

    /// Quantise `raw`, store it for `axis` and send the matching command.
    ///
    /// Returns the new status message.
    ///
    /// # Errors
    ///
    /// [`RoverError::InvalidHost`] when the host is blank (the transport is
    /// not touched), otherwise whatever the transport reports.
    pub async fn set_axis(&self, axis: Axis, raw: f64) -> Result<String, RoverError> {
        let value = AxisValue::quantize(raw);
        self.shared.update(|st| match axis {
            Axis::Longitudinal => st.forward_backward = value,
            Axis::Lateral => st.left_right = value,
        });
        let host = self.shared.host().map_err(|e| self.shared.fail(e))?;
        self.dispatch(&host, encode(axis, value)).await
    }

    /// Zero both axes and send `Stop` then `Center`.
    ///
    /// Both commands are attempted even if the first fails.  Failures update
    /// the connection state, but the final status message is always
    /// [`RESET_MESSAGE`].
    pub async fn reset(&self) -> String {
        self.shared.update(|st| {
            st.forward_backward = AxisValue::ZERO;
            st.left_right = AxisValue::ZERO;
        });
        match self.shared.host() {
            Ok(host) => {
                for command in [Command::Stop, Command::Center] {
                    if let Err(e) = self.dispatch(&host, command).await {
                        debug!(command = %command, error = %e, "reset command not delivered");
                    }
                }
            }
            Err(e) => {
                self.shared.fail(e);
            }
        }
        self.shared
            .update(|st| st.status_message = RESET_MESSAGE.to_string());
        info!("controls reset");
        RESET_MESSAGE.to_string()
    }

    /// Establish reachability with the device.
    ///
    /// On a stream bridge that is already connecting or connected this is a
    /// no-op returning the current state.
    pub async fn connect(&self) -> Result<ConnectionState, RoverError> {
        let host = self.shared.host().map_err(|e| self.shared.fail(e))?;
        let kind = self.transport.kind();
        let proceed = self.shared.update(|st| {
            let proceed = st.machine.begin_connect(kind);
            if proceed {
                st.status_message = format!("Connecting to {host}");
            }
            proceed
        });
        if !proceed {
            debug!(host = %host, "connect ignored, already connecting or connected");
            return Ok(self.status().connection);
        }

        info!(host = %host, transport = %kind, "connecting");
        match self.transport.connect(&host).await {
            Ok(ConnectOutcome::Pending) => {
                debug!(host = %host, "transport is still connecting");
                Ok(self.status().connection)
            }
            Ok(outcome) => {
                if outcome == ConnectOutcome::AlreadyOpen {
                    debug!(host = %host, "transport was already open");
                }
                self.shared.apply_lifecycle(EventPayload::Opened);
                Ok(self.status().connection)
            }
            Err(e) => Err(self.shared.fail(e)),
        }
    }

    /// Run the transport's health check.  Returns the new status message.
    pub async fn test_connection(&self) -> Result<String, RoverError> {
        let host = self.shared.host().map_err(|e| self.shared.fail(e))?;
        let delivery = self
            .transport
            .test_connection(&host)
            .await
            .map_err(|e| self.shared.fail(e))?;
        Ok(self.record_delivery(delivery))
    }

    /// Close the transport and return to `Disconnected`.
    pub async fn disconnect(&self) {
        self.transport.close().await;
        self.shared.update(|st| {
            st.machine.on_close();
            st.status_message = "Disconnected".to_string();
        });
        info!("disconnected");
    }

    async fn dispatch(&self, host: &HostAddress, command: Command) -> Result<String, RoverError> {
        self.shared
            .update(|st| st.status_message = format!("Sending: {command}"));
        let delivery = self
            .transport
            .send(host, command)
            .await
            .map_err(|e| self.shared.fail(e))?;
        Ok(self.record_delivery(delivery))
    }

    fn record_delivery(&self, delivery: Delivery) -> String {
        let message = match delivery.echo {
            Some(body) => format!("Last command: {} - Response: {body}", delivery.target),
            None => format!("Last command: {}", delivery.target),
        };
        let request = self.transport.kind() == TransportKind::Request;
        self.shared.update(|st| {
            if request {
                st.machine.record_send_success();
            }
            st.status_message = message.clone();
        });
        message
    }
}

impl Drop for MotionBridge {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Transport double that records every call.
    #[derive(Default)]
    struct RecordingTransport {
        kind: TransportKind,
        sent: Mutex<Vec<(String, Command)>>,
        connects: AtomicUsize,
        pings: AtomicUsize,
        open: AtomicBool,
        fail_with: Mutex<Option<RoverError>>,
    }

    impl RecordingTransport {
        fn stream() -> Self {
            Self {
                kind: TransportKind::Stream,
                ..Self::default()
            }
        }

        fn fail_with(&self, error: Option<RoverError>) {
            *self.fail_with.lock() = error;
        }

        fn sent(&self) -> Vec<Command> {
            self.sent.lock().iter().map(|(_, c)| *c).collect()
        }

        fn check(&self) -> Result<(), RoverError> {
            match self.fail_with.lock().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn delivery(&self, host: &HostAddress, what: String) -> Delivery {
            match self.kind {
                TransportKind::Request => Delivery {
                    target: format!("{host}/{what}"),
                    echo: Some("ok".to_string()),
                },
                TransportKind::Stream => Delivery {
                    target: what,
                    echo: None,
                },
            }
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        async fn connect(&self, _host: &HostAddress) -> Result<ConnectOutcome, RoverError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            if self.open.swap(true, Ordering::SeqCst) {
                Ok(ConnectOutcome::AlreadyOpen)
            } else {
                Ok(ConnectOutcome::Opened)
            }
        }

        async fn send(&self, host: &HostAddress, command: Command) -> Result<Delivery, RoverError> {
            self.check()?;
            self.sent.lock().push((host.to_string(), command));
            Ok(self.delivery(host, command.to_string()))
        }

        async fn test_connection(&self, host: &HostAddress) -> Result<Delivery, RoverError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            Ok(self.delivery(host, "ping".to_string()))
        }

        async fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    fn bridge_with(transport: RecordingTransport, host: &str) -> (MotionBridge, Arc<RecordingTransport>, Arc<EventBus>) {
        let transport = Arc::new(transport);
        let bus = Arc::new(EventBus::default());
        let bridge = MotionBridge::new(transport.clone(), Arc::clone(&bus), host);
        (bridge, transport, bus)
    }

    /// Wait for a status snapshot satisfying `pred`.
    async fn wait_for_status(rx: &mut TopicReceiver, pred: impl Fn(&BridgeStatus) -> bool) -> BridgeStatus {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = rx.recv().await.expect("status bus open");
                if let EventPayload::Status(status) = event.payload {
                    if pred(&status) {
                        return status;
                    }
                }
            }
        })
        .await
        .expect("status update in time")
    }

    #[tokio::test]
    async fn fresh_bridge_is_ready_and_disconnected() {
        let (bridge, _, _) = bridge_with(RecordingTransport::default(), "http://rover");
        let status = bridge.status();
        assert_eq!(status.connection, ConnectionState::Disconnected);
        assert_eq!(status.status_message, READY_MESSAGE);
        assert_eq!(status.forward_backward, AxisValue::ZERO);
        assert_eq!(status.left_right, AxisValue::ZERO);
        assert_eq!(status.transport, TransportKind::Request);
    }

    #[tokio::test]
    async fn set_axis_quantises_and_sends() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::default(), "http://rover");

        let message = bridge.set_axis(Axis::Longitudinal, 137.0).await.unwrap();
        bridge.set_axis(Axis::Lateral, -200.0).await.unwrap();

        assert_eq!(transport.sent(), vec![Command::Forward(150), Command::Left(200)]);
        assert_eq!(message, "Last command: http://rover/forward 150 - Response: ok");
        let status = bridge.status();
        assert_eq!(status.forward_backward.get(), 150);
        assert_eq!(status.left_right.get(), -200);
        assert_eq!(status.connection, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn stream_sends_report_the_frame() {
        let (bridge, _, _) = bridge_with(RecordingTransport::stream(), "rover.local");
        bridge.connect().await.unwrap();
        let message = bridge.set_axis(Axis::Longitudinal, 100.0).await.unwrap();
        assert_eq!(message, "Last command: forward 100");
    }

    #[tokio::test]
    async fn reset_zeroes_axes_and_sends_stop_then_center() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::default(), "http://rover");
        bridge.set_axis(Axis::Longitudinal, 250.0).await.unwrap();
        bridge.set_axis(Axis::Lateral, 50.0).await.unwrap();

        let message = bridge.reset().await;

        assert_eq!(message, RESET_MESSAGE);
        assert_eq!(
            transport.sent(),
            vec![Command::Forward(250), Command::Right(50), Command::Stop, Command::Center]
        );
        let status = bridge.status();
        assert!(status.forward_backward.is_zero());
        assert!(status.left_right.is_zero());
        assert_eq!(status.status_message, RESET_MESSAGE);
    }

    #[tokio::test]
    async fn reset_attempts_both_commands_when_sends_fail() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::default(), "http://rover");
        transport.fail_with(Some(RoverError::NetworkFailure("down".to_string())));

        assert_eq!(bridge.reset().await, RESET_MESSAGE);
        assert!(matches!(bridge.status().connection, ConnectionState::Error(_)));
    }

    #[tokio::test]
    async fn blank_host_never_reaches_the_transport() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::default(), "   ");

        let err = bridge.set_axis(Axis::Longitudinal, 100.0).await.unwrap_err();

        assert_eq!(err, RoverError::InvalidHost);
        assert!(transport.sent().is_empty());
        let status = bridge.status();
        assert_eq!(status.connection, ConnectionState::Disconnected);
        assert_eq!(status.status_message, "Error: invalid host address");

        assert_eq!(bridge.connect().await.unwrap_err(), RoverError::InvalidHost);
        assert_eq!(bridge.test_connection().await.unwrap_err(), RoverError::InvalidHost);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 0);
        assert_eq!(transport.pings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_never_leave_the_bridge_connected() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::default(), "http://rover");
        bridge.set_axis(Axis::Longitudinal, 50.0).await.unwrap();
        assert!(bridge.status().connection.is_connected());

        for error in [
            RoverError::NetworkFailure("connection refused".to_string()),
            RoverError::ProtocolError {
                status: 503,
                body: "busy".to_string(),
            },
        ] {
            transport.fail_with(Some(error.clone()));
            let err = bridge.set_axis(Axis::Lateral, 100.0).await.unwrap_err();
            assert_eq!(err, error);
            let status = bridge.status();
            assert!(!status.connection.is_connected());
            assert_eq!(status.status_message, format!("Error: {error}"));

            transport.fail_with(None);
            bridge.set_axis(Axis::Lateral, 0.0).await.unwrap();
            assert!(bridge.status().connection.is_connected());
        }
    }

    #[tokio::test]
    async fn unavailable_transport_means_disconnected() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::stream(), "rover.local");
        transport.fail_with(Some(RoverError::TransportUnavailable));

        let err = bridge.set_axis(Axis::Longitudinal, 100.0).await.unwrap_err();
        assert_eq!(err, RoverError::TransportUnavailable);
        assert_eq!(bridge.status().connection, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn double_connect_on_stream_opens_once() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::stream(), "rover.local");

        assert_eq!(bridge.connect().await.unwrap(), ConnectionState::Connected);
        let before = bridge.status();
        assert_eq!(bridge.connect().await.unwrap(), ConnectionState::Connected);

        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.status(), before);
    }

    #[tokio::test]
    async fn request_connect_rechecks_reachability() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::default(), "http://rover");
        bridge.connect().await.unwrap();
        bridge.connect().await.unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);

        transport.fail_with(Some(RoverError::NetworkFailure("timeout".to_string())));
        assert!(bridge.connect().await.is_err());
        assert!(matches!(bridge.status().connection, ConnectionState::Error(_)));
    }

    #[tokio::test]
    async fn test_connection_reports_the_echo() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::default(), "http://rover");
        let message = bridge.test_connection().await.unwrap();
        assert_eq!(message, "Last command: http://rover/ping - Response: ok");
        assert_eq!(transport.pings.load(Ordering::SeqCst), 1);
        assert!(bridge.status().connection.is_connected());
    }

    #[tokio::test]
    async fn device_close_moves_to_disconnected() {
        let (bridge, _, bus) = bridge_with(RecordingTransport::stream(), "rover.local");
        bridge.connect().await.unwrap();
        let mut status_rx = bridge.subscribe();

        bus.publish_to(Topic::Lifecycle, Event::new("test", EventPayload::Closed))
            .unwrap();

        let status = wait_for_status(&mut status_rx, |s| s.connection == ConnectionState::Disconnected).await;
        assert_eq!(status.status_message, "Connection closed");
    }

    #[tokio::test]
    async fn transport_error_moves_to_error() {
        let (bridge, _, bus) = bridge_with(RecordingTransport::stream(), "rover.local");
        bridge.connect().await.unwrap();
        let mut status_rx = bridge.subscribe();

        bus.publish_to(
            Topic::Lifecycle,
            Event::new("test", EventPayload::TransportError("reset by peer".to_string())),
        )
        .unwrap();

        let status = wait_for_status(&mut status_rx, |s| !s.connection.is_connected()).await;
        assert_eq!(status.connection, ConnectionState::Error("reset by peer".to_string()));
        assert_eq!(status.status_message, "Error: reset by peer");
    }

    #[tokio::test]
    async fn device_messages_do_not_change_state() {
        let (bridge, _, bus) = bridge_with(RecordingTransport::stream(), "rover.local");
        bridge.connect().await.unwrap();
        let mut status_rx = bridge.subscribe();

        bus.publish_to(
            Topic::Lifecycle,
            Event::new("test", EventPayload::DeviceMessage("battery 80%".to_string())),
        )
        .unwrap();
        bus.publish_to(Topic::Lifecycle, Event::new("test", EventPayload::Closed))
            .unwrap();

        // The first snapshot after the device message is the one caused by Closed.
        let first = wait_for_status(&mut status_rx, |_| true).await;
        assert_eq!(first.connection, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_closes_transport() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::stream(), "rover.local");
        bridge.connect().await.unwrap();
        assert!(transport.is_open());

        bridge.disconnect().await;

        assert!(!transport.is_open());
        let status = bridge.status();
        assert_eq!(status.connection, ConnectionState::Disconnected);
        assert_eq!(status.status_message, "Disconnected");
    }

    #[tokio::test]
    async fn set_host_applies_to_next_send() {
        let (bridge, transport, _) = bridge_with(RecordingTransport::default(), "");
        bridge.set_host("  http://rover-2/ ");
        assert_eq!(bridge.host(), "  http://rover-2/ ");

        bridge.set_axis(Axis::Lateral, 100.0).await.unwrap();
        assert_eq!(transport.sent.lock()[0].0, "http://rover-2");
        assert_eq!(bridge.status().host, "  http://rover-2/ ");
    }

    #[tokio::test]
    async fn subscribers_see_every_change() {
        let (bridge, _, _) = bridge_with(RecordingTransport::default(), "http://rover");
        let mut status_rx = bridge.subscribe();

        bridge.set_axis(Axis::Longitudinal, -100.0).await.unwrap();

        let status = wait_for_status(&mut status_rx, |s| s.status_message.starts_with("Last command")).await;
        assert_eq!(status.forward_backward.get(), -100);
        assert_eq!(
            status.status_message,
            "Last command: http://rover/backward 100 - Response: ok"
        );
    }

    /// WebSocket device stub: counts connections and forwards every text
    /// frame it receives.
    async fn spawn_ws_device() -> (String, tokio::sync::mpsc::UnboundedReceiver<String>, Arc<AtomicUsize>) {
        use futures_util::StreamExt;
        use tokio_tungstenite::tungstenite::Message;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    while let Some(Ok(msg)) = ws.next().await {
                        if let Message::Text(text) = msg {
                            let _ = tx.send(text.as_str().to_string());
                        }
                    }
                });
            }
        });

        (format!("ws://{addr}"), rx, connections)
    }

    #[tokio::test]
    async fn stream_bridge_sends_ordered_frames_over_one_connection() {
        let (url, mut frames, connections) = spawn_ws_device().await;
        let bridge = MotionBridge::from_config(&BridgeConfig {
            transport: TransportKind::Stream,
            host: url,
            ..BridgeConfig::default()
        })
        .unwrap();

        assert_eq!(bridge.connect().await.unwrap(), ConnectionState::Connected);
        assert_eq!(bridge.connect().await.unwrap(), ConnectionState::Connected);

        assert_eq!(
            bridge.set_axis(Axis::Longitudinal, 100.0).await.unwrap(),
            "Last command: forward 100"
        );
        assert_eq!(
            bridge.set_axis(Axis::Lateral, -50.0).await.unwrap(),
            "Last command: left 50"
        );

        for expected in ["forward 100", "left 50"] {
            let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
                .await
                .expect("frame in time")
                .expect("device stub running");
            assert_eq!(frame, expected);
        }
        assert_eq!(connections.load(Ordering::SeqCst), 1);
        assert!(bridge.status().connection.is_connected());
    }

    #[tokio::test]
    async fn from_config_selects_transport() {
        let config = BridgeConfig {
            transport: TransportKind::Stream,
            host: "rover.local".to_string(),
            ..BridgeConfig::default()
        };
        let bridge = MotionBridge::from_config(&config).unwrap();
        let status = bridge.status();
        assert_eq!(status.transport, TransportKind::Stream);
        assert_eq!(status.host, "rover.local");

        let bridge = MotionBridge::from_config(&BridgeConfig {
            request_timeout_ms: Some(500),
            ..BridgeConfig::default()
        })
        .unwrap();
        assert_eq!(bridge.status().transport, TransportKind::Request);
        assert_eq!(bridge.host(), "http://192.168.18.250");
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: BridgeConfig = serde_json::from_str(r#"{"transport":"stream"}"#).unwrap();
        assert_eq!(config.transport, TransportKind::Stream);
        assert_eq!(config.stream_port, 81);
        assert_eq!(config.bus_capacity, 64);
        assert_eq!(config.request_timeout_ms, None);
        assert_eq!(config.host, "http://192.168.18.250");
    }
}
