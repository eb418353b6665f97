//! `rover-types` – shared vocabulary for the rover-link workspace.
//!
//! Holds the data model every other crate speaks: the two control axes and
//! their quantised values, the directional [`Command`]s derived from them,
//! the connection state reported to the operator, the bus [`Event`]
//! envelope, and the workspace-wide [`RoverError`].

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One of the two independent control dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Forward / backward thrust.
    Longitudinal,
    /// Left / right steering.
    Lateral,
}

/// A quantised axis position.
///
/// Always a multiple of [`AxisValue::STEP`] inside
/// `[AxisValue::MIN, AxisValue::MAX]`.  The only way to build one from
/// operator input is [`AxisValue::quantize`], so an out-of-range value cannot
/// exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub struct AxisValue(i16);

impl AxisValue {
    /// Lower bound of the axis range.
    pub const MIN: i16 = -250;
    /// Upper bound of the axis range.
    pub const MAX: i16 = 250;
    /// Granularity of the axis.
    pub const STEP: i16 = 50;
    /// The neutral position.
    pub const ZERO: AxisValue = AxisValue(0);

    /// Clamp `raw` into the axis range and round it to the nearest step
    /// (halves round away from zero).  NaN maps to zero.
    pub fn quantize(raw: f64) -> Self {
        if raw.is_nan() {
            return Self::ZERO;
        }
        let clamped = raw.clamp(f64::from(Self::MIN), f64::from(Self::MAX));
        let steps = (clamped / f64::from(Self::STEP)).round() as i16;
        Self(steps * Self::STEP)
    }

    /// Signed value.
    pub fn get(self) -> i16 {
        self.0
    }

    /// Absolute value, used as the command magnitude.
    pub fn magnitude(self) -> u16 {
        self.0.unsigned_abs()
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<AxisValue> for i16 {
    fn from(value: AxisValue) -> Self {
        value.0
    }
}

impl TryFrom<i16> for AxisValue {
    type Error = RoverError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        if !(Self::MIN..=Self::MAX).contains(&value) || value % Self::STEP != 0 {
            return Err(RoverError::Configuration(format!(
                "axis value {value} is not a multiple of {} in [{}, {}]",
                Self::STEP,
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }
}

impl fmt::Display for AxisValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A discrete directional instruction for the device.
///
/// Magnitudes are always the absolute axis value; a zero axis value is
/// always [`Command::Stop`] or [`Command::Center`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Forward(u16),
    Backward(u16),
    Left(u16),
    Right(u16),
    /// Longitudinal neutral.
    Stop,
    /// Lateral neutral.
    Center,
}

impl Command {
    /// Lower-case direction token (`"forward"`, `"stop"`, …).
    pub fn direction(&self) -> &'static str {
        match self {
            Command::Forward(_) => "forward",
            Command::Backward(_) => "backward",
            Command::Left(_) => "left",
            Command::Right(_) => "right",
            Command::Stop => "stop",
            Command::Center => "center",
        }
    }

    /// Magnitude carried by the command (0 for the neutral commands).
    pub fn magnitude(&self) -> u16 {
        match *self {
            Command::Forward(n) | Command::Backward(n) | Command::Left(n) | Command::Right(n) => n,
            Command::Stop | Command::Center => 0,
        }
    }

    /// The axis this command drives.
    pub fn axis(&self) -> Axis {
        match self {
            Command::Forward(_) | Command::Backward(_) | Command::Stop => Axis::Longitudinal,
            Command::Left(_) | Command::Right(_) | Command::Center => Axis::Lateral,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Stop | Command::Center => f.write_str(self.direction()),
            _ => write!(f, "{} {}", self.direction(), self.magnitude()),
        }
    }
}

/// Map an axis position to the command the device understands.
///
/// Pure and total: every [`AxisValue`] is already in range.
pub fn encode(axis: Axis, value: AxisValue) -> Command {
    let n = value.magnitude();
    match (axis, value.get().cmp(&0)) {
        (Axis::Longitudinal, Ordering::Greater) => Command::Forward(n),
        (Axis::Longitudinal, Ordering::Less) => Command::Backward(n),
        (Axis::Longitudinal, Ordering::Equal) => Command::Stop,
        (Axis::Lateral, Ordering::Greater) => Command::Right(n),
        (Axis::Lateral, Ordering::Less) => Command::Left(n),
        (Axis::Lateral, Ordering::Equal) => Command::Center,
    }
}

/// A validated, non-blank transport endpoint (URL or socket address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddress(String);

impl HostAddress {
    /// Trim surrounding whitespace and trailing slashes.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::InvalidHost`] when nothing is left.
    pub fn parse(raw: &str) -> Result<Self, RoverError> {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(RoverError::InvalidHost);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which delivery mechanism a bridge uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One HTTP GET per command.
    #[default]
    Request,
    /// One persistent WebSocket, one text frame per command.
    Stream,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Request => f.write_str("request"),
            TransportKind::Stream => f.write_str("stream"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = RoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "request" | "http" => Ok(TransportKind::Request),
            "stream" | "ws" | "websocket" => Ok(TransportKind::Stream),
            other => Err(RoverError::Configuration(format!(
                "unknown transport '{other}' (expected 'request' or 'stream')"
            ))),
        }
    }
}

/// The bridge's current belief about device reachability.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The last attempt failed; carries the diagnostic text.
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Error(reason) => write!(f, "error ({reason})"),
        }
    }
}

/// Point-in-time snapshot of everything the operator surface displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub connection: ConnectionState,
    pub status_message: String,
    pub forward_backward: AxisValue,
    pub left_right: AxisValue,
    /// Free-text host as last set by the caller (may be blank).
    pub host: String,
    pub transport: TransportKind,
}

/// Envelope for everything routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"rover-transport::stream"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// The transport established its connection.
    Opened,
    /// The transport's connection ended.
    Closed,
    /// The transport hit an error outside of a caller-initiated operation.
    TransportError(String),
    /// Raw text the device sent back; diagnostic only.
    DeviceMessage(String),
    /// The bridge state or status message changed.
    Status(BridgeStatus),
}

/// Every failure the bridge and its transports can report.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoverError {
    /// The host address is empty or whitespace-only.  Raised before any I/O.
    #[error("invalid host address")]
    InvalidHost,

    /// A stream send was attempted without an open, ready connection.
    #[error("transport unavailable: no open connection")]
    TransportUnavailable,

    /// Request or connection failure, with the underlying diagnostic.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The device answered with a non-success HTTP status.
    #[error("device answered HTTP {status}: {body}")]
    ProtocolError { status: u16, body: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("event bus error: {0}")]
    Channel(String),
}
