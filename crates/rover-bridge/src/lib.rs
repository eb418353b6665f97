//! `rover-bridge` – turns operator input into device commands.
//!
//! # Modules
//!
//! - [`connection`] – [`ConnectionStateMachine`][connection::ConnectionStateMachine]:
//!   the Disconnected / Connecting / Connected / Error rules.
//! - [`bridge`] – [`MotionBridge`][bridge::MotionBridge]: quantises axis
//!   input, encodes it and hands the command to the configured transport,
//!   keeping a status snapshot that subscribers receive on every change.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional OTLP span export.

pub mod bridge;
pub mod connection;
pub mod telemetry;

pub use bridge::{BridgeConfig, MotionBridge};
pub use connection::ConnectionStateMachine;
