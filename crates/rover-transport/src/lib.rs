//! `rover-transport` – getting commands onto the wire.
//!
//! Knows how to reach the device but not what the commands mean.
//!
//! # Modules
//!
//! - [`bus`] – Topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`transport`] – The [`Transport`] trait shared by both delivery
//!   mechanisms.
//! - [`request`] – One HTTP GET per command.
//! - [`stream`] – One persistent WebSocket, one text frame per command.

pub mod bus;
pub mod request;
pub mod stream;
pub mod transport;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use request::RequestTransport;
pub use stream::{DEFAULT_STREAM_PORT, StreamTransport};
pub use transport::{ConnectOutcome, Delivery, Transport};
