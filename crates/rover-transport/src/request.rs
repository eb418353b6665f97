//! Request-per-command transport.
//!
//! [`RequestTransport`] turns every [`Command`] into a single HTTP GET
//! against the device's web server:
//!
//! | Command | Path |
//! |---|---|
//! | `Forward(n)` | `/forward?value=<n>` |
//! | `Backward(n)` | `/backward?value=<n>` |
//! | `Stop` | `/stop` |
//! | `Right(n)` | `/right?value=<n>` |
//! | `Left(n)` | `/left?value=<n>` |
//! | `Center` | `/center` |
//! | health check | `/ping` |
//!
//! Requests are independent: success of one says nothing about the next, and
//! two requests in flight may complete in either order.

use std::time::Duration;

use async_trait::async_trait;
use rover_types::{Command, HostAddress, RoverError, TransportKind};
use tracing::debug;

use crate::transport::{ConnectOutcome, Delivery, Transport};

/// Path of the device health check.
pub const HEALTH_PATH: &str = "/ping";

/// Build the path-and-query for `command`.
pub fn request_path(command: &Command) -> String {
    match command {
        Command::Stop | Command::Center => format!("/{}", command.direction()),
        _ => format!("/{}?value={}", command.direction(), command.magnitude()),
    }
}

/// Stateless HTTP transport.
#[derive(Debug, Clone, Default)]
pub struct RequestTransport {
    client: reqwest::Client,
}

impl RequestTransport {
    /// Create a transport using the HTTP client's default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, RoverError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoverError::Configuration(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    /// Base URL for `host`; bare addresses get an `http://` scheme.
    pub fn base_url(host: &HostAddress) -> String {
        if host.as_str().contains("://") {
            host.to_string()
        } else {
            format!("http://{host}")
        }
    }

    async fn get(&self, url: String) -> Result<Delivery, RoverError> {
        debug!(url = %url, "sending request");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RoverError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RoverError::NetworkFailure(e.to_string()))?;

        if !status.is_success() {
            return Err(RoverError::ProtocolError {
                status: status.as_u16(),
                body,
            });
        }
        debug!(url = %url, response = %body, "device answered");
        Ok(Delivery {
            target: url,
            echo: Some(body),
        })
    }
}

#[async_trait]
impl Transport for RequestTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Request
    }

    /// There is no session to open; reachability is checked with the health
    /// path instead.
    async fn connect(&self, host: &HostAddress) -> Result<ConnectOutcome, RoverError> {
        self.test_connection(host).await.map(|_| ConnectOutcome::Opened)
    }

    async fn send(&self, host: &HostAddress, command: Command) -> Result<Delivery, RoverError> {
        let url = format!("{}{}", Self::base_url(host), request_path(&command));
        self.get(url).await
    }

    async fn test_connection(&self, host: &HostAddress) -> Result<Delivery, RoverError> {
        let url = format!("{}{}", Self::base_url(host), HEALTH_PATH);
        self.get(url).await
    }

    async fn close(&self) {}

    fn is_open(&self) -> bool {
        false
    }
}
