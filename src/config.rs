//! Client configuration.

use crate::client::Client;
use crate::error::{ConfigConflict, Error, Result};
use crate::logger::{LogFacade, Logger};
use std::sync::Arc;
use std::time::Duration;

/// Default keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default grace period for in-flight work when disconnecting.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_millis(250);
/// Default time to wait for a publish acknowledgement.
pub const DEFAULT_ACKNOWLEDGE_TIMEOUT: Duration = Duration::from_secs(15);
/// Default time to wait for a subscribe acknowledgement.
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(15);
/// Default time to wait for an unsubscribe acknowledgement.
pub const DEFAULT_UNSUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback invoked once after the client is connected and subscribed.
pub type ConnectHandler = Arc<dyn Fn(&Client) + Send + Sync>;

/// Callback invoked when the connection is lost or the client disconnects.
pub type ConnectionLostHandler = Arc<dyn Fn(&Client, &Error) + Send + Sync>;

/// Username/password credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// TLS settings for the broker connection (PEM encoded).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// CA certificate(s) used to verify the broker.
    pub ca: Vec<u8>,
    /// Client certificate and private key for mutual TLS.
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
    /// ALPN protocols to offer.
    pub alpn: Option<Vec<Vec<u8>>>,
}

impl TlsConfig {
    /// Creates a TLS configuration that verifies the broker against `ca`.
    pub fn with_ca(ca: impl Into<Vec<u8>>) -> Self {
        Self {
            ca: ca.into(),
            ..Default::default()
        }
    }
}

/// Configuration for a [`Client`].
///
/// # Example
///
/// ```
/// use ditto_rs::{Configuration, Credentials};
/// use std::time::Duration;
///
/// let config = Configuration {
///     credentials: Some(Credentials::new("ditto", "ditto")),
///     acknowledge_timeout: Duration::from_secs(5),
///     ..Configuration::new("tcp://localhost:1883")
/// };
/// assert_eq!(config.broker, "tcp://localhost:1883");
/// ```
#[derive(Clone)]
pub struct Configuration {
    /// Broker address (e.g., "tcp://localhost:1883"). Must be empty for
    /// external transports.
    pub broker: String,
    /// Optional username/password.
    pub credentials: Option<Credentials>,
    /// Grace period for in-flight work when disconnecting.
    pub disconnect_timeout: Duration,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Time allowed to establish the connection.
    pub connect_timeout: Duration,
    /// Time to wait for a publish acknowledgement.
    pub acknowledge_timeout: Duration,
    /// Time to wait for a subscribe acknowledgement.
    pub subscribe_timeout: Duration,
    /// Time to wait for an unsubscribe acknowledgement.
    pub unsubscribe_timeout: Duration,
    /// Optional TLS settings.
    pub tls: Option<TlsConfig>,
    /// Invoked once after connecting.
    pub connect_handler: Option<ConnectHandler>,
    /// Invoked when the connection is lost.
    pub connection_lost_handler: Option<ConnectionLostHandler>,
    /// Log sink.
    pub logger: Arc<dyn Logger>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            broker: String::new(),
            credentials: None,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            keep_alive: DEFAULT_KEEP_ALIVE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            acknowledge_timeout: DEFAULT_ACKNOWLEDGE_TIMEOUT,
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
            unsubscribe_timeout: DEFAULT_UNSUBSCRIBE_TIMEOUT,
            tls: None,
            connect_handler: None,
            connection_lost_handler: None,
            logger: Arc::new(LogFacade),
        }
    }
}

impl Configuration {
    /// Creates a configuration for `broker` with default timeouts.
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            ..Default::default()
        }
    }

    /// Sets the connect handler.
    #[must_use]
    pub fn with_connect_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Client) + Send + Sync + 'static,
    {
        self.connect_handler = Some(Arc::new(handler));
        self
    }

    /// Sets the connection-lost handler.
    #[must_use]
    pub fn with_connection_lost_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Client, &Error) + Send + Sync + 'static,
    {
        self.connection_lost_handler = Some(Arc::new(handler));
        self
    }

    /// Sets the log sink.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Checks that nothing the external transport owns was configured.
    ///
    /// Fields are checked in a fixed order (broker, credentials, disconnect
    /// timeout, keep alive, connect timeout, TLS); the first conflict wins.
    pub fn validate_for_external_transport(&self) -> Result<()> {
        let conflict = if !self.broker.is_empty() {
            Some(ConfigConflict::Broker)
        } else if self.credentials.is_some() {
            Some(ConfigConflict::Credentials)
        } else if self.disconnect_timeout != DEFAULT_DISCONNECT_TIMEOUT {
            Some(ConfigConflict::DisconnectTimeout)
        } else if self.keep_alive != DEFAULT_KEEP_ALIVE {
            Some(ConfigConflict::KeepAlive)
        } else if self.connect_timeout != DEFAULT_CONNECT_TIMEOUT {
            Some(ConfigConflict::ConnectTimeout)
        } else if self.tls.is_some() {
            Some(ConfigConflict::Tls)
        } else {
            None
        };
        match conflict {
            Some(conflict) => Err(Error::ExternalTransport(conflict)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("broker", &self.broker)
            .field("credentials", &self.credentials.as_ref().map(|c| &c.username))
            .field("disconnect_timeout", &self.disconnect_timeout)
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .field("acknowledge_timeout", &self.acknowledge_timeout)
            .field("subscribe_timeout", &self.subscribe_timeout)
            .field("unsubscribe_timeout", &self.unsubscribe_timeout)
            .field("tls", &self.tls.is_some())
            .field("connect_handler", &self.connect_handler.is_some())
            .field("connection_lost_handler", &self.connection_lost_handler.is_some())
            .finish()
    }
}
