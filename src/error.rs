//! Error types for the Ditto Rust API.

use thiserror::Error;

/// Result type alias for Ditto operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur when using the Ditto API.
#[derive(Error, Debug)]
pub enum Error {
    /// A namespaced ID did not match `namespace:name`.
    #[error("invalid NamespacedID: {0}")]
    InvalidNamespacedId(String),

    /// A definition ID did not match `namespace:name:version`.
    #[error("invalid DefinitionID: {0}")]
    InvalidDefinitionId(String),

    /// A topic could not be parsed or is missing mandatory segments.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// A timeout header value is malformed or outside `[0, 60s]`.
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    /// The broker address could not be understood.
    #[error("invalid broker address '{broker}': {details}")]
    InvalidBroker {
        /// The offending broker address
        broker: String,
        /// Additional details about the failure
        details: String,
    },

    /// The configuration conflicts with an externally supplied transport.
    #[error("configuration not allowed with an external transport: {0}")]
    ExternalTransport(ConfigConflict),

    /// The transport did not report the connection outcome in time.
    #[error("timed out waiting for the connection to be established")]
    ConnectTimeout,

    /// The transport did not acknowledge a publish in time.
    #[error("timed out waiting for the publish acknowledgement")]
    AcknowledgeTimeout,

    /// The transport did not acknowledge a subscription in time.
    #[error("timed out waiting for the subscribe acknowledgement")]
    SubscribeTimeout,

    /// The transport did not acknowledge an unsubscription in time.
    #[error("timed out waiting for the unsubscribe acknowledgement")]
    UnsubscribeTimeout,

    /// The client was disconnected on request.
    #[error("client disconnected")]
    Disconnected,

    /// The transport reported an error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for the bounded-wait sentinels (no answer within the bound),
    /// as opposed to an explicit rejection by the transport.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::ConnectTimeout
                | Error::AcknowledgeTimeout
                | Error::SubscribeTimeout
                | Error::UnsubscribeTimeout
        )
    }
}

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The operation requires a live connection.
    #[error("transport is not connected")]
    NotConnected,

    /// The broker refused the connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The network connection failed or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// The broker rejected a subscription.
    #[error("subscription rejected for '{0}'")]
    SubscriptionRejected(String),

    /// The request could not be handed to the transport.
    #[error("request failed: {0}")]
    Request(String),
}

/// A configuration field that must be left at its default when the client is
/// bound to an externally supplied transport.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigConflict {
    /// A broker address was configured.
    #[error("broker is managed by the external transport")]
    Broker,
    /// Credentials were configured.
    #[error("credentials are managed by the external transport")]
    Credentials,
    /// The disconnect timeout differs from the default.
    #[error("disconnect timeout is managed by the external transport")]
    DisconnectTimeout,
    /// The keep-alive interval differs from the default.
    #[error("keep alive is managed by the external transport")]
    KeepAlive,
    /// The connect timeout differs from the default.
    #[error("connect timeout is managed by the external transport")]
    ConnectTimeout,
    /// A TLS configuration was provided.
    #[error("TLS configuration is managed by the external transport")]
    Tls,
}
