//! The publish/subscribe transport the client is bound to.
//!
//! [`MqttTransport`](crate::mqtt::MqttTransport) is the bundled
//! implementation. Any other transport can be plugged in by implementing
//! [`Transport`]; every asynchronous operation reports its outcome through a
//! [`Token`].

use crate::config::{Credentials, TlsConfig};
use crate::error::TransportError;
use crate::logger::Logger;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Delivery guarantee requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    /// At most once
    AtMostOnce,
    /// At least once
    AtLeastOnce,
    /// Exactly once
    ExactlyOnce,
}

/// Callback for messages received on a subscription: `(topic, payload)`.
pub type MessageCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Callback invoked every time the transport (re)connects.
pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback invoked when an established connection drops.
pub type ConnectionLostCallback = Arc<dyn Fn(TransportError) + Send + Sync>;

/// Options used by the client to open an owned transport connection.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Broker address, e.g. `tcp://localhost:1883`.
    pub broker: String,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Time allowed for the connection handshake.
    pub connect_timeout: Duration,
    /// Optional username/password.
    pub credentials: Option<Credentials>,
    /// Optional TLS settings.
    pub tls: Option<TlsConfig>,
    /// Reconnect automatically after a connection loss.
    pub auto_reconnect: bool,
    /// Called after every successful (re)connect.
    pub on_connect: Option<OnConnectCallback>,
    /// Called when an established connection drops.
    pub on_connection_lost: Option<ConnectionLostCallback>,
    /// Sink for transport diagnostics.
    pub logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("broker", &self.broker)
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .field("credentials", &self.credentials.is_some())
            .field("tls", &self.tls.is_some())
            .field("auto_reconnect", &self.auto_reconnect)
            .finish()
    }
}

/// The operations the client needs from a transport.
///
/// Implementations must be safe for concurrent use: the client publishes,
/// subscribes and disconnects from several threads without extra locking.
pub trait Transport: Send + Sync {
    /// Opens the connection. Only used when the client owns the transport.
    fn connect(&self, options: &ConnectOptions) -> Token;

    /// Closes the connection, allowing up to `grace` for in-flight work.
    fn disconnect(&self, grace: Duration);

    /// Publishes `payload` on `topic`.
    fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Token;

    /// Subscribes to `pattern`, delivering matching messages to `callback`.
    fn subscribe(&self, pattern: &str, qos: QoS, callback: MessageCallback) -> Token;

    /// Removes the subscription for `pattern`.
    fn unsubscribe(&self, pattern: &str) -> Token;

    /// Returns true while the connection is up.
    fn is_connected(&self) -> bool;
}

#[derive(Default)]
struct TokenState {
    outcome: Mutex<Option<Result<(), TransportError>>>,
    done: Condvar,
}

/// Completion handle for an asynchronous transport operation.
///
/// Clones share the same outcome: the transport keeps one clone to
/// [`complete`](Token::complete) it, the caller waits on another.
#[derive(Clone, Default)]
pub struct Token {
    state: Arc<TokenState>,
}

impl Token {
    /// Creates a pending token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is already complete.
    pub fn completed(outcome: Result<(), TransportError>) -> Self {
        let token = Self::new();
        token.complete(outcome);
        token
    }

    /// Records the outcome and wakes all waiters. Later calls are ignored.
    pub fn complete(&self, outcome: Result<(), TransportError>) {
        let mut slot = self
            .state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(outcome);
            self.state.done.notify_all();
        }
    }

    /// Returns true once the operation has completed.
    pub fn is_complete(&self) -> bool {
        self.state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Blocks until the operation completes.
    pub fn wait(&self) {
        let mut slot = self
            .state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while slot.is_none() {
            slot = self
                .state
                .done
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks for at most `timeout`; returns true if the operation completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self
            .state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while slot.is_none() {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                return false;
            }
            slot = self
                .state
                .done
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Returns the error of a completed operation, `None` on success or while
    /// pending.
    pub fn error(&self) -> Option<TransportError> {
        match &*self
            .state
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_timeout_zero_on_pending() {
        let token = Token::new();
        assert!(!token.wait_timeout(Duration::ZERO));
        assert_eq!(token.error(), None);
    }

    #[test]
    fn test_completed_token() {
        let token = Token::completed(Err(TransportError::NotConnected));
        assert!(token.wait_timeout(Duration::ZERO));
        assert_eq!(token.error(), Some(TransportError::NotConnected));
    }

    #[test]
    fn test_complete_from_other_thread() {
        let token = Token::new();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.complete(Ok(()));
        });
        assert!(token.wait_timeout(Duration::from_secs(5)));
        assert_eq!(token.error(), None);
        handle.join().unwrap();
    }

    #[test]
    fn test_first_outcome_wins() {
        let token = Token::new();
        token.complete(Ok(()));
        token.complete(Err(TransportError::NotConnected));
        assert_eq!(token.error(), None);
    }
}
