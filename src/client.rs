//! The connection client: connect, subscribe, dispatch, send and reply.

use crate::config::Configuration;
use crate::envelope::Envelope;
use crate::error::{Error, Result, TransportError};
use crate::mqtt::{broker_address, MqttTransport};
use crate::notify::{spawn_notification, NotifyGate, NOTIFY_GRACE};
use crate::transport::{
    ConnectOptions, ConnectionLostCallback, MessageCallback, OnConnectCallback, QoS, Token, Transport,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock, Weak};
use std::thread;

/// Transport topic pattern carrying inbound requests.
pub const TOPIC_REQUESTS: &str = "command///req/#";

/// Transport topic for outbound events.
pub const TOPIC_EVENTS: &str = "e";

static REQUEST_TOPIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^command///req/([^/]+)/([^/]+)$").expect("request topic pattern is valid")
});

/// Extracts the request id from an inbound transport topic; empty when the
/// topic does not follow the request convention.
///
/// ```
/// use ditto_rs::client::request_id;
///
/// assert_eq!(request_id("command///req/42/modify"), "42");
/// assert_eq!(request_id("e"), "");
/// ```
pub fn request_id(topic: &str) -> &str {
    REQUEST_TOPIC
        .captures(topic)
        .and_then(|captures| captures.get(1))
        .map_or("", |m| m.as_str())
}

/// Transport topic for a reply to `request_id` with `status`.
pub fn reply_topic(request_id: &str, status: i32) -> String {
    format!("command///res/{}/{}", request_id, status)
}

/// Callback receiving inbound envelopes: `(request_id, envelope)`.
///
/// Handlers are identified by their `Arc`: subscribing a clone of the same
/// `Arc` twice registers it once.
pub type Handler = Arc<dyn Fn(&str, &Envelope) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct HandlerId(usize);

impl HandlerId {
    fn of(handler: &Handler) -> Self {
        Self(Arc::as_ptr(handler) as *const () as usize)
    }
}

struct Inner {
    config: Configuration,
    transport: Arc<dyn Transport>,
    external: bool,
    handlers: RwLock<HashMap<HandlerId, Handler>>,
    connect_gate: Arc<NotifyGate>,
}

/// A client bound to a publish/subscribe transport.
///
/// The client either owns its transport ([`Client::new`],
/// [`Client::with_owned_transport`]) and opens/closes the connection itself,
/// or is bound to a transport connected elsewhere
/// ([`Client::from_transport`]), in which case it only subscribes and
/// unsubscribes.
///
/// `Client` is a cheap handle; clones share the same connection and handler
/// registry.
///
/// # Example
///
/// ```no_run
/// use ditto_rs::headers;
/// use ditto_rs::things::Command;
/// use ditto_rs::{Client, Configuration, Envelope, Handler, NamespacedId};
/// use std::sync::Arc;
///
/// let config = Configuration::new("tcp://localhost:1883");
/// let client = Client::new(config)?;
/// let handler: Handler = Arc::new(|request_id: &str, envelope: &Envelope| {
///     println!("{} {:?}", request_id, envelope.topic);
/// });
/// client.subscribe(&[handler]);
/// client.connect()?;
///
/// let thing_id = NamespacedId::parse("org.example:sensor-1").unwrap();
/// let envelope = Command::new(&thing_id)
///     .feature_property("temperature", "value")
///     .modify(21.5)
///     .envelope([headers::with_response_required(false)]);
/// client.send(&envelope)?;
///
/// client.disconnect();
/// # Ok::<(), ditto_rs::Error>(())
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Creates a client owning an MQTT connection to `config.broker`.
    pub fn new(config: Configuration) -> Result<Self> {
        broker_address(&config.broker, config.tls.is_some())?;
        Ok(Self::with_owned_transport(config, Arc::new(MqttTransport::new())))
    }

    /// Creates a client that fully owns `transport`: `connect` opens it and
    /// `disconnect` closes it.
    pub fn with_owned_transport(config: Configuration, transport: Arc<dyn Transport>) -> Self {
        Self::build(config, transport, false)
    }

    /// Creates a client on a transport whose connection is managed elsewhere.
    ///
    /// Broker, credentials, disconnect timeout, keep alive, connect timeout and
    /// TLS belong to the external transport and must be left at their
    /// defaults; the first conflicting field is reported.
    pub fn from_transport(config: Configuration, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate_for_external_transport()?;
        Ok(Self::build(config, transport, true))
    }

    fn build(config: Configuration, transport: Arc<dyn Transport>, external: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                external,
                handlers: RwLock::new(HashMap::new()),
                connect_gate: Arc::new(NotifyGate::new()),
            }),
        }
    }

    fn from_weak(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// The configuration the client was created with.
    pub fn configuration(&self) -> &Configuration {
        &self.inner.config
    }

    /// Returns true if the client is bound to an externally managed transport.
    pub fn is_external(&self) -> bool {
        self.inner.external
    }

    /// Returns true while the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Connects the client.
    ///
    /// With an owned transport this opens the connection and blocks until the
    /// transport reports success or failure (bounded by the connect timeout);
    /// subscribing to requests happens on every (re)connect. With an external
    /// transport only the request subscription is made, bounded by the
    /// subscribe timeout.
    ///
    /// The connect handler runs on its own thread once per successful
    /// subscription, including those made after a reconnect.
    pub fn connect(&self) -> Result<()> {
        if self.inner.external {
            return self.subscribe_and_notify();
        }

        let options = self.connect_options();
        self.inner.config.logger.debug(&format!(
            "connecting to {} as {}",
            options.broker, options.client_id
        ));
        let token = self.inner.transport.connect(&options);
        if !token.wait_timeout(self.inner.config.connect_timeout) {
            self.inner.transport.disconnect(std::time::Duration::ZERO);
            return Err(Error::ConnectTimeout);
        }
        match token.error() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn connect_options(&self) -> ConnectOptions {
        let config = &self.inner.config;

        let on_connect_client = Arc::downgrade(&self.inner);
        let on_connect: OnConnectCallback = Arc::new(move || {
            if let Some(client) = Client::from_weak(&on_connect_client) {
                if let Err(err) = client.subscribe_and_notify() {
                    client
                        .inner
                        .config
                        .logger
                        .error(&format!("failed to subscribe to {}: {}", TOPIC_REQUESTS, err));
                }
            }
        });

        let on_lost_client = Arc::downgrade(&self.inner);
        let on_connection_lost: ConnectionLostCallback = Arc::new(move |err: TransportError| {
            if let Some(client) = Client::from_weak(&on_lost_client) {
                client
                    .inner
                    .config
                    .logger
                    .warn(&format!("connection lost: {}", err));
                client.notify_connection_lost(Error::Transport(err));
            }
        });

        ConnectOptions {
            broker: config.broker.clone(),
            client_id: uuid::Uuid::new_v4().to_string(),
            keep_alive: config.keep_alive,
            connect_timeout: config.connect_timeout,
            credentials: config.credentials.clone(),
            tls: config.tls.clone(),
            auto_reconnect: true,
            on_connect: Some(on_connect),
            on_connection_lost: Some(on_connection_lost),
            logger: Arc::clone(&config.logger),
        }
    }

    fn subscribe_and_notify(&self) -> Result<()> {
        let weak = Arc::downgrade(&self.inner);
        let callback: MessageCallback = Arc::new(move |topic: &str, payload: &[u8]| {
            if let Some(client) = Client::from_weak(&weak) {
                client.dispatch(topic, payload);
            }
        });

        let token = self
            .inner
            .transport
            .subscribe(TOPIC_REQUESTS, QoS::AtLeastOnce, callback);
        if !token.wait_timeout(self.inner.config.subscribe_timeout) {
            return Err(Error::SubscribeTimeout);
        }
        if let Some(err) = token.error() {
            return Err(err.into());
        }
        self.inner
            .config
            .logger
            .debug(&format!("subscribed to {}", TOPIC_REQUESTS));

        self.notify_connected();
        Ok(())
    }

    fn notify_connected(&self) {
        let Some(handler) = self.inner.config.connect_handler.clone() else {
            return;
        };
        let round = self.inner.connect_gate.begin(NOTIFY_GRACE);

        let client = self.clone();
        let gate = Arc::clone(&self.inner.connect_gate);
        spawn_notification(
            "connect",
            NOTIFY_GRACE,
            Arc::clone(&self.inner.config.logger),
            move || handler(&client),
            move || {
                gate.release(round);
            },
        );
    }

    fn notify_connection_lost(&self, reason: Error) {
        let Some(handler) = self.inner.config.connection_lost_handler.clone() else {
            return;
        };
        let client = self.clone();
        spawn_notification(
            "connection-lost",
            NOTIFY_GRACE,
            Arc::clone(&self.inner.config.logger),
            move || handler(&client, &reason),
            || {},
        );
    }

    /// Disconnects the client. Best effort: failures are logged, never
    /// returned.
    ///
    /// The request subscription is removed (bounded by the unsubscribe
    /// timeout) and all handlers are dropped. An owned transport is then
    /// closed; an external transport is left open and the connection-lost
    /// handler is notified instead.
    pub fn disconnect(&self) {
        let logger = &self.inner.config.logger;

        let unsubscribed = self.unsubscribe_requests();
        let already_disconnected = matches!(
            unsubscribed,
            Err(Error::Transport(TransportError::NotConnected))
        );
        match &unsubscribed {
            Ok(()) => logger.debug(&format!("unsubscribed from {}", TOPIC_REQUESTS)),
            Err(err) if already_disconnected => {
                logger.debug(&format!("transport already disconnected: {}", err))
            }
            Err(err) => logger.error(&format!(
                "failed to unsubscribe from {}: {}",
                TOPIC_REQUESTS, err
            )),
        }

        self.unsubscribe(&[]);

        if self.inner.external {
            let reason = match unsubscribed {
                Err(err) if already_disconnected => err,
                _ => Error::Disconnected,
            };
            self.notify_connection_lost(reason);
        } else {
            self.inner
                .transport
                .disconnect(self.inner.config.disconnect_timeout);
            logger.info("disconnected");
        }
    }

    fn unsubscribe_requests(&self) -> Result<()> {
        let token = self.inner.transport.unsubscribe(TOPIC_REQUESTS);
        if !token.wait_timeout(self.inner.config.unsubscribe_timeout) {
            return Err(Error::UnsubscribeTimeout);
        }
        match token.error() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Registers handlers for inbound envelopes. Registering the same `Arc`
    /// again replaces the earlier entry.
    pub fn subscribe(&self, handlers: &[Handler]) {
        let mut registry = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for handler in handlers {
            registry.insert(HandlerId::of(handler), Arc::clone(handler));
        }
    }

    /// Removes the given handlers, or every handler when `handlers` is empty.
    pub fn unsubscribe(&self, handlers: &[Handler]) {
        let mut registry = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if handlers.is_empty() {
            registry.clear();
            return;
        }
        for handler in handlers {
            registry.remove(&HandlerId::of(handler));
        }
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Publishes `envelope` on the event topic and waits for the transport
    /// acknowledgement.
    ///
    /// Returns [`Error::AcknowledgeTimeout`] if no acknowledgement arrives
    /// within the acknowledge timeout, or the transport's error.
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        self.publish(TOPIC_EVENTS, envelope)
    }

    /// Publishes `envelope` as the response to `request_id`, addressed by the
    /// envelope's status.
    pub fn reply(&self, request_id: &str, envelope: &Envelope) -> Result<()> {
        self.publish(&reply_topic(request_id, envelope.status), envelope)
    }

    fn publish(&self, topic: &str, envelope: &Envelope) -> Result<()> {
        let payload = serde_json::to_vec(envelope)?;
        let token: Token = self
            .inner
            .transport
            .publish(topic, QoS::AtLeastOnce, false, payload);
        if !token.wait_timeout(self.inner.config.acknowledge_timeout) {
            return Err(Error::AcknowledgeTimeout);
        }
        match token.error() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Decodes an inbound payload and hands it to every handler, each on its
    /// own thread. Undecodable payloads are logged and dropped.
    fn dispatch(&self, topic: &str, payload: &[u8]) {
        let logger = &self.inner.config.logger;

        let envelope: Envelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                logger.error(&format!("failed to decode message on {}: {}", topic, err));
                return;
            }
        };
        let request_id: Arc<str> = Arc::from(request_id(topic));

        // Handlers registered from the connect handler must see the first message.
        self.inner.connect_gate.wait();

        let registry = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if registry.is_empty() {
            logger.warn(&format!("no handlers registered, dropping message on {}", topic));
            return;
        }

        let envelope = Arc::new(envelope);
        for handler in registry.values() {
            let handler = Arc::clone(handler);
            let envelope = Arc::clone(&envelope);
            let request_id = Arc::clone(&request_id);
            let spawned = thread::Builder::new()
                .name("ditto-handler".to_string())
                .spawn(move || handler(&request_id, &envelope));
            if let Err(err) = spawned {
                logger.error(&format!("failed to start handler: {}", err));
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("external", &self.inner.external)
            .field("handlers", &self.handler_count())
            .finish()
    }
}
