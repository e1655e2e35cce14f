//! MQTT transport built on `rumqttc`'s blocking client.
//!
//! One thread drives the `rumqttc` event loop and completes [`Token`]s from
//! broker acknowledgements; a second thread delivers inbound publishes to
//! subscription callbacks so a slow callback never stalls acknowledgements.

use crate::config::TlsConfig;
use crate::error::{Error, Result, TransportError};
use crate::logger::Logger;
use crate::transport::{ConnectOptions, MessageCallback, QoS, Token, Transport};
use rumqttc::{
    ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, SubscribeReasonCode,
    TlsConfiguration,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use url::Url;

/// Capacity of the request channel between callers and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Pause between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Shortest keep-alive `rumqttc` accepts.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Splits a broker address such as `tcp://localhost:1883` into host, port and
/// whether TLS is required.
///
/// Accepted schemes: `tcp`, `mqtt` (plain, default port 1883) and `ssl`,
/// `tls`, `mqtts` (TLS, default port 8883). TLS schemes require a
/// [`TlsConfig`] (`has_tls`).
pub fn broker_address(broker: &str, has_tls: bool) -> Result<(String, u16, bool)> {
    let invalid = |details: String| Error::InvalidBroker {
        broker: broker.to_string(),
        details,
    };

    let url = Url::parse(broker).map_err(|e| invalid(e.to_string()))?;
    let secure = match url.scheme() {
        "tcp" | "mqtt" => false,
        "ssl" | "tls" | "mqtts" => true,
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    };
    if secure && !has_tls {
        return Err(invalid("TLS scheme requires a TLS configuration".to_string()));
    }
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| invalid("missing host".to_string()))?;
    let port = url.port().unwrap_or(if secure { 8883 } else { 1883 });
    Ok((host.to_string(), port, secure))
}

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn to_tls_configuration(tls: &TlsConfig) -> TlsConfiguration {
    TlsConfiguration::Simple {
        ca: tls.ca.clone(),
        alpn: tls.alpn.clone(),
        client_auth: tls.client_auth.clone(),
    }
}

/// A request handed to `rumqttc`, waiting for its packet id and then its
/// acknowledgement.
struct Request {
    token: Token,
    qos: QoS,
    label: String,
    generation: u64,
}

/// Requests in the order `rumqttc` will send them.
///
/// Requests accepted before a connection error stay queued after their
/// tokens failed: `rumqttc` still sends them once it reconnects, and their
/// outgoing events must not be matched to newer requests.
#[derive(Default)]
struct Requests {
    queued: VecDeque<Request>,
    inflight: HashMap<u16, Request>,
    generation: u64,
}

impl Requests {
    fn push(&mut self, mut request: Request) {
        request.generation = self.generation;
        self.queued.push_back(request);
    }

    /// The event loop sent a request with `pkid`: either a retransmission of
    /// a request from before a reconnect, or the oldest queued one.
    fn sent(&mut self, pkid: u16) {
        if self
            .inflight
            .get(&pkid)
            .is_some_and(|request| request.generation < self.generation)
        {
            return;
        }
        let Some(request) = self.queued.pop_front() else {
            return;
        };
        if request.qos == QoS::AtMostOnce {
            request.token.complete(Ok(()));
        } else {
            self.inflight.insert(pkid, request);
        }
    }

    fn acked<F>(&mut self, pkid: u16, outcome: F)
    where
        F: FnOnce(&Request) -> std::result::Result<(), TransportError>,
    {
        if let Some(request) = self.inflight.remove(&pkid) {
            let outcome = outcome(&request);
            request.token.complete(outcome);
        }
    }

    /// Fails every outstanding token but keeps the requests for matching
    /// what `rumqttc` sends after reconnecting.
    fn expire(&mut self, err: &TransportError) {
        for request in self.queued.iter().chain(self.inflight.values()) {
            request.token.complete(Err(err.clone()));
        }
        self.generation += 1;
    }

    fn fail_all(&mut self, err: &TransportError) {
        self.expire(err);
        self.queued.clear();
        self.inflight.clear();
    }

    fn is_empty(&self) -> bool {
        self.queued.is_empty() && self.inflight.is_empty()
    }
}

#[derive(Default)]
struct Pending {
    publishes: Requests,
    subscribes: Requests,
    unsubscribes: Requests,
}

impl Pending {
    fn expire(&mut self, err: &TransportError) {
        self.publishes.expire(err);
        self.subscribes.expire(err);
        self.unsubscribes.expire(err);
    }

    fn fail_all(&mut self, err: &TransportError) {
        self.publishes.fail_all(err);
        self.subscribes.fail_all(err);
        self.unsubscribes.fail_all(err);
    }
}

#[derive(Default)]
struct Shared {
    client: Mutex<Option<rumqttc::Client>>,
    pending: Mutex<Pending>,
    subscriptions: RwLock<Vec<(String, MessageCallback)>>,
    connected: AtomicBool,
    stopping: AtomicBool,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self) -> Option<rumqttc::Client> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// An MQTT [`Transport`] owned by the client.
///
/// Created unconnected; [`Transport::connect`] starts the event loop.
#[derive(Default)]
pub struct MqttTransport {
    shared: Arc<Shared>,
}

impl MqttTransport {
    /// Creates an unconnected transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn mqtt_options(options: &ConnectOptions) -> Result<MqttOptions> {
        let (host, port, secure) = broker_address(&options.broker, options.tls.is_some())?;

        let mut mqtt_options = MqttOptions::new(options.client_id.clone(), host, port);
        let keep_alive = if options.keep_alive.is_zero() {
            Duration::ZERO
        } else {
            options.keep_alive.max(MIN_KEEP_ALIVE)
        };
        mqtt_options
            .set_keep_alive(keep_alive)
            .set_clean_session(true);
        if let Some(credentials) = &options.credentials {
            mqtt_options.set_credentials(&credentials.username, &credentials.password);
        }
        if let (true, Some(tls)) = (secure, &options.tls) {
            mqtt_options.set_transport(rumqttc::Transport::tls_with_config(
                to_tls_configuration(tls),
            ));
        }
        Ok(mqtt_options)
    }

    /// Hands a request to `rumqttc` and queues it until its packet id is
    /// known. The pending lock is held across the hand-off so packet ids are
    /// matched in order.
    fn request<F>(
        &self,
        select: fn(&mut Pending) -> &mut Requests,
        request: Request,
        send: F,
    ) -> Token
    where
        F: FnOnce(&rumqttc::Client) -> std::result::Result<(), rumqttc::ClientError>,
    {
        let token = request.token.clone();
        let Some(client) = self.shared.client() else {
            token.complete(Err(TransportError::NotConnected));
            return token;
        };
        if !self.shared.connected.load(Ordering::SeqCst) {
            token.complete(Err(TransportError::NotConnected));
            return token;
        }

        let mut pending = self.shared.pending();
        match send(&client) {
            Ok(()) => select(&mut pending).push(request),
            Err(err) => token.complete(Err(TransportError::Request(err.to_string()))),
        }
        token
    }
}

impl Transport for MqttTransport {
    fn connect(&self, options: &ConnectOptions) -> Token {
        let token = Token::new();
        let mut slot = self
            .shared
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            token.complete(Err(TransportError::Request("already connected".to_string())));
            return token;
        }

        let mqtt_options = match Self::mqtt_options(options) {
            Ok(mqtt_options) => mqtt_options,
            Err(err) => {
                token.complete(Err(TransportError::Request(err.to_string())));
                return token;
            }
        };

        let (client, connection) = rumqttc::Client::new(mqtt_options, REQUEST_CAPACITY);
        let (delivery_tx, delivery_rx) = mpsc::channel::<(String, Vec<u8>)>();
        self.shared.stopping.store(false, Ordering::SeqCst);

        let delivery_shared = Arc::clone(&self.shared);
        let delivery = thread::Builder::new()
            .name("ditto-mqtt-delivery".to_string())
            .spawn(move || deliver(delivery_shared, delivery_rx));
        if let Err(err) = delivery {
            token.complete(Err(TransportError::Request(err.to_string())));
            return token;
        }

        let loop_shared = Arc::clone(&self.shared);
        let loop_options = options.clone();
        let loop_token = token.clone();
        let event_loop = thread::Builder::new()
            .name("ditto-mqtt-eventloop".to_string())
            .spawn(move || {
                run_event_loop(loop_shared, connection, loop_options, loop_token, delivery_tx)
            });
        if let Err(err) = event_loop {
            token.complete(Err(TransportError::Request(err.to_string())));
            return token;
        }

        *slot = Some(client);
        token
    }

    fn disconnect(&self, grace: Duration) {
        let Some(client) = self
            .shared
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        let deadline = Instant::now().checked_add(grace).unwrap_or_else(Instant::now);
        while Instant::now() < deadline && !self.shared.pending().publishes.is_empty() {
            thread::sleep(Duration::from_millis(10));
        }

        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        // The event loop exits on the outgoing disconnect or the resulting error.
        let _ = client.try_disconnect();
        self.shared.pending().fail_all(&TransportError::NotConnected);
    }

    fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Token {
        let request = Request {
            token: Token::new(),
            qos,
            label: topic.to_string(),
            generation: 0,
        };
        self.request(|p| &mut p.publishes, request, |client| {
            client.try_publish(topic, to_mqtt_qos(qos), retain, payload)
        })
    }

    fn subscribe(&self, pattern: &str, qos: QoS, callback: MessageCallback) -> Token {
        {
            let mut subscriptions = self
                .shared
                .subscriptions
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            subscriptions.retain(|(existing, _)| existing != pattern);
            subscriptions.push((pattern.to_string(), callback));
        }
        let request = Request {
            token: Token::new(),
            qos,
            label: pattern.to_string(),
            generation: 0,
        };
        self.request(|p| &mut p.subscribes, request, |client| {
            client.try_subscribe(pattern, to_mqtt_qos(qos))
        })
    }

    fn unsubscribe(&self, pattern: &str) -> Token {
        self.shared
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| existing != pattern);
        let request = Request {
            token: Token::new(),
            qos: QoS::AtLeastOnce,
            label: pattern.to_string(),
            generation: 0,
        };
        self.request(|p| &mut p.unsubscribes, request, |client| {
            client.try_unsubscribe(pattern)
        })
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

fn run_event_loop(
    shared: Arc<Shared>,
    mut connection: rumqttc::Connection,
    options: ConnectOptions,
    connect_token: Token,
    delivery: mpsc::Sender<(String, Vec<u8>)>,
) {
    let logger = Arc::clone(&options.logger);
    let mut ever_connected = false;

    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    let err = TransportError::ConnectionRefused(format!("{:?}", ack.code));
                    logger.error(&format!("broker refused connection: {}", err));
                    if !ever_connected {
                        connect_token.complete(Err(err));
                        break;
                    }
                    continue;
                }
                shared.connected.store(true, Ordering::SeqCst);
                ever_connected = true;
                connect_token.complete(Ok(()));
                logger.info(&format!("connected to {}", options.broker));
                if let Some(on_connect) = options.on_connect.clone() {
                    spawn_callback(&logger, "on-connect", move || on_connect());
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let _ = delivery.send((publish.topic, publish.payload.to_vec()));
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                shared.pending().publishes.acked(ack.pkid, |_| Ok(()));
            }
            Ok(Event::Incoming(Packet::PubComp(comp))) => {
                shared.pending().publishes.acked(comp.pkid, |_| Ok(()));
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let rejected = ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                shared.pending().subscribes.acked(ack.pkid, |request| {
                    if rejected {
                        Err(TransportError::SubscriptionRejected(request.label.clone()))
                    } else {
                        Ok(())
                    }
                });
            }
            Ok(Event::Incoming(Packet::UnsubAck(ack))) => {
                shared.pending().unsubscribes.acked(ack.pkid, |_| Ok(()));
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => shared.pending().publishes.sent(pkid),
            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => shared.pending().subscribes.sent(pkid),
            Ok(Event::Outgoing(Outgoing::Unsubscribe(pkid))) => {
                shared.pending().unsubscribes.sent(pkid)
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                if shared.stopping.load(Ordering::SeqCst) {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => {
                let was_connected = shared.connected.swap(false, Ordering::SeqCst);
                shared.pending().expire(&TransportError::NotConnected);
                if shared.stopping.load(Ordering::SeqCst) {
                    break;
                }

                let err = TransportError::Connection(err.to_string());
                if !ever_connected {
                    logger.error(&format!("failed to connect to {}: {}", options.broker, err));
                    connect_token.complete(Err(err));
                    break;
                }
                if was_connected {
                    logger.warn(&format!("connection to {} lost: {}", options.broker, err));
                    if let Some(on_connection_lost) = options.on_connection_lost.clone() {
                        on_connection_lost(err);
                    }
                }
                if !options.auto_reconnect {
                    break;
                }
                logger.debug(&format!("reconnecting in {:?}", RECONNECT_DELAY));
                thread::sleep(RECONNECT_DELAY);
                if shared.stopping.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    shared.pending().fail_all(&TransportError::NotConnected);
    logger.debug("MQTT event loop stopped");
}

fn deliver(shared: Arc<Shared>, inbound: mpsc::Receiver<(String, Vec<u8>)>) {
    for (topic, payload) in inbound {
        let callbacks: Vec<MessageCallback> = shared
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(pattern, _)| rumqttc::mqttbytes::matches(&topic, pattern))
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(&topic, &payload);
        }
    }
}

fn spawn_callback<F>(logger: &Arc<dyn Logger>, name: &str, callback: F)
where
    F: FnOnce() + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("ditto-mqtt-{}", name))
        .spawn(callback);
    if let Err(err) = spawned {
        logger.error(&format!("failed to start {} callback: {}", name, err));
    }
}
