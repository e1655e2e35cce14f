//! Tests for the client lifecycle, handler registry and request/reply flow

mod common;

use common::{CapturingLogger, FakeTransport};
use ditto_rs::client::{TOPIC_EVENTS, TOPIC_REQUESTS};
use ditto_rs::config::DEFAULT_DISCONNECT_TIMEOUT;
use ditto_rs::things::Command;
use ditto_rs::{headers, Client, Configuration, Envelope, Error, Handler, NamespacedId, Topic};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

const MODIFY_REQUEST: &str = r#"{
    "topic": "ns/thing1/things/twin/commands/modify",
    "headers": {"correlation-id": "abc"},
    "path": "/features/temp/properties/value",
    "value": 21.5
}"#;

fn external_client(config: Configuration) -> (Client, Arc<FakeTransport>) {
    let transport = FakeTransport::new();
    let client = Client::from_transport(config, transport.clone()).unwrap();
    (client, transport)
}

fn counting_handler() -> (Handler, Arc<AtomicUsize>, mpsc::Receiver<(String, Envelope)>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let counter = Arc::clone(&calls);
    let handler: Handler = Arc::new(move |request_id: &str, envelope: &Envelope| {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = tx
            .lock()
            .unwrap()
            .send((request_id.to_string(), envelope.clone()));
    });
    (handler, calls, rx)
}

#[test]
fn test_new_rejects_bad_broker() {
    let err = Client::new(Configuration::new("localhost")).unwrap_err();
    assert!(matches!(err, Error::InvalidBroker { .. }));

    let err = Client::new(Configuration::new("ssl://localhost:8883")).unwrap_err();
    assert!(matches!(err, Error::InvalidBroker { .. }));
}

#[test]
fn test_new_does_not_connect() {
    let client = Client::new(Configuration::new("tcp://localhost:1883")).unwrap();
    assert!(!client.is_external());
    assert!(!client.is_connected());
    assert_eq!(client.handler_count(), 0);
}

#[test]
fn test_external_connect_subscribes_to_requests() {
    let (client, transport) = external_client(Configuration::default());
    assert!(client.is_external());
    client.connect().unwrap();
    assert_eq!(transport.subscribed_patterns(), vec![TOPIC_REQUESTS.to_string()]);
    assert_eq!(transport.connect_count(), 0);
}

#[test]
fn test_request_reaches_handler() {
    let (client, transport) = external_client(Configuration::default());
    let (handler, _, rx) = counting_handler();
    client.subscribe(&[handler]);
    client.connect().unwrap();

    transport.deliver("command///req/42/modify", MODIFY_REQUEST.as_bytes());

    let (request_id, envelope) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(request_id, "42");
    assert_eq!(
        envelope.topic,
        Topic::parse("ns/thing1/things/twin/commands/modify").unwrap()
    );
    assert_eq!(envelope.path, "/features/temp/properties/value");
    assert_eq!(envelope.value, Some(json!(21.5)));
    assert_eq!(envelope.headers.lookup_correlation_id(), Some("abc"));
}

#[test]
fn test_duplicate_subscribe_invokes_once() {
    let (client, transport) = external_client(Configuration::default());
    let (handler, calls, rx) = counting_handler();
    client.subscribe(&[handler.clone(), handler.clone()]);
    client.subscribe(&[handler]);
    assert_eq!(client.handler_count(), 1);
    client.connect().unwrap();

    transport.deliver("command///req/1/modify", MODIFY_REQUEST.as_bytes());

    rx.recv_timeout(WAIT).unwrap();
    assert!(rx.recv_timeout(QUIET).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsubscribe() {
    let (client, _) = external_client(Configuration::default());
    let (first, _, _rx1) = counting_handler();
    let (second, _, _rx2) = counting_handler();
    let (third, _, _rx3) = counting_handler();
    client.subscribe(&[first.clone(), second.clone(), third]);
    assert_eq!(client.handler_count(), 3);

    client.unsubscribe(&[first]);
    assert_eq!(client.handler_count(), 2);

    client.unsubscribe(&[second.clone()]);
    client.unsubscribe(&[second]);
    assert_eq!(client.handler_count(), 1);

    client.unsubscribe(&[]);
    assert_eq!(client.handler_count(), 0);
}

#[test]
fn test_malformed_payload_is_logged_and_dropped() {
    let logger = CapturingLogger::new();
    let (client, transport) =
        external_client(Configuration::default().with_logger(logger.clone()));
    let (handler, calls, rx) = counting_handler();
    client.subscribe(&[handler]);
    client.connect().unwrap();

    transport.deliver("command///req/1/modify", br#"{"t"}"#);

    assert!(rx.recv_timeout(QUIET).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(logger.count("error"), 1);
}

#[test]
fn test_message_without_handlers_is_dropped() {
    let logger = CapturingLogger::new();
    let (client, transport) =
        external_client(Configuration::default().with_logger(logger.clone()));
    client.connect().unwrap();

    transport.deliver("command///req/1/modify", MODIFY_REQUEST.as_bytes());

    assert_eq!(logger.count("warn"), 1);
    assert_eq!(logger.count("error"), 0);
}

#[test]
fn test_send_publishes_on_event_topic() {
    let (client, transport) = external_client(Configuration::default());
    let thing_id = NamespacedId::parse("ns:thing1").unwrap();
    let envelope = Command::new(&thing_id)
        .feature("temp")
        .modify(21.5)
        .envelope([headers::with_response_required(false)]);

    client.send(&envelope).unwrap();

    let published = transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, TOPIC_EVENTS);
    let wire: Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(wire["topic"], "ns/thing1/things/twin/commands/modify");
    assert_eq!(wire["path"], "/features/temp");
    assert_eq!(wire["value"], json!(21.5));
    assert_eq!(wire["headers"]["response-required"], json!(false));
}

#[test]
fn test_send_without_acknowledgement_times_out() {
    let config = Configuration {
        acknowledge_timeout: Duration::ZERO,
        ..Configuration::default()
    };
    let (client, transport) = external_client(config);
    transport.never_acknowledge();

    let envelope = Envelope::new().with_topic(Topic::parse("ns/thing1/things/twin/events/modified").unwrap());
    let err = client.send(&envelope).unwrap_err();
    assert!(matches!(err, Error::AcknowledgeTimeout));
    assert!(err.is_timeout());
}

#[test]
fn test_send_rejects_incomplete_topic() {
    let (client, transport) = external_client(Configuration::default());
    let err = client.send(&Envelope::new()).unwrap_err();
    assert!(matches!(err, Error::Json(_)));
    assert!(transport.published().is_empty());
}

#[test]
fn test_reply_uses_request_id_and_status() {
    let (client, transport) = external_client(Configuration::default());
    let envelope = Envelope::new()
        .with_topic(Topic::parse("ns/thing1/things/twin/commands/modify").unwrap())
        .with_path("/features/temp")
        .with_status(204);

    client.reply("42", &envelope).unwrap();

    let published = transport.published();
    assert_eq!(published[0].0, "command///res/42/204");
    let wire: Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(wire["status"], 204);
}

#[test]
fn test_connect_handler_runs_on_every_connect() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let config = Configuration::default().with_connect_handler(move |client: &Client| {
        let _ = tx.lock().unwrap().send(client.is_external());
    });
    let (client, _) = external_client(config);

    client.connect().unwrap();
    assert!(rx.recv_timeout(WAIT).unwrap());
    client.disconnect();
    client.connect().unwrap();
    assert!(rx.recv_timeout(WAIT).unwrap());

    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn test_owned_reconnect_runs_connect_handler_again() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let config = Configuration::new("tcp://localhost:1883")
        .with_connect_handler(move |_: &Client| {
            let _ = tx.lock().unwrap().send(());
        });
    let transport = FakeTransport::new();
    let client = Client::with_owned_transport(config, transport.clone());

    client.connect().unwrap();
    rx.recv_timeout(WAIT).unwrap();
    client.disconnect();
    client.connect().unwrap();
    rx.recv_timeout(WAIT).unwrap();

    assert_eq!(transport.connect_count(), 2);
    assert!(rx.recv_timeout(QUIET).is_err());
}

#[test]
fn test_handlers_registered_on_connect_survive_reconnect() {
    let (handler, calls, rx) = counting_handler();
    let config = Configuration::default().with_connect_handler(move |client: &Client| {
        client.subscribe(&[handler.clone()]);
    });
    let (client, transport) = external_client(config);

    client.connect().unwrap();
    transport.deliver("command///req/1/modify", MODIFY_REQUEST.as_bytes());
    assert_eq!(rx.recv_timeout(WAIT).unwrap().0, "1");

    client.disconnect();
    assert_eq!(client.handler_count(), 0);

    client.connect().unwrap();
    transport.deliver("command///req/2/modify", MODIFY_REQUEST.as_bytes());
    assert_eq!(rx.recv_timeout(WAIT).unwrap().0, "2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.handler_count(), 1);
}

#[test]
fn test_dispatch_isolates_panicking_and_slow_handlers() {
    let (client, transport) = external_client(Configuration::default());
    client.connect().unwrap();

    let panicking: Handler = Arc::new(|_: &str, _: &Envelope| panic!("handler failure"));
    let (seen_tx, seen_rx) = mpsc::channel();
    let seen_tx = Mutex::new(seen_tx);
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let blocking: Handler = Arc::new(move |request_id: &str, _: &Envelope| {
        let _ = seen_tx.lock().unwrap().send(request_id.to_string());
        let _ = release_rx.lock().unwrap().recv_timeout(WAIT);
    });
    client.subscribe(&[panicking, blocking]);

    let start = Instant::now();
    transport.deliver("command///req/1/modify", MODIFY_REQUEST.as_bytes());
    transport.deliver("command///req/2/modify", MODIFY_REQUEST.as_bytes());
    assert!(start.elapsed() < Duration::from_secs(1));

    let mut seen = vec![
        seen_rx.recv_timeout(WAIT).unwrap(),
        seen_rx.recv_timeout(WAIT).unwrap(),
    ];
    seen.sort();
    assert_eq!(seen, ["1", "2"]);
    assert_eq!(client.handler_count(), 2);
    drop(release_tx);
}

#[test]
fn test_handler_registered_on_connect_sees_first_message() {
    let (handler, calls, rx) = counting_handler();
    let config = Configuration::default().with_connect_handler(move |client: &Client| {
        std::thread::sleep(Duration::from_millis(100));
        client.subscribe(&[handler.clone()]);
    });
    let (client, transport) = external_client(config);
    client.connect().unwrap();

    transport.deliver("command///req/7/modify", MODIFY_REQUEST.as_bytes());

    let (request_id, _) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(request_id, "7");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.handler_count(), 1);
}

#[test]
fn test_external_disconnect_notifies_connection_lost() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let config = Configuration::default().with_connection_lost_handler(move |_: &Client, err: &Error| {
        let _ = tx.lock().unwrap().send(matches!(err, Error::Disconnected));
    });
    let (client, transport) = external_client(config);
    let (handler, _, _rx) = counting_handler();
    client.subscribe(&[handler]);
    client.connect().unwrap();

    client.disconnect();

    assert!(rx.recv_timeout(WAIT).unwrap());
    assert_eq!(client.handler_count(), 0);
    assert_eq!(transport.unsubscribed(), vec![TOPIC_REQUESTS.to_string()]);
    assert!(transport.disconnects().is_empty());
}

#[test]
fn test_external_disconnect_after_transport_loss() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let config = Configuration::default().with_connection_lost_handler(move |_: &Client, err: &Error| {
        let _ = tx.lock().unwrap().send(matches!(err, Error::Transport(_)));
    });
    let (client, transport) = external_client(config);
    client.connect().unwrap();
    transport.fail_unsubscribe_not_connected();

    client.disconnect();

    assert!(rx.recv_timeout(WAIT).unwrap());
}

#[test]
fn test_owned_transport_lifecycle() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let config = Configuration::new("tcp://localhost:1883").with_connect_handler(move |_: &Client| {
        let _ = tx.lock().unwrap().send(());
    });
    let transport = FakeTransport::new();
    let client = Client::with_owned_transport(config, transport.clone());
    assert!(!client.is_external());

    client.connect().unwrap();
    assert_eq!(transport.connect_count(), 1);
    assert!(client.is_connected());
    assert_eq!(transport.subscribed_patterns(), vec![TOPIC_REQUESTS.to_string()]);
    rx.recv_timeout(WAIT).unwrap();

    client.disconnect();
    assert_eq!(transport.disconnects(), vec![DEFAULT_DISCONNECT_TIMEOUT]);
    assert!(!client.is_connected());
}

#[test]
fn test_owned_connect_timeout() {
    let config = Configuration {
        connect_timeout: Duration::from_millis(50),
        ..Configuration::new("tcp://localhost:1883")
    };
    let transport = FakeTransport::new();
    transport.never_connect();
    let client = Client::with_owned_transport(config, transport.clone());

    let err = client.connect().unwrap_err();
    assert!(matches!(err, Error::ConnectTimeout));
    assert_eq!(transport.disconnects(), vec![Duration::ZERO]);
}
