//! Shared test doubles: an in-memory transport and a capturing logger.

#![allow(dead_code)]

use ditto_rs::transport::{ConnectOptions, MessageCallback, QoS, Token, Transport};
use ditto_rs::{Logger, TransportError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A transport that records everything and delivers messages on demand.
pub struct FakeTransport {
    subscriptions: Mutex<Vec<(String, MessageCallback)>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    unsubscribed: Mutex<Vec<String>>,
    disconnects: Mutex<Vec<Duration>>,
    connected: AtomicBool,
    acknowledge: AtomicBool,
    complete_connect: AtomicBool,
    unsubscribe_not_connected: AtomicBool,
    connects: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            unsubscribed: Mutex::new(Vec::new()),
            disconnects: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            acknowledge: AtomicBool::new(true),
            complete_connect: AtomicBool::new(true),
            unsubscribe_not_connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        })
    }

    /// Leaves publish tokens pending forever.
    pub fn never_acknowledge(&self) {
        self.acknowledge.store(false, Ordering::SeqCst);
    }

    /// Leaves connect tokens pending forever.
    pub fn never_connect(&self) {
        self.complete_connect.store(false, Ordering::SeqCst);
    }

    /// Makes unsubscribe report that the connection is already gone.
    pub fn fail_unsubscribe_not_connected(&self) {
        self.unsubscribe_not_connected.store(true, Ordering::SeqCst);
    }

    /// Delivers `payload` to every subscription matching `topic`.
    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        let callbacks: Vec<MessageCallback> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(pattern, _)| matches_pattern(pattern, topic))
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(topic, payload);
        }
    }

    pub fn subscribed_patterns(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|(pattern, _)| pattern.clone())
            .collect()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.unsubscribed.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> Vec<Duration> {
        self.disconnects.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

fn matches_pattern(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('#') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}

impl Transport for FakeTransport {
    fn connect(&self, options: &ConnectOptions) -> Token {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.complete_connect.load(Ordering::SeqCst) {
            return Token::new();
        }
        self.connected.store(true, Ordering::SeqCst);
        if let Some(on_connect) = &options.on_connect {
            on_connect();
        }
        Token::completed(Ok(()))
    }

    fn disconnect(&self, grace: Duration) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.lock().unwrap().push(grace);
    }

    fn publish(&self, topic: &str, _qos: QoS, _retain: bool, payload: Vec<u8>) -> Token {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        if self.acknowledge.load(Ordering::SeqCst) {
            Token::completed(Ok(()))
        } else {
            Token::new()
        }
    }

    fn subscribe(&self, pattern: &str, _qos: QoS, callback: MessageCallback) -> Token {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        subscriptions.retain(|(existing, _)| existing != pattern);
        subscriptions.push((pattern.to_string(), callback));
        Token::completed(Ok(()))
    }

    fn unsubscribe(&self, pattern: &str) -> Token {
        if self.unsubscribe_not_connected.load(Ordering::SeqCst) {
            return Token::completed(Err(TransportError::NotConnected));
        }
        self.subscriptions
            .lock()
            .unwrap()
            .retain(|(existing, _)| existing != pattern);
        self.unsubscribed.lock().unwrap().push(pattern.to_string());
        Token::completed(Ok(()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// A logger that keeps every line it receives.
#[derive(Default)]
pub struct CapturingLogger {
    lines: Mutex<Vec<(&'static str, String)>>,
}

impl CapturingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, level: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    fn push(&self, level: &'static str, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

impl Logger for CapturingLogger {
    fn error(&self, message: &str) {
        self.push("error", message);
    }

    fn warn(&self, message: &str) {
        self.push("warn", message);
    }

    fn info(&self, message: &str) {
        self.push("info", message);
    }

    fn debug(&self, message: &str) {
        self.push("debug", message);
    }
}
