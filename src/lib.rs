//! Rust client for Eclipse Ditto's protocol over MQTT.
//!
//! This library models Ditto digital twins (things, features, definitions),
//! builds and parses Ditto Protocol envelopes, and exchanges them with a Ditto
//! edge agent over an MQTT connection.
//!
//! # Features
//!
//! - **Typed identifiers**: [`NamespacedId`] and [`DefinitionId`] validate on parse
//! - **Protocol topics**: [`Topic`] parses and formats `namespace/name/group/...` strings
//! - **Header helpers**: [`Headers`] with case-insensitive lookup and typed accessors
//! - **Fluent builders**: [`things::Command`], [`things::Event`], [`things::Message`]
//! - **Pluggable transport**: own the MQTT connection or share one via [`Transport`]
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`model`]: Thing, feature and identifier types
//! - [`topic`], [`headers`], [`envelope`]: the Ditto Protocol message
//! - [`things`]: builders for thing commands, events and live messages
//! - [`client`]: connection lifecycle, handler registry, request/reply
//! - [`mqtt`]: the bundled MQTT transport
//!
//! # Example: Building a command
//!
//! ```
//! use ditto_rs::{headers, things, NamespacedId};
//!
//! # fn main() -> Result<(), ditto_rs::Error> {
//! let thing_id: NamespacedId = "org.example:sensor-1".parse()?;
//!
//! let mut command = things::Command::new(&thing_id);
//! command.feature_property("temp", "value").modify(21.5);
//!
//! let envelope = command.envelope([headers::with_response_required(false)]);
//! assert_eq!(
//!     envelope.topic.to_topic_string()?,
//!     "org.example/sensor-1/things/twin/commands/modify"
//! );
//! assert_eq!(envelope.path, "/features/temp/properties/value");
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Client
//!
//! ```no_run
//! use ditto_rs::{Client, Configuration, Envelope, Handler};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), ditto_rs::Error> {
//! let config = Configuration::new("tcp://localhost:1883")
//!     .with_connect_handler(|_client| println!("connected"));
//!
//! let client = Client::new(config)?;
//! let handler: Handler = Arc::new(|request_id: &str, envelope: &Envelope| {
//!     println!("request '{}': {:?}", request_id, envelope.topic);
//! });
//! client.subscribe(&[handler]);
//! client.connect()?;
//!
//! // Keep running to receive messages
//! std::thread::sleep(Duration::from_secs(60));
//!
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod notify;

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod headers;
pub mod logger;
pub mod model;
pub mod mqtt;
pub mod things;
pub mod topic;
pub mod transport;

pub use client::{Client, Handler};
pub use config::{Configuration, Credentials, TlsConfig};
pub use envelope::Envelope;
pub use error::{ConfigConflict, Error, Result, TransportError};
pub use headers::{HeaderOpt, Headers};
pub use logger::{LogFacade, Logger, NoopLogger};
pub use model::{DefinitionId, Feature, NamespacedId, Thing};
pub use mqtt::MqttTransport;
pub use topic::{Topic, TopicChannel, TopicCriterion, TopicGroup};
pub use transport::{ConnectOptions, QoS, Token, Transport};
