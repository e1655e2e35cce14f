//! Tests for client configuration

mod common;

use common::FakeTransport;
use ditto_rs::config::{
    DEFAULT_ACKNOWLEDGE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DISCONNECT_TIMEOUT,
    DEFAULT_KEEP_ALIVE, DEFAULT_SUBSCRIBE_TIMEOUT, DEFAULT_UNSUBSCRIBE_TIMEOUT,
};
use ditto_rs::{Client, ConfigConflict, Configuration, Credentials, Error, TlsConfig};
use std::time::Duration;

fn conflict(config: Configuration) -> Option<ConfigConflict> {
    match config.validate_for_external_transport() {
        Err(Error::ExternalTransport(conflict)) => Some(conflict),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(()) => None,
    }
}

#[test]
fn test_config_creation() {
    let config = Configuration::new("tcp://localhost:1883");

    assert_eq!(config.broker, "tcp://localhost:1883");
    assert!(config.credentials.is_none());
    assert!(config.tls.is_none());
    assert!(config.connect_handler.is_none());
    assert!(config.connection_lost_handler.is_none());
}

#[test]
fn test_config_defaults() {
    let config = Configuration::default();

    assert!(config.broker.is_empty());
    assert_eq!(config.keep_alive, DEFAULT_KEEP_ALIVE);
    assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    assert_eq!(config.disconnect_timeout, DEFAULT_DISCONNECT_TIMEOUT);
    assert_eq!(config.acknowledge_timeout, DEFAULT_ACKNOWLEDGE_TIMEOUT);
    assert_eq!(config.subscribe_timeout, DEFAULT_SUBSCRIBE_TIMEOUT);
    assert_eq!(config.unsubscribe_timeout, DEFAULT_UNSUBSCRIBE_TIMEOUT);
}

#[test]
fn test_config_with_owned_strings() {
    let broker = String::from("tcp://broker:1883");
    let config = Configuration::new(broker);
    assert_eq!(config.broker, "tcp://broker:1883");

    let credentials = Credentials::new(String::from("ditto"), String::from("secret"));
    assert_eq!(credentials.username, "ditto");
    assert_eq!(credentials.password, "secret");
}

#[test]
fn test_config_debug_hides_password() {
    let config = Configuration {
        credentials: Some(Credentials::new("ditto", "secret")),
        ..Configuration::new("tcp://localhost:1883")
    };
    let debug = format!("{:?}", config);
    assert!(debug.contains("ditto"));
    assert!(!debug.contains("secret"));
}

#[test]
fn test_default_config_allows_external_transport() {
    assert_eq!(conflict(Configuration::default()), None);

    let config = Configuration {
        acknowledge_timeout: Duration::from_secs(1),
        subscribe_timeout: Duration::from_secs(1),
        unsubscribe_timeout: Duration::from_secs(1),
        ..Configuration::default()
    };
    assert_eq!(conflict(config), None);
}

#[test]
fn test_each_owned_field_conflicts() {
    assert_eq!(
        conflict(Configuration::new("tcp://localhost:1883")),
        Some(ConfigConflict::Broker)
    );
    assert_eq!(
        conflict(Configuration {
            credentials: Some(Credentials::new("u", "p")),
            ..Configuration::default()
        }),
        Some(ConfigConflict::Credentials)
    );
    assert_eq!(
        conflict(Configuration {
            disconnect_timeout: Duration::from_secs(1),
            ..Configuration::default()
        }),
        Some(ConfigConflict::DisconnectTimeout)
    );
    assert_eq!(
        conflict(Configuration {
            keep_alive: Duration::from_secs(1),
            ..Configuration::default()
        }),
        Some(ConfigConflict::KeepAlive)
    );
    assert_eq!(
        conflict(Configuration {
            connect_timeout: Duration::from_secs(1),
            ..Configuration::default()
        }),
        Some(ConfigConflict::ConnectTimeout)
    );
    assert_eq!(
        conflict(Configuration {
            tls: Some(TlsConfig::with_ca(b"ca".to_vec())),
            ..Configuration::default()
        }),
        Some(ConfigConflict::Tls)
    );
}

#[test]
fn test_first_conflict_wins() {
    let config = Configuration {
        credentials: Some(Credentials::new("u", "p")),
        keep_alive: Duration::from_secs(1),
        tls: Some(TlsConfig::default()),
        ..Configuration::new("tcp://localhost:1883")
    };
    assert_eq!(conflict(config), Some(ConfigConflict::Broker));

    let config = Configuration {
        keep_alive: Duration::from_secs(1),
        tls: Some(TlsConfig::default()),
        ..Configuration::default()
    };
    assert_eq!(conflict(config), Some(ConfigConflict::KeepAlive));
}

#[test]
fn test_from_transport_validates() {
    let err = Client::from_transport(Configuration::new("tcp://localhost:1883"), FakeTransport::new())
        .unwrap_err();
    assert!(matches!(err, Error::ExternalTransport(ConfigConflict::Broker)));
    assert!(err.to_string().contains("broker"));
}

#[test]
fn test_config_conflict_messages() {
    assert_eq!(
        ConfigConflict::KeepAlive.to_string(),
        "keep alive is managed by the external transport"
    );
    let err = Error::ExternalTransport(ConfigConflict::Tls);
    assert_eq!(
        err.to_string(),
        "configuration not allowed with an external transport: \
         TLS configuration is managed by the external transport"
    );
    let source: &dyn std::error::Error = &ConfigConflict::Credentials;
    assert!(source.to_string().starts_with("credentials"));
}

#[test]
fn test_config_clone_shares_handlers() {
    let config = Configuration::default().with_connect_handler(|_| {});
    let cloned = config.clone();
    assert!(cloned.connect_handler.is_some());
}
