//! Ditto Rust Twin Client Example
//!
//! Simulates a thermometer: reports its temperature as twin events and answers
//! commands that change the desired target temperature.
//!
//! Set `DITTO_BROKER` to override the broker (default `tcp://localhost:1883`)
//! and `RUST_LOG=ditto_rs=debug` to see client diagnostics.

use ditto_rs::headers;
use ditto_rs::things::{Command, Event};
use ditto_rs::topic::action;
use ditto_rs::{
    Client, Configuration, Envelope, Error, Feature, Handler, NamespacedId, Result, Thing,
    TopicChannel, TopicCriterion,
};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const TARGET_PATH: &str = "/features/temp/desiredProperties/target";

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

struct Thermometer {
    value: f64,
    target: f64,
}

impl Thermometer {
    fn step(&mut self, rng: &mut impl Rng) {
        self.value += (self.target - self.value) * 0.2 + (rng.random::<f64>() - 0.5) * 0.1;
    }
}

fn main() -> Result<()> {
    env_logger::init();

    println!("Ditto Rust Twin Client Example");
    println!("==============================\n");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    let broker =
        std::env::var("DITTO_BROKER").unwrap_or_else(|_| "tcp://localhost:1883".to_string());
    let thing_id: NamespacedId = "org.example:thermometer-1".parse()?;

    let config = Configuration::new(broker)
        .with_connect_handler(|_: &Client| println!("[OK] Connected and subscribed"))
        .with_connection_lost_handler(|_: &Client, err: &Error| {
            println!("[WARN] Connection lost: {}", err)
        });
    let client = Client::new(config)?;

    let state = Arc::new(Mutex::new(Thermometer {
        value: 20.0,
        target: 21.0,
    }));

    let handler_client = client.clone();
    let handler_state = state.clone();
    let handler: Handler = Arc::new(move |request_id: &str, envelope: &Envelope| {
        println!(
            "[{}] Request '{}' on {:?} {}",
            timestamp(),
            request_id,
            envelope.topic.criterion,
            envelope.path
        );

        let is_target_update = envelope.topic.channel == Some(TopicChannel::Twin)
            && envelope.topic.criterion == Some(TopicCriterion::Commands)
            && envelope.topic.action == action::MODIFY
            && envelope.path == TARGET_PATH;
        let status = match envelope.value.as_ref().and_then(|v| v.as_f64()) {
            Some(target) if is_target_update => {
                handler_state.lock().unwrap().target = target;
                println!("  New target: {:.1} C", target);
                204
            }
            _ => 400,
        };

        if !envelope.headers.is_response_required() {
            return;
        }
        let mut reply_headers = envelope.headers.with([]);
        let correlation_id = reply_headers.correlation_id();
        let reply = Envelope::new()
            .with_topic(envelope.topic.clone())
            .with_headers(reply_headers)
            .with_path(&envelope.path)
            .with_status(status);
        match handler_client.reply(request_id, &reply) {
            Ok(()) => println!("  Replied {} ({})", status, correlation_id),
            Err(err) => println!("  [ERROR] Reply failed: {}", err),
        }
    });
    client.subscribe(&[handler]);

    client.connect()?;

    // Announce the thing with its current state
    let thing = {
        let state = state.lock().unwrap();
        Thing::new(thing_id.clone()).with_feature(
            "temp",
            Feature::new()
                .with_property("value", state.value)
                .with_desired_property("target", state.target),
        )
    };
    let create = Command::new(&thing_id)
        .create(serde_json::to_value(&thing)?)
        .envelope([headers::with_response_required(false)]);
    client.send(&create)?;
    println!("[OK] Sent create command for {}", thing_id);

    println!("\nReporting temperature (Ctrl-C to stop)...");
    let mut rng = rand::rng();
    let mut revision = 1;
    while running.load(Ordering::SeqCst) {
        let value = {
            let mut state = state.lock().unwrap();
            state.step(&mut rng);
            state.value
        };
        revision += 1;

        let event = Event::new(&thing_id)
            .feature_property("temp", "value")
            .modified(value)
            .envelope([headers::with_originator("demo:thermometer")])
            .with_revision(revision)
            .with_timestamp(timestamp());
        match client.send(&event) {
            Ok(()) => println!("[{}] temp = {:.2} C (rev {})", timestamp(), value, revision),
            Err(err) => println!("[{}] [ERROR] {}", timestamp(), err),
        }

        thread::sleep(Duration::from_secs(2));
    }

    println!("\nDisconnecting...");
    client.disconnect();
    println!("[OK] Done");
    Ok(())
}
