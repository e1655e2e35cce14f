//! Ditto Rust Live Messages Example
//!
//! Sends live messages to a lamp's inbox and prints whatever arrives back,
//! including messages from the lamp's outbox.
//!
//! Set `DITTO_BROKER` to override the broker (default `tcp://localhost:1883`).

use ditto_rs::headers;
use ditto_rs::things::Message;
use ditto_rs::{Client, Configuration, Envelope, Handler, NamespacedId, Result, TopicCriterion};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn timestamp() -> String {
    let now = chrono::Local::now();
    now.format("%H:%M:%S%.3f").to_string()
}

fn main() -> Result<()> {
    env_logger::init();

    println!("Ditto Rust Live Messages Example");
    println!("================================\n");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    let broker =
        std::env::var("DITTO_BROKER").unwrap_or_else(|_| "tcp://localhost:1883".to_string());
    let thing_id: NamespacedId = "org.example:lamp-1".parse()?;

    let client = Client::new(Configuration {
        acknowledge_timeout: Duration::from_secs(5),
        ..Configuration::new(broker)
    })?;

    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();
    let handler: Handler = Arc::new(move |request_id: &str, envelope: &Envelope| {
        counter.fetch_add(1, Ordering::SeqCst);
        if envelope.topic.criterion != Some(TopicCriterion::Messages) {
            println!("[{}] Ignoring {:?} ({})", timestamp(), envelope.topic.criterion, request_id);
            return;
        }
        println!(
            "[{}] Message '{}' at {} (content-type '{}'): {}",
            timestamp(),
            envelope.topic.action,
            envelope.path,
            envelope.headers.content_type(),
            envelope
                .value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default()
        );
    });
    client.subscribe(&[handler]);
    client.connect()?;
    println!("[OK] Connected");

    let mut rng = rand::rng();
    let mut sent = 0;
    while running.load(Ordering::SeqCst) {
        let brightness: u8 = rng.random_range(0..=100);
        let mut message = Message::new(&thing_id);
        message
            .feature("light")
            .inbox("set-brightness")
            .with_payload(brightness);
        let envelope = message.envelope([
            headers::with_content_type("application/json"),
            headers::with_timeout(Duration::from_secs(10)),
            headers::with_response_required(false),
        ]);

        match client.send(&envelope) {
            Ok(()) => {
                sent += 1;
                println!("[{}] Sent brightness {} to {}", timestamp(), brightness, message.path());
            }
            Err(err) => println!("[{}] [ERROR] {}", timestamp(), err),
        }

        thread::sleep(Duration::from_secs(1));
    }

    println!("\nSent {} messages, received {}", sent, received.load(Ordering::SeqCst));
    client.disconnect();
    Ok(())
}
