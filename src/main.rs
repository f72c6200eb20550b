//! bus-signals demo entry point.
//!
//! Runs a ping/pong exchange over the in-process bus: a responder answers
//! every `Ping` with a `Pong` sent back to the pinging connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use bus_signals::bus::{BusConnection, LocalBus, handler_fn};
use bus_signals::config::BusConfig;
use bus_signals::signal::{OutboundSignal, SignalEmitter, SubscriptionRegistry};

const PINGS: u64 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = BusConfig::from_env();
    let base = config.base_address();
    tracing::info!(
        interface = %config.interface,
        path = %config.object_path,
        "starting bus-signals demo"
    );

    let bus = LocalBus::new(config.local_bus_capacity);
    tracing::info!(guid = %bus.guid(), "local bus up");
    let server: Arc<dyn BusConnection> = bus.connect()?;
    let client: Arc<dyn BusConnection> = bus.connect()?;

    // Responder: Ping -> Pong, addressed back to the sender
    let responder_emitter = SignalEmitter::new(Arc::clone(&server), base.clone())?;
    let responder = SubscriptionRegistry::new(
        Arc::clone(&server),
        base.clone(),
        handler_fn(move |_, ping| {
            let pong = OutboundSignal {
                payload: ping.payload.clone(),
                ..OutboundSignal::new("Pong").with_destination(ping.sender.as_str())
            };
            if let Err(err) = responder_emitter.send(pong) {
                tracing::warn!(error = %err, "failed to answer ping");
            }
        }),
    );
    responder.subscribe("Ping")?;

    // Client: hand pongs to the main task instead of working in the handler
    let (tx, mut pongs) = mpsc::unbounded_channel();
    let listener = SubscriptionRegistry::new(
        Arc::clone(&client),
        base.clone(),
        handler_fn(move |_, pong| {
            let _ = tx.send(pong.clone());
        }),
    );
    listener.subscribe("Pong")?;

    let pinger = SignalEmitter::new(client, base)?;
    for seq in 0..PINGS {
        pinger.emit("Ping", Some(serde_json::json!({ "seq": seq }).into()))?;
    }

    for _ in 0..PINGS {
        match tokio::time::timeout(Duration::from_secs(1), pongs.recv()).await {
            Ok(Some(pong)) => tracing::info!(
                from = %pong.sender,
                payload = ?pong.payload,
                "pong received"
            ),
            Ok(None) | Err(_) => {
                tracing::warn!("no pong within a second");
                break;
            }
        }
    }

    listener.close();
    responder.close();
    tracing::info!("demo finished");
    Ok(())
}
