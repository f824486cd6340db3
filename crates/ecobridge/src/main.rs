//! ecobridge daemon

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ecobridge::availability::Availability;
use ecobridge::ble::bluez::BluezTransport;
use ecobridge::ble::{BleTransport, DeviceLocks};
use ecobridge::bus::{MessageBus, MqttBus, Topics};
use ecobridge::config::Settings;
use ecobridge::dispatcher::{Dispatcher, RetryPolicy};
use ecobridge::listener::CommandListener;
use ecobridge::poller::Poller;
use ecobridge::queue::CommandQueue;
use ecobridge::registry::DeviceRegistry;
use ecobridge::service::ServiceManager;

/// ECO16BT thermostat to MQTT bridge
#[derive(Parser, Debug)]
#[command(name = "ecobridge", version, about, long_about = None)]
struct Args {
    /// TOML configuration file (optional; missing file means defaults)
    #[arg(short, long, default_value = "ecobridge.toml")]
    config: PathBuf,

    /// Directory with pairing-<mac>.json files; overrides the configured one
    #[arg(long)]
    pairing_dir: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ecobridge=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Starting ecobridge v{}", env!("CARGO_PKG_VERSION"));

    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(dir) = args.pairing_dir {
        settings.pairing_dir = dir;
    }

    let registry = Arc::new(DeviceRegistry::load_pairing_dir(&settings.pairing_dir)?);
    if registry.is_empty() {
        warn!(
            dir = %settings.pairing_dir.display(),
            "No paired devices found; only availability and commands will be handled"
        );
    }

    let transport: Arc<dyn BleTransport> = Arc::new(
        BluezTransport::new(&settings.ble)
            .await
            .context("opening BLE adapter")?,
    );
    let mqtt = Arc::new(MqttBus::connect(&settings.mqtt));
    let bus: Arc<dyn MessageBus> = mqtt.clone();

    let topics = Topics::new(settings.mqtt.base_topic.clone());
    let locks = DeviceLocks::new();
    let queue = Arc::new(CommandQueue::new(settings.dispatcher.queue_capacity));

    let manager = ServiceManager::new();
    manager
        .spawn(Dispatcher::new(
            RetryPolicy::from(&settings.dispatcher),
            Arc::clone(&queue),
            Arc::clone(&registry),
            Arc::clone(&transport),
            Arc::clone(&bus),
            topics.clone(),
            locks.clone(),
        ))
        .await?;
    manager
        .spawn(CommandListener::new(
            Arc::clone(&bus),
            topics.clone(),
            Arc::clone(&queue),
        ))
        .await?;
    manager
        .spawn(Poller::new(
            &settings.poller,
            Arc::clone(&registry),
            Arc::clone(&transport),
            Arc::clone(&bus),
            topics.clone(),
            locks,
        ))
        .await?;
    manager
        .spawn(Availability::new(
            settings.availability.interval,
            Arc::clone(&registry),
            Arc::clone(&bus),
            topics,
        ))
        .await?;

    info!(devices = registry.len(), "Bridge running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if let Err(e) = manager.shutdown_all().await {
        warn!(error = %e, "Unclean shutdown");
    }
    if !queue.is_empty() {
        warn!(pending = queue.len(), "Discarding queued commands");
    }
    mqtt.disconnect().await;
    Ok(())
}
