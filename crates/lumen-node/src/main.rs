//! Bridge daemon and lamp-registry admin CLI

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rumqttc::MqttOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lumen_bridge::mqtt::rumqtt::RumqttClient;
use lumen_bridge::transport::tcp::TcpTransport;
use lumen_bridge::{
    parse_mesh_address, BridgeConfigBuilder, LampBridge, LampInfo, LampRegistry, SessionStore,
};
use lumen_state::SqliteStore;

#[derive(Parser)]
#[command(name = "lumen-node", version, about = "BLE-mesh lamp to MQTT bridge")]
struct Cli {
    /// Path to the sqlite database holding the registry and session
    #[arg(long, default_value = "lumen.db")]
    db: PathBuf,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bridge daemon
    Run {
        /// MQTT broker host
        #[arg(long, default_value = "127.0.0.1")]
        mqtt_host: String,

        /// MQTT broker port
        #[arg(long, default_value_t = 1883)]
        mqtt_port: u16,

        /// Mesh gateway address (host:port)
        #[arg(long, default_value = "127.0.0.1:7005")]
        gateway: String,

        /// Discovery topic prefix
        #[arg(long, default_value = "homeassistant")]
        prefix: String,

        /// Broadcast commands whose lamp address fails to parse
        #[arg(long)]
        broadcast_fallback: bool,

        /// Poll every lamp's on/off state at this interval (e.g. "30s")
        #[arg(long)]
        status_poll: Option<humantime::Duration>,
    },
    /// Register a lamp in a registry slot
    AddLamp {
        /// Registry slot index
        slot: usize,
        /// Lamp name (topic segment)
        name: String,
        /// Mesh address, decimal or 0x-prefixed hex
        address: String,
    },
    /// List registered lamps
    ListLamps,
    /// Remove the lamp in a registry slot
    RemoveLamp {
        /// Registry slot index
        slot: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let storage = Arc::new(
        SqliteStore::open(&cli.db)
            .await
            .with_context(|| format!("opening database {}", cli.db.display()))?,
    );
    let registry = LampRegistry::new(storage.clone());

    match cli.command {
        Command::Run {
            mqtt_host,
            mqtt_port,
            gateway,
            prefix,
            broadcast_fallback,
            status_poll,
        } => {
            let mut builder = BridgeConfigBuilder::new()
                .discovery_prefix(prefix)
                .broadcast_fallback(broadcast_fallback);
            if let Some(interval) = status_poll {
                builder = builder.status_poll(interval.into());
            }
            let config = builder.build();

            let session = Arc::new(SessionStore::open(storage.clone()).await?);

            let mut options = MqttOptions::new("lumen-bridge", mqtt_host, mqtt_port);
            options.set_keep_alive(std::time::Duration::from_secs(30));
            let (mqtt, mqtt_rx) = RumqttClient::connect(options, 16);

            let (transport, mesh_rx) = TcpTransport::connect(&gateway)
                .await
                .with_context(|| format!("connecting to mesh gateway {gateway}"))?;

            let (bridge, handle) = LampBridge::new(
                config,
                registry,
                session,
                Arc::new(transport),
                Arc::new(mqtt),
                mqtt_rx,
                mesh_rx,
            );
            tokio::spawn(bridge.run());

            tokio::signal::ctrl_c().await?;
            info!("Interrupt received, shutting down");
            if let Ok(stats) = handle.stats().await {
                info!(?stats, "Final counters");
            }
            handle.shutdown().await?;
        }
        Command::AddLamp { slot, name, address } => {
            if parse_mesh_address(&address).is_none() {
                warn!(address, "Address does not parse; the lamp will be unreachable");
            }
            registry
                .put(slot, &LampInfo::new(&name, &address))
                .await
                .with_context(|| format!("writing registry slot {slot}"))?;
            println!("Registered '{name}' at {address} in slot {slot}");
        }
        Command::ListLamps => {
            let entries = registry.entries().await;
            if entries.is_empty() {
                println!("No lamps registered");
            }
            for (index, lamp) in entries {
                match lamp.resolved_address() {
                    Ok(addr) => println!("{index:3}  {}  0x{addr:04X}", lamp.name),
                    Err(_) => println!("{index:3}  {}  (unparseable: {})", lamp.name, lamp.address),
                }
            }
        }
        Command::RemoveLamp { slot } => {
            if registry.lookup_by_index(slot).await.is_none() {
                bail!("no lamp registered in slot {slot}");
            }
            registry.remove(slot).await?;
            println!("Removed slot {slot}");
        }
    }

    Ok(())
}
