//! The bridge event loop
//!
//! [`LampBridge`] owns both connections and runs a single select loop over
//! inbound MQTT events, inbound mesh events, and control commands. Every
//! handler returns to the loop on failure; nothing here tears the process
//! down.
//!
//! The MQTT lifecycle follows Home Assistant's discovery contract: on each
//! (re)connection the bridge subscribes to the birth-message topic and
//! every lamp's command topic, then nudges the birth topic so a broker
//! restart replays it. Discovery announcements go out whenever a birth
//! message arrives.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Interval};
use tracing::{debug, error, info, warn};

use crate::command::{parse_command, LightCommand};
use crate::config::BridgeConfig;
use crate::encoder::CommandEncoder;
use crate::error::Result;
use crate::events::{EventDecoder, MeshEvent};
use crate::mqtt::{MqttClient, MqttEvent};
use crate::publisher::{set_topic, StatePublisher};
use crate::registry::LampRegistry;
use crate::router::TopicRouter;
use crate::session::SessionStore;
use crate::transport::MeshTransport;

/// Control channel depth
const COMMAND_CHANNEL_SIZE: usize = 16;

/// Counters exposed through [`BridgeHandle::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Mesh requests sent from inbound MQTT commands
    pub commands_sent: u64,
    /// Mesh status reports reflected onto state topics
    pub statuses_published: u64,
    /// Discovery announcements published
    pub discovery_published: u64,
    /// Inbound messages dropped for matching no registered lamp
    pub dropped_unknown_topic: u64,
    /// Mesh statuses dropped for coming from an unregistered address
    pub dropped_unknown_sender: u64,
    /// Inbound payloads that failed to parse or matched no command shape
    pub parse_errors: u64,
    /// Commands rejected by range validation
    pub validation_rejects: u64,
    /// Mesh or MQTT transport failures
    pub transport_errors: u64,
    /// Acknowledged sends that timed out
    pub timeouts: u64,
}

/// Control commands accepted by the running bridge
enum BridgeCommand {
    GetStats(oneshot::Sender<BridgeStats>),
    Shutdown,
}

/// Handle for controlling a running bridge
#[derive(Clone)]
pub struct BridgeHandle {
    command_tx: mpsc::Sender<BridgeCommand>,
}

impl BridgeHandle {
    /// Snapshot the bridge counters
    pub async fn stats(&self) -> Result<BridgeStats> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(BridgeCommand::GetStats(tx)).await?;
        rx.await.map_err(|_| crate::error::BridgeError::ChannelClosed)
    }

    /// Stop the bridge event loop
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx.send(BridgeCommand::Shutdown).await?;
        Ok(())
    }
}

/// The mesh-to-MQTT lamp bridge
pub struct LampBridge {
    config: BridgeConfig,
    registry: LampRegistry,
    session: Arc<SessionStore>,
    encoder: CommandEncoder,
    publisher: StatePublisher,
    router: TopicRouter,
    decoder: EventDecoder,
    mqtt: Arc<dyn MqttClient>,
    mqtt_rx: mpsc::Receiver<MqttEvent>,
    mesh_rx: mpsc::Receiver<MeshEvent>,
    command_rx: mpsc::Receiver<BridgeCommand>,
    stats: BridgeStats,
}

impl LampBridge {
    /// Wire up a bridge over connected transports
    pub fn new(
        config: BridgeConfig,
        registry: LampRegistry,
        session: Arc<SessionStore>,
        transport: Arc<dyn MeshTransport>,
        mqtt: Arc<dyn MqttClient>,
        mqtt_rx: mpsc::Receiver<MqttEvent>,
        mesh_rx: mpsc::Receiver<MeshEvent>,
    ) -> (Self, BridgeHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let publisher = StatePublisher::new(mqtt.clone());
        let encoder = CommandEncoder::new(
            transport,
            publisher.clone(),
            session.clone(),
            config.mesh.clone(),
        );
        let router = TopicRouter::new(
            registry.clone(),
            config.discovery_prefix.clone(),
            config.broadcast_fallback,
        );
        let decoder = EventDecoder::new(
            registry.clone(),
            publisher.clone(),
            session.clone(),
            config.discovery_prefix.clone(),
        );

        let bridge = Self {
            config,
            registry,
            session,
            encoder,
            publisher,
            router,
            decoder,
            mqtt,
            mqtt_rx,
            mesh_rx,
            command_rx,
            stats: BridgeStats::default(),
        };
        (bridge, BridgeHandle { command_tx })
    }

    /// Run the event loop until shutdown or until both connections close
    pub async fn run(mut self) {
        info!(
            prefix = %self.config.discovery_prefix,
            lamps = self.registry.capacity(),
            poll = ?self.config.status_poll,
            "Lamp bridge running"
        );
        let mut poll = self.config.status_poll.map(interval);

        loop {
            tokio::select! {
                Some(event) = self.mqtt_rx.recv() => {
                    self.handle_mqtt_event(event).await;
                }
                Some(event) = self.mesh_rx.recv() => {
                    self.handle_mesh_event(event).await;
                }
                Some(command) = self.command_rx.recv() => {
                    match command {
                        BridgeCommand::GetStats(tx) => {
                            let _ = tx.send(self.stats.clone());
                        }
                        BridgeCommand::Shutdown => {
                            info!("Bridge shutting down");
                            return;
                        }
                    }
                }
                _ = maybe_tick(&mut poll) => {
                    self.poll_lamps().await;
                }
                else => {
                    info!("All event sources closed, bridge stopping");
                    return;
                }
            }
        }
    }

    async fn handle_mqtt_event(&mut self, event: MqttEvent) {
        match event {
            MqttEvent::Connected => self.on_connected().await,
            MqttEvent::Data { topic, payload } => {
                if topic == self.config.status_topic() {
                    self.announce_all().await;
                } else {
                    self.dispatch_set(&topic, &payload).await;
                }
            }
            MqttEvent::Disconnected => warn!("MQTT connection lost"),
            MqttEvent::Error(e) => warn!(error = %e, "MQTT connection error"),
        }
    }

    /// Subscribe and nudge the birth topic after each (re)connection
    async fn on_connected(&mut self) {
        info!("MQTT connected, subscribing command topics");
        let status_topic = self.config.status_topic();
        if let Err(e) = self.mqtt.subscribe(&status_topic).await {
            error!(error = %e, "Birth-topic subscribe failed");
            self.stats.transport_errors += 1;
        }

        for (index, lamp) in self.registry.entries().await {
            let topic = set_topic(&self.config.discovery_prefix, &lamp.name);
            if let Err(e) = self.mqtt.subscribe(&topic).await {
                error!(index, topic, error = %e, "Command-topic subscribe failed");
                self.stats.transport_errors += 1;
            }
        }

        // An empty publish on the birth topic makes the broker replay the
        // retained birth message, triggering discovery below.
        if let Err(e) = self.publisher.publish_raw(&status_topic, Vec::new()).await {
            warn!(error = %e, "Birth-topic nudge failed");
            self.stats.transport_errors += 1;
        }
    }

    /// Announce every registered lamp to discovery
    async fn announce_all(&mut self) {
        for (index, lamp) in self.registry.entries().await {
            match self
                .publisher
                .publish_discovery(&self.config.discovery_prefix, &lamp.name, &lamp.address)
                .await
            {
                Ok(()) => self.stats.discovery_published += 1,
                Err(e) => {
                    error!(index, error = %e, "Discovery publish failed");
                    self.stats.transport_errors += 1;
                }
            }
        }
    }

    /// Handle one inbound command message
    async fn dispatch_set(&mut self, topic: &str, payload: &[u8]) {
        let target = match self.router.resolve(topic).await {
            Ok(target) => target,
            Err(e) if e.is_benign() => {
                debug!(topic, "Dropping message for unknown topic");
                self.stats.dropped_unknown_topic += 1;
                return;
            }
            Err(e) => {
                error!(topic, error = %e, "Topic resolution failed");
                self.stats.transport_errors += 1;
                return;
            }
        };

        let last_lightness = self.session.snapshot().lightness;
        let command = match parse_command(payload, last_lightness) {
            Ok(command) => command,
            Err(e) => {
                warn!(topic, error = %e, "Undecodable command payload");
                self.stats.parse_errors += 1;
                return;
            }
        };
        debug!(lamp = %target.name, command = ?command, "Dispatching command");

        let result = match command {
            LightCommand::OnOff(on) => match self.encoder.send_onoff(target.address, on).await {
                Ok(()) => self.publisher.publish_onoff(&target.state_topic, on).await,
                Err(e) => Err(e),
            },
            LightCommand::Brightness(percent) => {
                self.encoder
                    .send_brightness(target.address, &target.state_topic, percent)
                    .await
            }
            LightCommand::Hsl { hue, saturation, lightness } => {
                self.encoder
                    .send_hsl(target.address, &target.state_topic, hue, saturation, lightness)
                    .await
            }
            LightCommand::Unrecognized => {
                debug!(lamp = %target.name, "Payload matched no command shape");
                self.stats.parse_errors += 1;
                return;
            }
        };

        match result {
            Ok(()) => self.stats.commands_sent += 1,
            Err(e) if e.is_validation() => {
                warn!(lamp = %target.name, error = %e, "Command rejected");
                self.stats.validation_rejects += 1;
            }
            Err(e) => {
                error!(lamp = %target.name, error = %e, code = e.error_code(), "Command failed");
                self.stats.transport_errors += 1;
            }
        }
    }

    /// Handle one inbound mesh event
    async fn handle_mesh_event(&mut self, event: MeshEvent) {
        if matches!(event, MeshEvent::Timeout { .. }) {
            self.stats.timeouts += 1;
        }
        let is_status = matches!(
            event,
            MeshEvent::GetStatus { .. } | MeshEvent::SetStatus { .. } | MeshEvent::Publish { .. }
        );
        match self.decoder.handle(event).await {
            Ok(()) => {
                if is_status {
                    self.stats.statuses_published += 1;
                }
            }
            Err(e) if e.is_benign() => {
                debug!(error = %e, "Dropping status from unknown sender");
                self.stats.dropped_unknown_sender += 1;
            }
            Err(e) => {
                error!(error = %e, code = e.error_code(), "Mesh event handling failed");
                self.stats.transport_errors += 1;
            }
        }
    }

    /// Issue an on/off query to every registered lamp
    async fn poll_lamps(&mut self) {
        debug!("Running status poll sweep");
        for (index, lamp) in self.registry.entries().await {
            let address = match lamp.resolved_address() {
                Ok(address) => address,
                Err(e) => {
                    debug!(index, error = %e, "Skipping lamp in poll sweep");
                    continue;
                }
            };
            if let Err(e) = self.encoder.get_onoff(address).await {
                warn!(index, error = %e, "Status poll send failed");
                self.stats.transport_errors += 1;
            }
        }
    }
}

/// Tick the poll interval, or park forever when polling is disabled
async fn maybe_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
