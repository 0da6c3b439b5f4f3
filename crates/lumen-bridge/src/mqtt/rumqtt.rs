//! rumqttc-backed MQTT client
//!
//! Wraps [`rumqttc::AsyncClient`] and pumps its event loop in a background
//! task, translating connection events into [`MqttEvent`]s. rumqttc
//! reconnects automatically on the next poll after an error; the pump backs
//! off for a second so a dead broker does not spin the loop.

use rumqttc::{AsyncClient, Event, MqttOptions, Packet};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::mqtt::{MqttClient, MqttEvent, QoS};

/// Inbound event channel depth
const EVENT_CHANNEL_SIZE: usize = 64;

/// MQTT client over a rumqttc connection
pub struct RumqttClient {
    client: AsyncClient,
}

impl RumqttClient {
    /// Create a client and spawn the event-loop pump
    ///
    /// Returns the client and the channel carrying connection events and
    /// inbound messages.
    pub fn connect(options: MqttOptions, cap: usize) -> (Self, mpsc::Receiver<MqttEvent>) {
        let (client, mut eventloop) = AsyncClient::new(options, cap);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        tokio::spawn(async move {
            loop {
                let event = match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT broker connection established");
                        MqttEvent::Connected
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => MqttEvent::Data {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    },
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("MQTT broker disconnected");
                        MqttEvent::Disconnected
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "MQTT connection error, reconnecting");
                        if event_tx.send(MqttEvent::Error(e.to_string())).await.is_err() {
                            return;
                        }
                        sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    debug!("Event channel closed, stopping MQTT pump");
                    return;
                }
            }
        });

        (Self { client }, event_rx)
    }
}

fn to_rumqttc_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

#[async_trait::async_trait]
impl MqttClient for RumqttClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()> {
        self.client
            .publish(topic, to_rumqttc_qos(qos), retain, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .subscribe(topic, rumqttc::QoS::AtMostOnce)
            .await
            .map_err(|_| BridgeError::Subscribe(topic.to_string()))
    }
}
