//! Integration tests for the lamp bridge
//!
//! These run the full event loop over mock transports and in-memory
//! storage, feeding events through the same channels the production
//! backends use.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use lumen_bridge::test_utils::{MockMqttClient, MockTransport, TestFixture};
use lumen_bridge::{
    BridgeConfig, BridgeConfigBuilder, BridgeHandle, LampBridge, LampInfo, MeshEvent,
    MeshOpcode, MqttEvent,
};

struct Harness {
    mqtt: Arc<MockMqttClient>,
    transport: Arc<MockTransport>,
    mqtt_tx: mpsc::Sender<MqttEvent>,
    mesh_tx: mpsc::Sender<MeshEvent>,
    handle: BridgeHandle,
}

async fn spawn_bridge(config: BridgeConfig, lamps: &[(usize, LampInfo)]) -> Harness {
    let fx = TestFixture::new().await;
    for (index, lamp) in lamps {
        fx.registry.put(*index, lamp).await.unwrap();
    }

    let (mqtt_tx, mqtt_rx) = mpsc::channel(16);
    let (mesh_tx, mesh_rx) = mpsc::channel(16);
    let (bridge, handle) = LampBridge::new(
        config,
        fx.registry.clone(),
        fx.session.clone(),
        fx.transport.clone(),
        fx.mqtt.clone(),
        mqtt_rx,
        mesh_rx,
    );
    tokio::spawn(bridge.run());

    Harness {
        mqtt: fx.mqtt,
        transport: fx.transport,
        mqtt_tx,
        mesh_tx,
        handle,
    }
}

#[tokio::test]
async fn test_connect_subscribe_and_discover() {
    let h = spawn_bridge(
        BridgeConfig::default(),
        &[(0, LampInfo::new("kitchen", "0x14"))],
    )
    .await;

    h.mqtt_tx.send(MqttEvent::Connected).await.unwrap();
    sleep(Duration::from_millis(50)).await;

    let subs = h.mqtt.subscriptions();
    assert!(subs.contains(&"homeassistant/status".to_string()));
    assert!(subs.contains(&"homeassistant/light/kitchen/set".to_string()));

    // Birth message arrives; discovery goes out
    h.mqtt_tx
        .send(MqttEvent::Data {
            topic: "homeassistant/status".to_string(),
            payload: b"online".to_vec(),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    let configs = h.mqtt.published_to("homeassistant/light/kitchen/config");
    assert_eq!(configs.len(), 1);
    let config: serde_json::Value = serde_json::from_slice(&configs[0].payload).unwrap();
    assert_eq!(config["schema"], "json");
    assert_eq!(config["uniq_id"], "0x14");

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.discovery_published, 1);
}

#[tokio::test]
async fn test_command_flows_to_mesh_and_back() {
    let h = spawn_bridge(
        BridgeConfig::default(),
        &[(0, LampInfo::new("kitchen", "20"))],
    )
    .await;

    // Inbound HSL command
    h.mqtt_tx
        .send(MqttEvent::Data {
            topic: "homeassistant/light/kitchen/set".to_string(),
            payload: br#"{"color":{"h":120,"s":50},"brightness":80}"#.to_vec(),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].opcode, MeshOpcode::HslSetUnack);
    assert_eq!(sent[0].address, 20);

    // The lamp later publishes its state on the mesh
    h.mesh_tx
        .send(MeshEvent::Publish { address: 20, onoff: true })
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    let reports = h.mqtt.published_to("homeassistant/light/kitchen/state");
    assert_eq!(reports.len(), 2); // HSL echo + mesh status
    assert_eq!(reports[1].payload, br#"{"state":1}"#);

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.commands_sent, 1);
    assert_eq!(stats.statuses_published, 1);
}

#[tokio::test]
async fn test_hsl_defaults_lightness_from_previous_brightness() {
    let h = spawn_bridge(
        BridgeConfig::default(),
        &[(0, LampInfo::new("kitchen", "20"))],
    )
    .await;

    // Set brightness first; the session records 65%
    h.mqtt_tx
        .send(MqttEvent::Data {
            topic: "homeassistant/light/kitchen/set".to_string(),
            payload: br#"{"brightness":65}"#.to_vec(),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    // A color command without brightness reuses it
    h.mqtt_tx
        .send(MqttEvent::Data {
            topic: "homeassistant/light/kitchen/set".to_string(),
            payload: br#"{"color":{"h":0,"s":0}}"#.to_vec(),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    let expected = (65.0f64 * 65535.0 / 100.0 / 2.0).round() as u16;
    assert_eq!(
        sent[1].body,
        lumen_bridge::MeshBody::Hsl { hue: 0, saturation: 0, lightness: expected }
    );
}

#[tokio::test]
async fn test_bad_inputs_never_reach_the_mesh() {
    let h = spawn_bridge(
        BridgeConfig::default(),
        &[(0, LampInfo::new("kitchen", "20"))],
    )
    .await;

    let set_topic = "homeassistant/light/kitchen/set";
    for payload in [
        &br#"{"brightness":101}"#[..],
        br#"{"color":{"h":400,"s":50}}"#,
        br#"not json"#,
        br#"{"unknown":"shape"}"#,
    ] {
        h.mqtt_tx
            .send(MqttEvent::Data {
                topic: set_topic.to_string(),
                payload: payload.to_vec(),
            })
            .await
            .unwrap();
    }
    // And one for a lamp that does not exist
    h.mqtt_tx
        .send(MqttEvent::Data {
            topic: "homeassistant/light/attic/set".to_string(),
            payload: br#"{"state":"ON"}"#.to_vec(),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    assert!(h.transport.sent().is_empty());
    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.validation_rejects, 2);
    assert_eq!(stats.parse_errors, 2);
    assert_eq!(stats.dropped_unknown_topic, 1);
    assert_eq!(stats.commands_sent, 0);
}

#[tokio::test]
async fn test_status_poll_sweeps_registered_lamps() {
    let config = BridgeConfigBuilder::new()
        .status_poll(Duration::from_millis(40))
        .build();
    let h = spawn_bridge(
        config,
        &[
            (0, LampInfo::new("kitchen", "20")),
            (1, LampInfo::new("office", "21")),
        ],
    )
    .await;

    // First tick fires immediately, the next after the interval
    sleep(Duration::from_millis(100)).await;

    let sent = h.transport.sent();
    assert!(sent.len() >= 4, "expected at least two sweeps, saw {}", sent.len());
    assert!(sent.iter().all(|r| r.opcode == MeshOpcode::OnOffGet));
}

#[tokio::test]
async fn test_shutdown_stops_the_loop() {
    let h = spawn_bridge(BridgeConfig::default(), &[]).await;

    h.handle.shutdown().await.unwrap();
    sleep(Duration::from_millis(50)).await;

    // The loop is gone; control sends fail
    assert!(h.handle.stats().await.is_err());
    // Keep the channels alive until here so the loop exit came from the
    // shutdown command, not source closure.
    drop(h.mqtt_tx);
    drop(h.mesh_tx);
}
