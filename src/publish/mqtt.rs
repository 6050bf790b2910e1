//! MQTT transport built on rumqttc

use super::Publisher;
use crate::config::MqttConfig;
use crate::error::{FuelWatchError, Result};
use crate::logging::get_logger;
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn options(client_id: String, cfg: &MqttConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id, cfg.broker.trim(), cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.max(5)));
    if !cfg.user.is_empty() && !cfg.password.is_empty() {
        opts.set_credentials(cfg.user.clone(), cfg.password.clone());
    }
    opts
}

/// Retained publisher whose connection is driven by a background task
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    event_loop: JoinHandle<()>,
}

impl MqttPublisher {
    /// Spawn the event loop and start connecting in the background
    pub fn start(cfg: &MqttConfig) -> Self {
        let logger = get_logger("mqtt");
        let client_id = format!("fuelapp_{}", cfg.discovery_prefix);
        logger.info(&format!(
            "Connecting to MQTT broker {}:{}",
            cfg.broker, cfg.port
        ));

        let (client, mut event_loop) = AsyncClient::new(options(client_id, cfg), 64);
        let connected = Arc::new(AtomicBool::new(false));
        let flag = connected.clone();

        let handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            logger.info("Connected to MQTT broker");
                            flag.store(true, Ordering::SeqCst);
                        } else {
                            logger.error(&format!(
                                "Failed to connect to MQTT broker, return code {:?}",
                                ack.code
                            ));
                            flag.store(false, Ordering::SeqCst);
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        logger.info("Disconnected from MQTT broker");
                        flag.store(false, Ordering::SeqCst);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if flag.swap(false, Ordering::SeqCst) {
                            logger.warn(&format!("MQTT connection lost: {}", e));
                        } else {
                            logger.debug(&format!("MQTT connection attempt failed: {}", e));
                        }
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        Self {
            client,
            connected,
            event_loop: handle,
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, true, payload)
            .await
            .map_err(|e| FuelWatchError::publish(format!("{}: {}", topic, e)))
    }

    async fn close(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!("MQTT disconnect request failed: {}", e);
        }
        self.connected.store(false, Ordering::SeqCst);
        self.event_loop.abort();
    }
}

/// Attempt a single connection and report the outcome
pub async fn test_connection(broker: &str, port: u16, user: &str, password: &str) -> (bool, String) {
    if broker.trim().is_empty() {
        return (false, "Broker address is required".to_string());
    }
    let cfg = MqttConfig {
        broker: broker.to_string(),
        port,
        user: user.to_string(),
        password: password.to_string(),
        ..MqttConfig::default()
    };
    let client_id = format!("fuelapp_test_{}", uuid::Uuid::new_v4().simple());
    let (client, mut event_loop) = AsyncClient::new(options(client_id, &cfg), 10);

    let outcome = tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return if ack.code == ConnectReturnCode::Success {
                        (true, "Connection successful".to_string())
                    } else {
                        (false, format!("Connection refused: {:?}", ack.code))
                    };
                }
                Ok(_) => {}
                Err(e) => return (false, format!("Connection failed: {}", e)),
            }
        }
    })
    .await
    .unwrap_or_else(|_| (false, "Connection timeout".to_string()));

    let _ = client.try_disconnect();
    outcome
}
