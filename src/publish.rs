//! Home Assistant mirroring over a best-effort pub/sub sink
//!
//! Every tick republishes discovery metadata and the current state for each
//! monitored key. Publishes are only attempted while the transport reports
//! itself connected; failures are logged and never abort the tick.

pub mod discovery;
#[cfg(feature = "mqtt")]
pub mod mqtt;

use crate::config::MqttConfig;
use crate::error::Result;
use crate::fuel::StationId;
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use std::sync::Arc;

pub use discovery::{DiscoveryPayload, discovery_topic, format_state, state_topic};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttPublisher;

/// Retained-message transport with an observable connection state
#[async_trait]
pub trait Publisher: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    async fn close(&self) {}
}

/// Publisher used when no broker is configured; never connected
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPublisher;

#[async_trait]
impl Publisher for DisabledPublisher {
    fn is_connected(&self) -> bool {
        false
    }

    async fn publish_retained(&self, _topic: &str, _payload: Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// Build the publisher matching `cfg`. Must be called inside a tokio runtime
/// when a broker is configured.
pub fn from_config(cfg: &MqttConfig) -> Arc<dyn Publisher> {
    let logger = get_logger("mqtt");
    if !cfg.enabled() {
        logger.info("MQTT broker not configured, skipping MQTT initialization");
        return Arc::new(DisabledPublisher);
    }
    #[cfg(feature = "mqtt")]
    {
        Arc::new(MqttPublisher::start(cfg))
    }
    #[cfg(not(feature = "mqtt"))]
    {
        logger.warn("MQTT broker configured but built without the mqtt feature");
        Arc::new(DisabledPublisher)
    }
}

/// Check that a broker accepts a connection with the given credentials
#[cfg(not(feature = "mqtt"))]
pub async fn test_connection(
    _broker: &str,
    _port: u16,
    _user: &str,
    _password: &str,
) -> (bool, String) {
    (false, "MQTT integration disabled".to_string())
}

#[cfg(feature = "mqtt")]
pub use mqtt::test_connection;

/// Publishes discovery and state messages for monitored keys
pub struct HomeAssistantMirror {
    publisher: Arc<dyn Publisher>,
    discovery_prefix: String,
    logger: StructuredLogger,
}

impl HomeAssistantMirror {
    pub fn new(publisher: Arc<dyn Publisher>, discovery_prefix: impl Into<String>) -> Self {
        Self {
            publisher,
            discovery_prefix: discovery_prefix.into(),
            logger: get_logger("mqtt"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    /// Publish discovery metadata for one key. Returns whether a message was
    /// handed to the transport.
    pub async fn publish_discovery(
        &self,
        station_id: StationId,
        station_name: &str,
        fuel_type: &str,
    ) -> bool {
        if !self.publisher.is_connected() {
            return false;
        }
        let topic = discovery_topic(&self.discovery_prefix, station_id, fuel_type);
        let payload = match DiscoveryPayload::new(station_id, station_name, fuel_type).to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.logger
                    .error(&format!("Failed to encode discovery payload: {}", e));
                return false;
            }
        };
        match self.publisher.publish_retained(&topic, payload).await {
            Ok(()) => {
                self.logger.debug(&format!(
                    "Published discovery for fuelapp_{}_{}",
                    station_id, fuel_type
                ));
                true
            }
            Err(e) => {
                self.logger
                    .error(&format!("Failed to publish discovery: {}", e));
                false
            }
        }
    }

    /// Publish the current price for one key
    pub async fn publish_state(&self, station_id: StationId, fuel_type: &str, price: f64) -> bool {
        if !self.publisher.is_connected() {
            return false;
        }
        let topic = state_topic(station_id, fuel_type);
        match self
            .publisher
            .publish_retained(&topic, format_state(price).into_bytes())
            .await
        {
            Ok(()) => {
                self.logger.debug(&format!(
                    "Published state for {}/{}: {:.1}",
                    station_id, fuel_type, price
                ));
                true
            }
            Err(e) => {
                self.logger.error(&format!("Failed to publish state: {}", e));
                false
            }
        }
    }

    pub async fn close(&self) {
        self.publisher.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FuelWatchError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Recorder {
        connected: AtomicBool,
        fail: AtomicBool,
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl Publisher for Recorder {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(FuelWatchError::publish("broker gone"));
            }
            self.sent.lock().unwrap().push((topic.to_string(), payload));
            Ok(())
        }
    }

    #[tokio::test]
    async fn skips_silently_when_disconnected() {
        let recorder = Arc::new(Recorder::default());
        let mirror = HomeAssistantMirror::new(recorder.clone(), "homeassistant");
        assert!(!mirror.publish_discovery(350, "Metro", "E10").await);
        assert!(!mirror.publish_state(350, "E10", 150.9).await);
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn discovery_is_byte_identical_across_calls() {
        let recorder = Arc::new(Recorder::default());
        recorder.connected.store(true, Ordering::SeqCst);
        let mirror = HomeAssistantMirror::new(recorder.clone(), "homeassistant");
        assert!(mirror.publish_discovery(350, "Metro \"Ryde\"", "E10").await);
        assert!(mirror.publish_discovery(350, "Metro \"Ryde\"", "E10").await);

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert_eq!(
            sent[0].0,
            "homeassistant/sensor/fuelapp/fuelapp_350_E10/config"
        );
    }

    #[tokio::test]
    async fn publish_failure_is_reported_not_raised() {
        let recorder = Arc::new(Recorder::default());
        recorder.connected.store(true, Ordering::SeqCst);
        recorder.fail.store(true, Ordering::SeqCst);
        let mirror = HomeAssistantMirror::new(recorder, "homeassistant");
        assert!(!mirror.publish_state(350, "E10", 150.9).await);
    }

    #[test]
    fn disabled_publisher_is_never_connected() {
        assert!(!DisabledPublisher.is_connected());
    }
}
