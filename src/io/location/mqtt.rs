//! MQTT location feed
//!
//! Subscribes to a topic carrying JSON fixes. OwnTracks `location` messages
//! work unchanged: `{"_type":"location","lat":36.75,"lon":3.04,"acc":12}`.
//! Long field names (`latitude`, `longitude`, `accuracy`) are accepted too.
//!
//! A broker that cannot be reached before the first CONNACK ends the feed
//! with `Unavailable`. Once connected, dropped connections are retried.

use super::PositionProvider;
use crate::domain::types::{LocationError, LocationResult, PositionSample};
use crate::infra::config::Config;
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay before polling again after a broken connection
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct MqttFix {
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "longitude")]
    lon: f64,
    #[serde(alias = "accuracy", default)]
    acc: Option<f64>,
}

/// Decode one payload. Non-location OwnTracks messages yield `Ok(None)`.
pub fn parse_payload(
    payload: &[u8],
    fallback_accuracy_m: f64,
) -> Result<Option<PositionSample>, LocationError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| LocationError::Parse(e.to_string()))?;
    if let Some(kind) = value.get("_type").and_then(|t| t.as_str()) {
        if kind != "location" {
            return Ok(None);
        }
    }

    let fix: MqttFix =
        serde_json::from_value(value).map_err(|e| LocationError::Parse(e.to_string()))?;

    if !(-90.0..=90.0).contains(&fix.lat) || !(-180.0..=180.0).contains(&fix.lon) {
        return Err(LocationError::Parse(format!(
            "coordinate out of range: {}, {}",
            fix.lat, fix.lon
        )));
    }
    let accuracy = fix.acc.filter(|a| a.is_finite() && *a >= 0.0).unwrap_or(fallback_accuracy_m);
    Ok(Some(PositionSample::new(fix.lat, fix.lon, accuracy)))
}

pub struct MqttProvider {
    options: MqttOptions,
    topic: String,
    fallback_accuracy_m: f64,
    connection: Option<(AsyncClient, EventLoop)>,
    /// A CONNACK has been seen on this connection
    connected: bool,
    failed: bool,
}

impl MqttProvider {
    pub fn new(options: MqttOptions, topic: &str, fallback_accuracy_m: f64) -> Self {
        Self {
            options,
            topic: topic.to_string(),
            fallback_accuracy_m,
            connection: None,
            connected: false,
            failed: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let client_id = format!("attendance-agent-{}", uuid::Uuid::now_v7().simple());
        let mut options = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password())
        {
            options.set_credentials(username, password);
        }

        Self::new(options, config.mqtt_topic(), config.fallback_accuracy_m())
    }

    async fn connect(&mut self) -> Result<(), LocationError> {
        let (client, eventloop) = AsyncClient::new(self.options.clone(), 16);
        client
            .subscribe(self.topic.as_str(), QoS::AtMostOnce)
            .await
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;
        let (host, port) = self.options.broker_address();
        info!(topic = %self.topic, host = %host, port = %port, "mqtt_location_subscribed");
        self.connection = Some((client, eventloop));
        Ok(())
    }
}

#[async_trait]
impl PositionProvider for MqttProvider {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn next_fix(&mut self) -> Option<LocationResult> {
        if self.failed {
            return None;
        }
        if self.connection.is_none() {
            if let Err(e) = self.connect().await {
                self.failed = true;
                return Some(Err(e));
            }
        }
        let (client, eventloop) = self.connection.as_mut()?;

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match parse_payload(&publish.payload, self.fallback_accuracy_m) {
                        Ok(Some(sample)) => return Some(Ok(sample)),
                        Ok(None) => continue,
                        Err(e) => {
                            debug!(topic = %publish.topic, error = %e, "mqtt_location_rejected");
                            continue;
                        }
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    // A clean session forgets the subscription across reconnects
                    if self.connected && !ack.session_present {
                        if let Err(e) = client.try_subscribe(self.topic.as_str(), QoS::AtMostOnce) {
                            warn!(error = %e, "mqtt_location_resubscribe_failed");
                        }
                    }
                    self.connected = true;
                    info!(topic = %self.topic, "mqtt_location_connected");
                }
                Ok(_) => {}
                Err(ConnectionError::ConnectionRefused(
                    ConnectReturnCode::NotAuthorized | ConnectReturnCode::BadUserNamePassword,
                )) => {
                    self.failed = true;
                    return Some(Err(LocationError::PermissionDenied));
                }
                Err(e) if !self.connected => {
                    self.failed = true;
                    let (host, port) = self.options.broker_address();
                    warn!(host = %host, port = %port, error = %e, "mqtt_location_unreachable");
                    return Some(Err(LocationError::Unavailable(format!(
                        "mqtt broker {host}:{port}: {e}"
                    ))));
                }
                Err(e) => {
                    // The event loop reconnects on the next poll; the watch
                    // timeout reports the gap to the worker meanwhile
                    warn!(error = %e, "mqtt_location_connection_error");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owntracks_location() {
        let payload = br#"{"_type":"location","lat":36.7525,"lon":3.042,"acc":12,"tst":1709625600}"#;
        let sample = parse_payload(payload, 25.0).unwrap().unwrap();
        assert_eq!(sample.latitude, 36.7525);
        assert_eq!(sample.longitude, 3.042);
        assert_eq!(sample.accuracy, 12.0);
    }

    #[test]
    fn test_parse_long_names_and_fallback_accuracy() {
        let payload = br#"{"latitude":-12.5,"longitude":130.8}"#;
        let sample = parse_payload(payload, 25.0).unwrap().unwrap();
        assert_eq!(sample.latitude, -12.5);
        assert_eq!(sample.accuracy, 25.0);
    }

    #[test]
    fn test_non_location_messages_ignored() {
        let payload = br#"{"_type":"transition","event":"leave","desc":"Workshop"}"#;
        assert_eq!(parse_payload(payload, 25.0).unwrap(), None);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        assert!(matches!(parse_payload(b"not json", 25.0), Err(LocationError::Parse(_))));
        assert!(matches!(parse_payload(br#"{"lat":1.0}"#, 25.0), Err(LocationError::Parse(_))));
        assert!(matches!(
            parse_payload(br#"{"lat":91.0,"lon":0.0}"#, 25.0),
            Err(LocationError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_unavailable_once() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let options = MqttOptions::new("attendance-agent-test", "127.0.0.1", port);
        let mut provider = MqttProvider::new(options, "owntracks/worker/phone", 25.0);

        let first = tokio::time::timeout(Duration::from_secs(5), provider.next_fix())
            .await
            .expect("unreachable broker must be reported promptly");
        assert!(matches!(first, Some(Err(LocationError::Unavailable(_)))));
        assert!(first.unwrap().unwrap_err().is_terminal());
        assert!(provider.next_fix().await.is_none());
    }
}
