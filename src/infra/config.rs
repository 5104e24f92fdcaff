//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::geo::{Coordinates, Geofence};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Where position fixes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationProviderKind {
    /// NMEA-0183 GPS receiver on a serial port
    Nmea,
    /// JSON fixes published on an MQTT topic
    Mqtt,
    /// No location capability
    None,
}

impl LocationProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationProviderKind::Nmea => "nmea",
            LocationProviderKind::Mqtt => "mqtt",
            LocationProviderKind::None => "none",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { base_url: default_base_url() }
    }
}

fn default_base_url() -> String {
    "http://localhost:5001".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeofenceConfig {
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    /// Allowed distance from the workshop center in meters
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            radius_m: default_radius_m(),
        }
    }
}

fn default_latitude() -> f64 {
    36.7525
}

fn default_longitude() -> f64 {
    3.0420
}

fn default_radius_m() -> f64 {
    300.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_device")]
    pub device: String,
    #[serde(default = "default_serial_baud")]
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { device: default_serial_device(), baud: default_serial_baud() }
    }
}

fn default_serial_device() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_serial_baud() -> u32 {
    9600
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_topic")]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            topic: default_mqtt_topic(),
            username: None,
            password: None,
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_topic() -> String {
    "owntracks/+/+".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_provider")]
    pub provider: LocationProviderKind,
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,
    /// Max wait for a fix before a timeout error is reported
    #[serde(default = "default_location_timeout_ms")]
    pub timeout_ms: u64,
    /// Cached fixes younger than this are reused when a watch starts
    #[serde(default = "default_maximum_age_ms")]
    pub maximum_age_ms: u64,
    /// Accuracy reported for fixes that carry no HDOP
    #[serde(default = "default_fallback_accuracy_m")]
    pub fallback_accuracy_m: f64,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            high_accuracy: default_high_accuracy(),
            timeout_ms: default_location_timeout_ms(),
            maximum_age_ms: default_maximum_age_ms(),
            fallback_accuracy_m: default_fallback_accuracy_m(),
            serial: SerialConfig::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

fn default_provider() -> LocationProviderKind {
    LocationProviderKind::Nmea
}

fn default_high_accuracy() -> bool {
    true
}

fn default_location_timeout_ms() -> u64 {
    10_000
}

fn default_maximum_age_ms() -> u64 {
    60_000
}

fn default_fallback_accuracy_m() -> f64 {
    25.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimersConfig {
    #[serde(default = "default_clock_interval_secs")]
    pub clock_interval_secs: u64,
    #[serde(default = "default_notification_interval_secs")]
    pub notification_interval_secs: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            clock_interval_secs: default_clock_interval_secs(),
            notification_interval_secs: default_notification_interval_secs(),
        }
    }
}

fn default_clock_interval_secs() -> u64 {
    60
}

fn default_notification_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_toast_ttl_ms")]
    pub toast_ttl_ms: u64,
    /// Delay between a completed order and the order view refresh
    #[serde(default = "default_completion_refresh_ms")]
    pub completion_refresh_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            toast_ttl_ms: default_toast_ttl_ms(),
            completion_refresh_ms: default_completion_refresh_ms(),
        }
    }
}

fn default_toast_ttl_ms() -> u64 {
    5000
}

fn default_completion_refresh_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    /// Start with automatic attendance enabled
    #[serde(default)]
    pub auto_check_in: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsConfig {
    /// Status/metrics HTTP port (0 to disable)
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub geofence: GeofenceConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub timers: TimersConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    server_base_url: String,
    geofence: Geofence,
    location_provider: LocationProviderKind,
    location_high_accuracy: bool,
    location_timeout_ms: u64,
    location_maximum_age_ms: u64,
    fallback_accuracy_m: f64,
    serial_device: String,
    serial_baud: u32,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    clock_interval_secs: u64,
    notification_interval_secs: u64,
    toast_ttl_ms: u64,
    completion_refresh_ms: u64,
    auto_check_in: bool,
    metrics_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { server, geofence, location, timers, ui, session, metrics } = toml_config;
        Self {
            server_base_url: server.base_url.trim_end_matches('/').to_string(),
            geofence: Geofence::new(
                Coordinates::new(geofence.latitude, geofence.longitude),
                geofence.radius_m,
            ),
            location_provider: location.provider,
            location_high_accuracy: location.high_accuracy,
            location_timeout_ms: location.timeout_ms,
            location_maximum_age_ms: location.maximum_age_ms,
            fallback_accuracy_m: location.fallback_accuracy_m,
            serial_device: location.serial.device,
            serial_baud: location.serial.baud,
            mqtt_host: location.mqtt.host,
            mqtt_port: location.mqtt.port,
            mqtt_topic: location.mqtt.topic,
            mqtt_username: location.mqtt.username,
            mqtt_password: location.mqtt.password,
            clock_interval_secs: timers.clock_interval_secs,
            notification_interval_secs: timers.notification_interval_secs,
            toast_ttl_ms: ui.toast_ttl_ms,
            completion_refresh_ms: ui.completion_refresh_ms,
            auto_check_in: session.auto_check_in,
            metrics_port: metrics.port,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let center = self.geofence.center;
        anyhow::ensure!(
            (-90.0..=90.0).contains(&center.latitude),
            "geofence latitude {} out of range",
            center.latitude
        );
        anyhow::ensure!(
            (-180.0..=180.0).contains(&center.longitude),
            "geofence longitude {} out of range",
            center.longitude
        );
        anyhow::ensure!(
            self.geofence.radius_m.is_finite() && self.geofence.radius_m >= 0.0,
            "geofence radius must be a non-negative number"
        );
        anyhow::ensure!(self.clock_interval_secs > 0, "clock_interval_secs must be positive");
        anyhow::ensure!(
            self.notification_interval_secs > 0,
            "notification_interval_secs must be positive"
        );
        Ok(())
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn server_base_url(&self) -> &str {
        &self.server_base_url
    }

    pub fn geofence(&self) -> Geofence {
        self.geofence
    }

    pub fn location_provider(&self) -> LocationProviderKind {
        self.location_provider
    }

    pub fn location_high_accuracy(&self) -> bool {
        self.location_high_accuracy
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }

    pub fn location_maximum_age(&self) -> Duration {
        Duration::from_millis(self.location_maximum_age_ms)
    }

    pub fn fallback_accuracy_m(&self) -> f64 {
        self.fallback_accuracy_m
    }

    pub fn serial_device(&self) -> &str {
        &self.serial_device
    }

    pub fn serial_baud(&self) -> u32 {
        self.serial_baud
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn clock_interval(&self) -> Duration {
        Duration::from_secs(self.clock_interval_secs)
    }

    pub fn notification_interval(&self) -> Duration {
        Duration::from_secs(self.notification_interval_secs)
    }

    pub fn toast_ttl(&self) -> Duration {
        Duration::from_millis(self.toast_ttl_ms)
    }

    pub fn completion_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.completion_refresh_ms)
    }

    pub fn auto_check_in(&self) -> bool {
        self.auto_check_in
    }

    pub fn metrics_port(&self) -> u16 {
        self.metrics_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the client at a local server
    pub fn with_server_base_url(mut self, url: &str) -> Self {
        self.server_base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Builder method for tests to override the geofence
    pub fn with_geofence(mut self, geofence: Geofence) -> Self {
        self.geofence = geofence;
        self
    }

    /// Builder method for tests to start with auto check-in enabled
    pub fn with_auto_check_in(mut self, enabled: bool) -> Self {
        self.auto_check_in = enabled;
        self
    }
}
