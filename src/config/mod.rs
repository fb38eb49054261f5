//! Configuration module.
//!
//! TOML-based configuration, grounded in
//! `examples/vibesrc-vibemq/src/config/mod.rs`'s layering: defaults, then a
//! TOML file with `${VAR}`/`${VAR:-default}` substitution, then
//! `MQTTSN_GW__SECTION__KEY` environment overrides.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

#[cfg(test)]
mod tests;

/// Substitute `${VAR}`/`${VAR:-default}` occurrences in `content`.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Root configuration (spec §6 "Configuration inputs", plus the ambient
/// fields a runnable binary needs: bind address, logging, gateway id).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub server: ServerConfig,
    pub timers: TimerConfig,
    pub retransmission: RetransmissionConfig,
    pub limits: LimitsConfig,
    pub topics: TopicsConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Socket/identity configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_broadcast")]
    pub broadcast_address: SocketAddr,
    #[serde(default = "default_dest_port")]
    pub dest_port: u16,
    #[serde(default = "default_gateway_id")]
    pub gateway_id: u8,
    /// Bit-error-rate for the `CorruptingTransport` decorator (spec §6
    /// `packetBER`); `0.0` disables corruption injection.
    #[serde(default)]
    pub packet_ber: f64,
}

fn default_bind() -> SocketAddr {
    "0.0.0.0:10000".parse().unwrap()
}

fn default_broadcast() -> SocketAddr {
    "255.255.255.255:10000".parse().unwrap()
}

fn default_dest_port() -> u16 {
    10000
}

fn default_gateway_id() -> u8 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            broadcast_address: default_broadcast(),
            dest_port: default_dest_port(),
            gateway_id: default_gateway_id(),
            packet_ber: 0.0,
        }
    }
}

/// All of spec §6's interval configuration inputs, in seconds on disk,
/// exposed as `Duration` to callers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    #[serde(default = "default_advertise_interval", with = "secs")]
    pub advertise_interval: Duration,
    #[serde(default = "default_offline_state_interval", with = "secs")]
    pub offline_state_interval: Duration,
    #[serde(default = "default_online_state_interval", with = "secs")]
    pub online_state_interval: Duration,
    #[serde(default = "default_active_clients_check_interval", with = "secs")]
    pub active_clients_check_interval: Duration,
    #[serde(default = "default_asleep_clients_check_interval", with = "secs")]
    pub asleep_clients_check_interval: Duration,
    #[serde(default = "default_pending_retain_check_interval", with = "secs")]
    pub pending_retain_check_interval: Duration,
    #[serde(default = "default_requests_check_interval", with = "secs")]
    pub requests_check_interval: Duration,
    #[serde(default = "default_registrations_check_interval", with = "secs")]
    pub registrations_check_interval: Duration,
    #[serde(default = "default_awaken_subscriber_check_interval", with = "secs")]
    pub awaken_subscriber_check_interval: Duration,
    #[serde(default = "default_messages_clear_interval", with = "secs")]
    pub messages_clear_interval: Duration,
}

mod secs {
    use std::time::Duration;

    pub fn serialize<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }

    use serde::Deserialize;
}

fn default_advertise_interval() -> Duration {
    Duration::from_secs(15)
}
fn default_offline_state_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_online_state_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_active_clients_check_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_asleep_clients_check_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_pending_retain_check_interval() -> Duration {
    Duration::from_secs(2)
}
fn default_requests_check_interval() -> Duration {
    Duration::from_secs(2)
}
fn default_registrations_check_interval() -> Duration {
    Duration::from_secs(2)
}
fn default_awaken_subscriber_check_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_messages_clear_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            advertise_interval: default_advertise_interval(),
            offline_state_interval: default_offline_state_interval(),
            online_state_interval: default_online_state_interval(),
            active_clients_check_interval: default_active_clients_check_interval(),
            asleep_clients_check_interval: default_asleep_clients_check_interval(),
            pending_retain_check_interval: default_pending_retain_check_interval(),
            requests_check_interval: default_requests_check_interval(),
            registrations_check_interval: default_registrations_check_interval(),
            awaken_subscriber_check_interval: default_awaken_subscriber_check_interval(),
            messages_clear_interval: default_messages_clear_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetransmissionConfig {
    #[serde(default = "default_retransmission_interval", with = "secs")]
    pub interval: Duration,
    #[serde(default = "default_retransmission_limit")]
    pub limit: u32,
}

fn default_retransmission_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_retransmission_limit() -> u32 {
    3
}

impl Default for RetransmissionConfig {
    fn default() -> Self {
        Self {
            interval: default_retransmission_interval(),
            limit: default_retransmission_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    #[serde(default = "default_maximum_clients")]
    pub maximum_clients: usize,
}

fn default_maximum_clients() -> usize {
    10_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            maximum_clients: default_maximum_clients(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TopicsConfig {
    /// `predefinedTopics: map<name,u16>` (spec §6).
    pub predefined: HashMap<String, u16>,
}

impl Config {
    /// Load from a TOML file, layering defaults → file (with `${VAR}`
    /// substitution) → `MQTTSN_GW__SECTION__KEY` environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("server.dest_port", 10000)?
            .set_default("server.gateway_id", 1)?
            .set_default("limits.maximum_clients", 10_000)?
            .set_default("retransmission.limit", 3)?;

        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ConfigError::Io(e)),
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("MQTTSN_GW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.maximum_clients == 0 {
            return Err(ConfigError::Validation(
                "limits.maximum_clients must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.server.packet_ber) {
            return Err(ConfigError::Validation(
                "server.packet_ber must be between 0.0 and 1.0".to_string(),
            ));
        }
        for (name, &id) in &self.topics.predefined {
            if id == 0 {
                return Err(ConfigError::Validation(format!(
                    "predefined topic '{name}' cannot use reserved id 0"
                )));
            }
        }
        Ok(())
    }
}
