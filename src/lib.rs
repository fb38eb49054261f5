//! mqtt-sn-gatewayd - MQTT-SN v1.2 gateway
//!
//! Terminates UDP-borne MQTT-SN traffic from sensor/constrained clients and
//! speaks the gateway-side state machine described in the OMA MQTT-SN v1.2
//! specification: topic registration, QoS 0-2 (plus connection-less QoS -1),
//! retained messages, sleeping/awake clients and the Will flow.

pub mod client;
pub mod clock;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod ids;
pub mod message;
pub mod metrics;
pub mod publisher;
pub mod registration;
pub mod request;
pub mod retain;
pub mod subscriber;
pub mod topic;
pub mod transport;

pub use config::Config;
pub use error::{ConfigError, Trap, TransportError};
pub use gateway::{run, GatewayCore, GatewayState};
