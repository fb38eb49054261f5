//! mqtt-sn-gatewayd - MQTT-SN v1.2 gateway
//!
//! Usage:
//!   mqtt-sn-gatewayd [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>   Configuration file path
//!   -b, --bind <ADDR>     UDP bind address (default: 0.0.0.0:10000)
//!   --gateway-id <N>      Gateway id advertised in ADVERTISE/GWINFO
//!   -l, --log-level       Log level (error, warn, info, debug, trace)
//!   -h, --help            Print help

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mqtt_sn_gateway::clock::{MonotonicTimerService, SystemClock};
use mqtt_sn_gateway::config::Config;
use mqtt_sn_gateway::transport::{CorruptingTransport, UdpTransport};
use mqtt_sn_gateway::{gateway, GatewayCore};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// MQTT-SN v1.2 gateway
#[derive(Parser, Debug)]
#[command(name = "mqtt-sn-gatewayd")]
#[command(author = "VibeMQ Contributors")]
#[command(version = "0.1.0")]
#[command(about = "MQTT-SN v1.2 gateway (aggregating/stand-alone server role) over UDP")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Broadcast address used for ADVERTISE/GWINFO
    #[arg(long)]
    broadcast_address: Option<SocketAddr>,

    /// Gateway id advertised in ADVERTISE/GWINFO
    #[arg(long)]
    gateway_id: Option<u8>,

    /// Maximum concurrent clients
    #[arg(long)]
    maximum_clients: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut file_config = if let Some(config_path) = &args.config {
        match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error loading config file: {e}");
                std::process::exit(1);
            }
        }
    } else {
        Config::from_env().unwrap_or_default()
    };

    // CLI args override file config
    if let Some(bind) = args.bind {
        file_config.server.bind = bind;
    }
    if let Some(broadcast) = args.broadcast_address {
        file_config.server.broadcast_address = broadcast;
    }
    if let Some(gateway_id) = args.gateway_id {
        file_config.server.gateway_id = gateway_id;
    }
    if let Some(maximum_clients) = args.maximum_clients {
        file_config.limits.maximum_clients = maximum_clients;
    }

    // Setup logging - CLI overrides config, config overrides default (warn)
    let log_level = args.log_level.unwrap_or_else(|| {
        match file_config.log.level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(config_path) = &args.config {
        info!("loaded configuration from {config_path:?}");
    }

    if let Err(e) = file_config.validate() {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    }

    info!(
        bind = %file_config.server.bind,
        broadcast_address = %file_config.server.broadcast_address,
        gateway_id = file_config.server.gateway_id,
        maximum_clients = file_config.limits.maximum_clients,
        "starting mqtt-sn gateway"
    );

    let transport = UdpTransport::bind(file_config.server.bind).await?;
    let clock = SystemClock;
    let timers = MonotonicTimerService::new();
    let core = GatewayCore::new(file_config.clone());

    if file_config.server.packet_ber > 0.0 {
        info!(ber = file_config.server.packet_ber, "packet corruption injection enabled");
        let transport = CorruptingTransport::new(transport, file_config.server.packet_ber);
        gateway::run(core, clock, timers, transport).await;
    } else {
        gateway::run(core, clock, timers, transport).await;
    }

    Ok(())
}
