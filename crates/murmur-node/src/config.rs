//! Node configuration.
//!
//! Every setting is a command-line flag with an environment fallback, so the
//! node can be configured the same way in a container or a terminal.

use clap::{Parser, ValueEnum};
use murmur_realtime::connection::DEFAULT_MAX_FRAME_SIZE;
use murmur_realtime::hub::DEFAULT_OUTBOUND_CAPACITY;
use murmur_realtime::{ConnectionConfig, HubConfig};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::observability::LogFormat;

/// Murmur Node - real-time messaging backend
#[derive(Parser, Debug, Clone)]
#[command(name = "murmur-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind the HTTP server to
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Message store backend
    #[arg(
        long = "storage",
        env = "STORAGE_TYPE",
        value_enum,
        default_value_t = StorageKind::Memory
    )]
    pub storage: StorageKind,

    /// Full PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// PostgreSQL host, used when no URL is given
    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,

    /// PostgreSQL port
    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    /// PostgreSQL user
    #[arg(long, env = "DB_USERNAME")]
    pub db_username: Option<String>,

    /// PostgreSQL password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// PostgreSQL database name
    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (pretty, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Capacity of each connection's outbound queue
    #[arg(long, env = "OUTBOUND_CAPACITY", default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,

    /// Largest inbound frame in bytes
    #[arg(long, env = "MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,

    /// Seconds to wait for a pong before dropping a connection
    #[arg(
        long,
        env = "PONG_WAIT_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub pong_wait_secs: u64,
}

/// Message store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// Process memory, lost on restart.
    Memory,
    /// PostgreSQL.
    Postgres,
}

/// Resolved store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    Postgres { url: String },
}

/// Configuration errors detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "postgres storage needs DATABASE_URL, or DB_HOST, DB_USERNAME, DB_PASSWORD and DB_NAME \
         together (missing: {})",
        .missing.join(", ")
    )]
    MissingDatabase { missing: Vec<&'static str> },
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Validated node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen_addr: SocketAddr,
    pub storage: StorageConfig,
    pub hub: HubConfig,
    pub connection: ConnectionConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl NodeConfig {
    /// Resolves parsed arguments into a node configuration.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        if args.outbound_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "outbound-capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if args.max_frame_size == 0 {
            return Err(ConfigError::Invalid {
                name: "max-frame-size",
                reason: "must be at least 1".to_string(),
            });
        }

        let storage = match args.storage {
            StorageKind::Memory => StorageConfig::Memory,
            StorageKind::Postgres => StorageConfig::Postgres {
                url: database_url(args)?,
            },
        };

        let mut connection =
            ConnectionConfig::with_pong_wait(Duration::from_secs(args.pong_wait_secs));
        connection.max_frame_size = args.max_frame_size;

        Ok(Self {
            listen_addr: SocketAddr::new(args.host, args.port),
            storage,
            hub: HubConfig {
                outbound_capacity: args.outbound_capacity,
                ..HubConfig::default()
            },
            connection,
            log_level: args.log_level.clone(),
            log_format: LogFormat::parse(&args.log_format),
        })
    }
}

/// Picks the explicit URL, or assembles one from the individual settings.
fn database_url(args: &Args) -> Result<String, ConfigError> {
    if let Some(url) = args.database_url.as_ref().filter(|u| !u.is_empty()) {
        return Ok(url.clone());
    }

    let settings = [
        ("DB_HOST", &args.db_host),
        ("DB_USERNAME", &args.db_username),
        ("DB_PASSWORD", &args.db_password),
        ("DB_NAME", &args.db_name),
    ];
    let missing: Vec<&'static str> = settings
        .iter()
        .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::MissingDatabase { missing });
    }

    Ok(format!(
        "postgres://{user}:{password}@{host}:{port}/{name}?sslmode=require",
        user = args.db_username.as_deref().unwrap_or_default(),
        password = args.db_password.as_deref().unwrap_or_default(),
        host = args.db_host.as_deref().unwrap_or_default(),
        port = args.db_port,
        name = args.db_name.as_deref().unwrap_or_default(),
    ))
}
