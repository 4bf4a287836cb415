//! Server configuration.
//!
//! Flags are parsed with `clap` into [`Cli`] and then validated into a
//! [`Config`], which is what the rest of the server reads.

use crate::replication::Role;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "tidekv")]
#[command(about = "An in-memory key-value store speaking a Redis-style protocol")]
#[command(version)]
pub struct Cli {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Start as a replica of "<host> <port>"
    #[arg(long, value_name = "HOST PORT")]
    pub replicaof: Option<String>,

    /// Periodically remove expired keys instead of waiting for a read
    #[arg(long)]
    pub active_expiry: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--replicaof expects \"<host> <port>\", got {0:?}")]
    InvalidReplicaOf(String),
}

/// Validated server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Master to report when starting as a replica
    pub replica_of: Option<(String, u16)>,
    pub active_expiry: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            replica_of: None,
            active_expiry: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parses and validates the process arguments.
    pub fn from_args() -> Result<Self, ConfigError> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let replica_of = cli
            .replicaof
            .as_deref()
            .map(parse_replica_of)
            .transpose()?;

        Ok(Self {
            host: cli.host,
            port: cli.port,
            replica_of,
            active_expiry: cli.active_expiry,
            log_level: cli.log_level,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The role the server starts in.
    pub fn initial_role(&self) -> Role {
        match &self.replica_of {
            Some((host, port)) => Role::Replica {
                host: host.clone(),
                port: *port,
            },
            None => Role::Master,
        }
    }
}

fn parse_replica_of(value: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::InvalidReplicaOf(value.to_string());

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) => {
            let port = port.parse().map_err(|_| invalid())?;
            Ok((host.to_string(), port))
        }
        _ => Err(invalid()),
    }
}
