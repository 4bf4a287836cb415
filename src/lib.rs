//! # TideKV - An In-Memory Key-Value Store
//!
//! TideKV serves a small Redis-compatible command set (PING, ECHO, SET, GET,
//! SLAVEOF, INFO) over TCP using the multi-bulk request protocol. Keys may
//! carry a millisecond TTL, and the server tracks a master/replica role with
//! a replication id and write offset that INFO reports.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              TideKV                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌────────────────┬─────────────┐ │
//! │                     │  Request    │    │ StorageEngine  │ Replication │ │
//! │                     │  Parser     │    │ (sharded Mutex)│ State       │ │
//! │                     └─────────────┘    └────────────────┴─────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use tidekv::replication::ReplicationState;
//! use tidekv::server::Server;
//! use tidekv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let replication = Arc::new(ReplicationState::new());
//!
//!     let server = Server::bind("127.0.0.1:6379", storage, replication).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Request framing and reply encoding
//! - [`storage`]: Thread-safe storage engine with lazy TTL expiry
//! - [`replication`]: Master/replica role, replication id and offset
//! - [`commands`]: Command dispatch and handlers
//! - [`connection`]: Per-client read/execute/write loop
//! - [`server`]: Listener and accept loop
//! - [`config`]: Command-line configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod replication;
pub mod server;
pub mod storage;

pub use commands::{CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Command, ParseError, RequestParser, RespValue};
pub use replication::{ReplicationState, Role};
pub use server::Server;
pub use storage::{ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port TideKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host TideKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
