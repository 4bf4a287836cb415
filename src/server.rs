//! Connection Dispatcher
//!
//! Accepts sockets and spawns one [`handle_connection`] task per client.
//! Every task shares the same storage engine, replication state and
//! connection counters. A failed `accept` is logged and the loop carries on.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::replication::ReplicationState;
use crate::storage::StorageEngine;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info};

pub struct Server {
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    replication: Arc<ReplicationState>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds a listener and wraps it around the given shared state.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        storage: Arc<StorageEngine>,
        replication: Arc<ReplicationState>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            storage,
            replication,
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn storage(&self) -> Arc<StorageEngine> {
        Arc::clone(&self.storage)
    }

    pub fn replication(&self) -> Arc<ReplicationState> {
        Arc::clone(&self.replication)
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Accepts connections forever.
    pub async fn run(self) {
        info!(
            addr = %self.listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            role = %self.replication.role(),
            "Accepting connections"
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let handler =
                        CommandHandler::new(Arc::clone(&self.storage), Arc::clone(&self.replication));
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(handle_connection(stream, addr, handler, stats));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
