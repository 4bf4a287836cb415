//! Connection Handler
//!
//! Each client gets its own task running a read-parse-execute-respond loop.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, ConnectionHandler spawned
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │  Parse every complete frame  │
//!    │  already buffered, execute   │
//!    │  it and write the reply      │
//!    │              │               │
//!    │              ▼               │
//!    │  Read more bytes from socket │
//!    │              │               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. Client disconnects / I/O error, task ends
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. A frame that arrives in pieces
//! waits in the buffer until it is complete; several frames in one read are
//! answered in order. A frame that cannot be parsed is answered with an
//! error reply and the connection stays open. An empty frame (`*0`) is
//! stepped over so commands pipelined behind it still run; any other
//! malformed frame leaves no usable boundary and the buffered bytes are
//! dropped. Blank lines between commands are ignored.
//!
//! Commands run synchronously between reads and writes, so any store lock
//! a command takes is released before its reply is written.

use crate::commands::{CommandError, CommandHandler};
use crate::protocol::parser::{blank_prefix_len, MAX_BULK_SIZE};
use crate::protocol::{RequestParser, RespValue};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer: one largest bulk value plus headroom
/// for the rest of its frame
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Frames rejected by the parser
    pub protocol_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Drives one client connection.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes received but not yet parsed
    buffer: BytesMut,

    /// Encoded replies waiting to be flushed
    out: BytesMut,

    command_handler: CommandHandler,

    parser: RequestParser,

    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            out: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RequestParser::new(),
            stats,
        }
    }

    /// Runs the connection until the client leaves or an I/O error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(
                client = %self.addr,
                commands = self.parser.frames(),
                "Client disconnected"
            ),
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(response) = self.next_response() {
                response.encode(&mut self.out);
            }
            self.flush_responses().await?;

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Takes the next buffered frame, if complete, and produces its reply.
    fn next_response(&mut self) -> Option<RespValue> {
        let blank = blank_prefix_len(&self.buffer);
        if blank > 0 {
            let _ = self.buffer.split_to(blank);
        }

        if self.buffer.is_empty() {
            return None;
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((command, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    command = %command.name,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );

                let response = self.command_handler.execute(&command);
                self.stats.command_processed();
                Some(response)
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                None
            }
            Err(e) => {
                match e.frame_len() {
                    Some(len) => {
                        debug!(client = %self.addr, error = %e, "Skipping empty frame");
                        let _ = self.buffer.split_to(len);
                    }
                    None => {
                        warn!(client = %self.addr, error = %e, "Malformed request, discarding buffer");
                        self.buffer.clear();
                    }
                }
                self.stats.protocol_error();
                Some(CommandError::IncompleteCommand.into())
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    ///
    /// Returns `false` when the client closed the connection cleanly.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Ok(false)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Writes every reply produced since the last flush.
    async fn flush_responses(&mut self) -> Result<(), ConnectionError> {
        if self.out.is_empty() {
            return Ok(());
        }

        let pending = self.out.split();
        self.stream.write_all(&pending).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(pending.len());
        trace!(client = %self.addr, bytes = pending.len(), "Sent responses");
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client closed the socket in the middle of a frame
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Runs a connection to completion, logging how it ended.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::ReplicationState;
    use crate::storage::StorageEngine;
    use tokio_test::io::Builder;

    fn command_handler() -> CommandHandler {
        CommandHandler::new(
            Arc::new(StorageEngine::new()),
            Arc::new(ReplicationState::new()),
        )
    }

    fn client_addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let stream = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();
        let stats = Arc::new(ConnectionStats::new());

        let result = ConnectionHandler::new(stream, client_addr(), command_handler(), Arc::clone(&stats))
            .run()
            .await;

        assert!(result.is_ok());
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let stream = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$4\r\nna")
            .read(b"me\r\n$4\r\nAr")
            .read(b"iz\r\n")
            .write(b"+OK\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .write(b"$4\r\nAriz\r\n")
            .build();

        let result = ConnectionHandler::new(
            stream,
            client_addr(),
            command_handler(),
            Arc::new(ConnectionStats::new()),
        )
        .run()
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_pipelined_commands_answered_in_order() {
        let stream = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*1\r\n$4\r\nPING\r\n")
            .write(b"+OK\r\n")
            .write(b"$2\r\nv1\r\n")
            .write(b"+PONG\r\n")
            .build();

        let result = ConnectionHandler::new(
            stream,
            client_addr(),
            command_handler(),
            Arc::new(ConnectionStats::new()),
        )
        .run()
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_open() {
        let stream = Builder::new()
            .read(b"*0\r\n")
            .write(b"-Error: incomplete command\r\n")
            .read(b"*1\r\n:12\r\n")
            .write(b"-Error: incomplete command\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();
        let stats = Arc::new(ConnectionStats::new());

        let result = ConnectionHandler::new(stream, client_addr(), command_handler(), Arc::clone(&stats))
            .run()
            .await;

        assert!(result.is_ok());
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 2);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_empty_frame_does_not_swallow_pipelined_commands() {
        let storage = Arc::new(StorageEngine::new());
        let handler = CommandHandler::new(Arc::clone(&storage), Arc::new(ReplicationState::new()));
        let stream = Builder::new()
            .read(b"*0\r\n*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*-1\r\n*1\r\n$4\r\nPING\r\n")
            .write(b"-Error: incomplete command\r\n+OK\r\n-Error: incomplete command\r\n+PONG\r\n")
            .build();
        let stats = Arc::new(ConnectionStats::new());

        let result = ConnectionHandler::new(stream, client_addr(), handler, Arc::clone(&stats))
            .run()
            .await;

        assert!(result.is_ok());
        assert_eq!(storage.get(b"k"), Some(bytes::Bytes::from("v")));
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 2);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_blank_lines_get_no_reply() {
        let stream = Builder::new()
            .read(b"PING\r\n\r\nPING\r\n\r\n")
            .write(b"+PONG\r\n+PONG\r\n")
            .build();

        let result = ConnectionHandler::new(
            stream,
            client_addr(),
            command_handler(),
            Arc::new(ConnectionStats::new()),
        )
        .run()
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_oversized_bulk_rejected_before_buffering() {
        let header = format!("*3\r\n$3\r\nSET\r\n$1\r\nk\r\n${}\r\n", MAX_BULK_SIZE + 1);
        let stream = Builder::new()
            .read(header.as_bytes())
            .write(b"-Error: incomplete command\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let result = ConnectionHandler::new(
            stream,
            client_addr(),
            command_handler(),
            Arc::new(ConnectionStats::new()),
        )
        .run()
        .await;

        assert!(result.is_ok());
    }

    #[test]
    fn test_buffer_limit_fits_largest_bulk() {
        let framed = MAX_BULK_SIZE + format!("${}\r\n\r\n", MAX_BULK_SIZE).len();
        assert!(MAX_BUFFER_SIZE > framed);
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_an_error() {
        let stream = Builder::new().read(b"*2\r\n$3\r\nGET\r\n").build();

        let result = ConnectionHandler::new(
            stream,
            client_addr(),
            command_handler(),
            Arc::new(ConnectionStats::new()),
        )
        .run()
        .await;

        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_read_error_ends_connection() {
        let stream = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let stats = Arc::new(ConnectionStats::new());

        let result = ConnectionHandler::new(stream, client_addr(), command_handler(), Arc::clone(&stats))
            .run()
            .await;

        assert!(matches!(result, Err(ConnectionError::Io(_))));
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
