//! Command Dispatcher
//!
//! Routes a parsed [`Command`] to its handler and turns the outcome into a
//! reply.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection
//! - `ECHO message [message ...]` - Echo each argument back
//! - `SET key value [PX milliseconds]` - Set a key, optionally with a TTL
//! - `GET key` - Get a key's value
//! - `SLAVEOF host port` / `SLAVEOF NO ONE` - Change replication role
//! - `INFO [section]` - Replication information
//!
//! Names match case-insensitively. Every handler checks its arguments before
//! touching the store or the replication state, so a rejected command
//! changes nothing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  execute()  │───>│ dispatch()  │───>│  cmd_*()    │      │
//! │  │ catch panic │    │ match name  │    │ -> Result   │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                          StorageEngine / ReplicationState   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::error::{CommandError, CommandResult};
use crate::protocol::{Command, RespValue};
use crate::replication::ReplicationState;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Executes commands against the shared store and replication state.
///
/// Cheap to clone; every connection gets its own copy.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    replication: Arc<ReplicationState>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>, replication: Arc<ReplicationState>) -> Self {
        Self {
            storage,
            replication,
        }
    }

    /// Executes a command and returns the reply to send.
    ///
    /// Handler errors become error replies here. A panic inside a handler is
    /// caught as well and answered with a generic failure, leaving the
    /// connection usable.
    pub fn execute(&self, command: &Command) -> RespValue {
        guarded(&command.name, || self.dispatch(command))
    }

    fn dispatch(&self, command: &Command) -> CommandResult {
        let args = command.args.as_slice();

        match command.name.to_ascii_lowercase().as_str() {
            "ping" => self.cmd_ping(args),
            "echo" => self.cmd_echo(args),
            "set" => self.cmd_set(args),
            "get" => self.cmd_get(args),
            "slaveof" => self.cmd_slaveof(args),
            "info" => self.cmd_info(args),
            _ => Err(CommandError::InvalidCommand),
        }
    }

    /// PING
    fn cmd_ping(&self, _args: &[Bytes]) -> CommandResult {
        Ok(RespValue::pong())
    }

    /// ECHO message [message ...]
    fn cmd_echo(&self, args: &[Bytes]) -> CommandResult {
        match args {
            [] => Err(CommandError::MissingArguments("echo")),
            [message] => Ok(RespValue::bulk_string(message.clone())),
            messages => Ok(RespValue::Sequence(
                messages.iter().cloned().map(RespValue::BulkString).collect(),
            )),
        }
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        let (key, value, options) = match args {
            [key, value, options @ ..] => (key, value, options),
            _ => return Err(CommandError::MissingArguments("set")),
        };

        let ttl = parse_set_options(options)?;

        self.storage.set(key.clone(), value.clone(), ttl);
        let offset = self.replication.record_write();
        trace!(offset = offset, ttl_ms = ?ttl.map(|t| t.as_millis()), "SET applied");

        Ok(RespValue::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        let key = args.first().ok_or(CommandError::MissingArguments("get"))?;

        Ok(match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// SLAVEOF host port | SLAVEOF NO ONE
    fn cmd_slaveof(&self, args: &[Bytes]) -> CommandResult {
        match args {
            [no, one, ..] if no.eq_ignore_ascii_case(b"no") && one.eq_ignore_ascii_case(b"one") => {
                self.replication.make_master();
                info!("Replication role changed to master");
            }
            [host, port, ..] => {
                let host = std::str::from_utf8(host).map_err(|_| CommandError::SlaveofTarget)?;
                let port = std::str::from_utf8(port)
                    .ok()
                    .and_then(|p| p.parse::<u16>().ok())
                    .ok_or(CommandError::SlaveofTarget)?;

                self.replication.make_replica(host, port);
                info!(master_host = %host, master_port = port, "Replication role changed to replica");
            }
            _ => return Err(CommandError::SlaveofTarget),
        }

        Ok(RespValue::ok())
    }

    /// INFO [section]
    fn cmd_info(&self, _args: &[Bytes]) -> CommandResult {
        Ok(RespValue::bulk_string(Bytes::from(
            self.replication.render_info(),
        )))
    }
}

/// Runs one handler and turns its error, or its panic, into a reply.
fn guarded<F>(name: &str, handler: F) -> RespValue
where
    F: FnOnce() -> CommandResult,
{
    match panic::catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            debug!(command = %name, error = %err, "Command rejected");
            err.into()
        }
        Err(_) => {
            error!(command = %name, "Command handler panicked");
            CommandError::Failed.into()
        }
    }
}

/// Parses the options after `SET key value`.
///
/// Only `PX <milliseconds>` is recognised; the keyword is case-insensitive.
fn parse_set_options(options: &[Bytes]) -> Result<Option<Duration>, CommandError> {
    match options {
        [] => Ok(None),
        [flag] if flag.eq_ignore_ascii_case(b"px") => Err(CommandError::MissingArguments("set")),
        [flag, millis] if flag.eq_ignore_ascii_case(b"px") => std::str::from_utf8(millis)
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
            .map(|ms| Some(Duration::from_millis(ms)))
            .ok_or(CommandError::InvalidExpireTime),
        _ => Err(CommandError::Syntax),
    }
}
