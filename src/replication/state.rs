//! Replication role bookkeeping.
//!
//! A server is either a master or a replica of some `host:port`. The role is
//! changed by `SLAVEOF` and reported by `INFO`; no data is transferred.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Length of a replication id in hex characters.
pub const REPLID_HEX_LEN: usize = 40;

/// Placeholder backlog size reported by INFO.
pub const REPL_BACKLOG_SIZE: u64 = 1024 * 1024;

/// The role this server currently plays.
///
/// The replica variant carries its master target, so a replica without a
/// target (or a master with one) cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Master,
    Replica { host: String, port: u16 },
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Replica { .. } => "replica",
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Role::Master)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Replica { host, port } => write!(f, "replica of {}:{}", host, port),
        }
    }
}

/// Replication state for one server instance.
///
/// Shared between connections through an `Arc`. The role sits behind a
/// mutex, the write offset is an atomic counter, and the replication id is
/// fixed for the lifetime of the value.
#[derive(Debug)]
pub struct ReplicationState {
    role: Mutex<Role>,
    replid: String,
    offset: AtomicU64,
}

impl Default for ReplicationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationState {
    /// Creates master-side state with a fresh replication id.
    pub fn new() -> Self {
        Self::with_role(Role::Master)
    }

    pub fn with_role(role: Role) -> Self {
        Self {
            role: Mutex::new(role),
            replid: generate_replid(),
            offset: AtomicU64::new(0),
        }
    }

    fn lock_role(&self) -> MutexGuard<'_, Role> {
        self.role.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of the current role.
    pub fn role(&self) -> Role {
        self.lock_role().clone()
    }

    /// Points this server at a master. Only local state changes.
    pub fn make_replica(&self, host: impl Into<String>, port: u16) {
        *self.lock_role() = Role::Replica {
            host: host.into(),
            port,
        };
    }

    /// Reverts to master and forgets the master target.
    pub fn make_master(&self) {
        *self.lock_role() = Role::Master;
    }

    pub fn replid(&self) -> &str {
        &self.replid
    }

    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    /// Counts one applied write and returns the new offset.
    pub fn record_write(&self) -> u64 {
        self.offset.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Renders the replication section reported by INFO.
    ///
    /// The role lock is held while rendering so the role line and the
    /// master-only fields always agree.
    pub fn render_info(&self) -> String {
        let role = self.lock_role();

        let mut lines = vec![format!("role:{}", role.name())];
        if role.is_master() {
            lines.push("connected_slaves:0".to_string());
            lines.push(format!("master_replid:{}", self.replid));
            lines.push(format!("master_repl_offset:{}", self.offset()));
            lines.push("second_repl_offset:-1".to_string());
            lines.push("repl_backlog_active:0".to_string());
            lines.push(format!("repl_backlog_size:{}", REPL_BACKLOG_SIZE));
            lines.push("repl_backlog_first_byte_offset:0".to_string());
            lines.push("repl_backlog_histlen:0".to_string());
        }

        let mut info = lines.join("\r\n");
        info.push_str("\r\n");
        info
    }
}

/// Generates a random 40-character hex replication id from the OS RNG.
pub fn generate_replid() -> String {
    let mut raw = [0u8; REPLID_HEX_LEN / 2];
    OsRng.fill_bytes(&mut raw);
    raw.iter().map(|byte| format!("{:02x}", byte)).collect()
}
