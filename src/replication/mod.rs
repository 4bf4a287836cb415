//! Replication Module
//!
//! Tracks whether this server is a master or a replica, its replication id
//! and its write offset. `SLAVEOF` changes the role and `INFO` reports it.
//! Connecting to a master and streaming data is not implemented; a replica
//! here is a role label with a target address.

pub mod state;

pub use state::{generate_replid, ReplicationState, Role};
