//! Command Module
//!
//! Receives parsed commands, runs them against the storage engine and the
//! replication state, and returns the reply.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Request Parser  │  (protocol module)
//! └────────┬────────┘
//!          │ Command
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐   ┌──────────────────┐
//! │ StorageEngine   │   │ ReplicationState │
//! └─────────────────┘   └──────────────────┘
//! ```

pub mod error;
pub mod handler;

pub use error::{CommandError, CommandResult};
pub use handler::CommandHandler;
