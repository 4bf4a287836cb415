//! Connection Module
//!
//! Manages individual client connections. Each accepted socket is handled by
//! its own Tokio task, so one slow or broken client never blocks another.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener (server.rs)                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() + spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Parse frame │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               ▼             │
//! │                                       ┌─────────────┐       │
//! │                                       │ Send reply  │       │
//! │                                       └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
