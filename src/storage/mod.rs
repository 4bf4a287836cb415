//! Storage Engine Module
//!
//! A sharded, thread-safe key-value store with lazy TTL expiry, plus an
//! optional background sweeper for keys that are never read again.
//!
//! ## Example
//!
//! ```
//! use tidekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"), None);
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
//!
//! engine.set(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Some(Duration::from_secs(3600)),
//! );
//! assert!(engine.get_entry(b"session").unwrap().ttl().is_some());
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine, StorageStats};
pub use expiry::{ExpiryConfig, ExpirySweeper};
