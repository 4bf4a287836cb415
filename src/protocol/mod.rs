//! Wire Protocol
//!
//! Requests come in as length-prefixed multi-bulk frames and replies go out
//! as simple strings, bulk strings, null bulk strings or errors.
//!
//! ## Modules
//!
//! - `command`: The parsed `Command` (name plus arguments)
//! - `parser`: Incremental request framer
//! - `types`: The `RespValue` reply type and its serialization
//!
//! ## Example
//!
//! ```
//! use tidekv::protocol::{parse_command, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (command, consumed) = parse_command(data).unwrap().unwrap();
//! assert_eq!(command.name, "GET");
//! assert_eq!(consumed, data.len());
//!
//! let response = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(response.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::Command;
pub use parser::{parse_command, ParseError, ParseResult, RequestParser};
pub use types::RespValue;
