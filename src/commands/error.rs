//! Command errors.
//!
//! Handlers return `Result<RespValue, CommandError>`. The `Display` text of
//! each variant is exactly the message sent to the client after the `-`.

use crate::protocol::RespValue;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The frame carried no usable command
    #[error("Error: incomplete command")]
    IncompleteCommand,

    /// The command name is not one we serve
    #[error("Error: Invalid command")]
    InvalidCommand,

    /// A required argument is missing; holds the lower-case command name
    #[error("Error: incomplete {0} command")]
    MissingArguments(&'static str),

    #[error("Error: SLAVEOF requires a host and port")]
    SlaveofTarget,

    /// `PX` was given something other than a non-negative integer
    #[error("Error: invalid expire time")]
    InvalidExpireTime,

    #[error("Error: syntax error")]
    Syntax,

    /// The handler panicked
    #[error("Error: command failed")]
    Failed,
}

pub type CommandResult = Result<RespValue, CommandError>;

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(err.to_string())
    }
}
