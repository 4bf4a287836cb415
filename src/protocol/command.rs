//! Parsed client commands.

use bytes::Bytes;

/// One framed request: a command name and its ordered arguments.
///
/// The name is kept exactly as the client sent it; matching against the
/// command table is case-insensitive and happens in the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<Bytes>,
}

impl Command {
    /// Builds a command from the elements of a frame.
    ///
    /// Returns `None` for an empty frame, which carries no command name.
    pub fn from_parts(mut parts: Vec<Bytes>) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        let args = parts.split_off(1);
        let name = String::from_utf8_lossy(&parts[0]).into_owned();
        Some(Self { name, args })
    }

    /// Returns the argument at `index` as UTF-8 text, if present and valid.
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .and_then(|arg| std::str::from_utf8(arg).ok())
    }
}
