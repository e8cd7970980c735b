//! Static command table.
//!
//! The supported command set is a fixed closed list registered once at service construction.
//! Lookup is case-insensitive on the first token; each entry carries the arity rule, the
//! operation kind, the argument parser, and the command's latency histogram handle.

use std::sync::Arc;

use redgate_client::ops::{ReadRequest, WriteRequest};
use redgate_common::command::RedisCommand;
use redgate_common::metrics::LatencyHistogram;

#[path = "table/parsers.rs"]
mod parsers;
#[path = "table/registry.rs"]
mod registry;

pub use registry::CommandTable;

/// Scheduling slot of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Executed through a read-typed backend session.
    Read,
    /// Executed through a write-typed backend session.
    Write,
    /// Answered synchronously by the dispatcher, never reaches the backend.
    Echo,
}

/// Arity constraint over the full token count, command name included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandArity {
    /// Command requires exactly this many tokens.
    Exactly(usize),
    /// Command requires at least this many tokens.
    AtLeast(usize),
}

impl CommandArity {
    /// Validates one token count against this rule.
    ///
    /// # Errors
    ///
    /// Returns the user-visible message for the violated rule.
    pub fn check(&self, token_count: usize) -> Result<(), &'static str> {
        match *self {
            Self::Exactly(expected) if token_count != expected => {
                Err("Wrong number of arguments.")
            }
            Self::AtLeast(minimum) if token_count < minimum => Err("Too few arguments."),
            _ => Ok(()),
        }
    }
}

/// Pure parser filling one read payload from the token vector.
pub type ReadParser = fn(&RedisCommand) -> Result<ReadRequest, String>;

/// Pure parser filling one write payload from the token vector.
pub type WriteParser = fn(&RedisCommand) -> Result<WriteRequest, String>;

/// Kind-specific handling of one command table entry.
#[derive(Debug, Clone, Copy)]
pub enum CommandHandler {
    /// Parse into a read operation.
    Read(ReadParser),
    /// Parse into a write operation.
    Write(WriteParser),
    /// Synthesize the echo reply inline.
    Echo,
}

impl CommandHandler {
    /// Scheduling slot implied by this handler.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Read(_) => CommandKind::Read,
            Self::Write(_) => CommandKind::Write,
            Self::Echo => CommandKind::Echo,
        }
    }
}

/// Metadata and parser for one supported command.
#[derive(Debug, Clone)]
pub struct CommandInfo {
    /// Lowercase command name, also the lookup key.
    pub name: &'static str,
    /// Arity rule used for lightweight input validation.
    pub arity: CommandArity,
    /// Kind-specific parser callback.
    pub handler: CommandHandler,
    /// Latency histogram recorded when this command's response is emitted.
    pub latency: Arc<LatencyHistogram>,
}

impl CommandInfo {
    /// Scheduling slot of this command.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.handler.kind()
    }
}
