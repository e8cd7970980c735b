//! Command model for the front-end: the static command table and the per-command
//! argument parsers that populate backend op payloads.

pub mod table;

pub use table::{CommandArity, CommandHandler, CommandInfo, CommandKind, CommandTable};
