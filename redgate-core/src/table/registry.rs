use redgate_common::containers::HotMap;
use redgate_common::metrics::MetricsRegistry;

use super::parsers;
use super::{CommandArity, CommandHandler, CommandInfo};

/// Runtime command table keyed by lowercase command name.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: HotMap<String, CommandInfo>,
}

impl CommandTable {
    /// Builds an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HotMap::new(),
        }
    }

    /// Builds the table preloaded with the full supported command set, registering one latency
    /// histogram per command.
    #[must_use]
    pub fn with_supported_commands(metrics: &MetricsRegistry) -> Self {
        let mut table = Self::new();
        table.register_read_commands(metrics);
        table.register_write_commands(metrics);
        table.register_echo_command(metrics);
        table
    }

    fn register_read_commands(&mut self, metrics: &MetricsRegistry) {
        self.register(metrics, "get", CommandArity::Exactly(2), CommandHandler::Read(parsers::parse_get));
        self.register(metrics, "mget", CommandArity::AtLeast(2), CommandHandler::Read(parsers::parse_mget));
        self.register(metrics, "hget", CommandArity::Exactly(3), CommandHandler::Read(parsers::parse_hget));
        self.register(metrics, "hmget", CommandArity::AtLeast(3), CommandHandler::Read(parsers::parse_hmget));
        self.register(metrics, "hgetall", CommandArity::Exactly(2), CommandHandler::Read(parsers::parse_hgetall));
        self.register(metrics, "smembers", CommandArity::Exactly(2), CommandHandler::Read(parsers::parse_smembers));
        self.register(metrics, "strlen", CommandArity::Exactly(2), CommandHandler::Read(parsers::parse_strlen));
        self.register(metrics, "exists", CommandArity::Exactly(2), CommandHandler::Read(parsers::parse_exists));
        self.register(metrics, "getrange", CommandArity::Exactly(4), CommandHandler::Read(parsers::parse_getrange));
    }

    fn register_write_commands(&mut self, metrics: &MetricsRegistry) {
        self.register(metrics, "set", CommandArity::AtLeast(3), CommandHandler::Write(parsers::parse_set));
        self.register(metrics, "mset", CommandArity::AtLeast(3), CommandHandler::Write(parsers::parse_mset));
        self.register(metrics, "hset", CommandArity::Exactly(4), CommandHandler::Write(parsers::parse_hset));
        self.register(metrics, "hmset", CommandArity::AtLeast(4), CommandHandler::Write(parsers::parse_hmset));
        self.register(metrics, "hdel", CommandArity::AtLeast(3), CommandHandler::Write(parsers::parse_hdel));
        self.register(metrics, "sadd", CommandArity::AtLeast(3), CommandHandler::Write(parsers::parse_sadd));
        self.register(metrics, "srem", CommandArity::AtLeast(3), CommandHandler::Write(parsers::parse_srem));
        self.register(metrics, "getset", CommandArity::Exactly(3), CommandHandler::Write(parsers::parse_getset));
        self.register(metrics, "append", CommandArity::Exactly(3), CommandHandler::Write(parsers::parse_append));
        self.register(metrics, "del", CommandArity::Exactly(2), CommandHandler::Write(parsers::parse_del));
        self.register(metrics, "setrange", CommandArity::Exactly(4), CommandHandler::Write(parsers::parse_setrange));
        self.register(metrics, "incr", CommandArity::Exactly(2), CommandHandler::Write(parsers::parse_incr));
    }

    fn register_echo_command(&mut self, metrics: &MetricsRegistry) {
        self.register(metrics, "echo", CommandArity::Exactly(2), CommandHandler::Echo);
    }

    fn register(
        &mut self,
        metrics: &MetricsRegistry,
        name: &'static str,
        arity: CommandArity,
        handler: CommandHandler,
    ) {
        let latency =
            metrics.latency_histogram(&format!("redgate.service.handler_latency.{name}"));
        let _ = self.entries.insert(
            name.to_owned(),
            CommandInfo {
                name,
                arity,
                handler,
                latency,
            },
        );
    }

    /// Resolves one entry by its lowercased name.
    #[must_use]
    pub fn lookup(&self, name_lowercase: &str) -> Option<&CommandInfo> {
        self.entries.get(name_lowercase)
    }

    /// Number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the table carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
