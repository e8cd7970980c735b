//! Runtime configuration shared by service bootstrap code.

/// Keyspace holding the backend table that stores all Redis data.
pub const REDIS_KEYSPACE_NAME: &str = "system_redis";

/// Name of the backend table that stores all Redis data.
pub const REDIS_TABLE_NAME: &str = ".redis";

/// Co-located storage server the backend client may short-circuit RPCs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalServerProxy {
    /// Permanent UUID of the local storage server.
    pub uuid: String,
    /// Proxy address of the local storage server.
    pub addr: String,
}

/// Bootstrap configuration used by `redgate-server` when the first batch arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Master server addresses handed to the backend client builder.
    pub master_addresses: String,
    /// Timeout in milliseconds for backend session flushes.
    pub client_timeout_millis: u64,
    /// Default RPC timeout in milliseconds used while bootstrapping the backend client.
    pub init_rpc_timeout_millis: u64,
    /// Enables per-key conflict detection inside one pipelined batch.
    ///
    /// When disabled, read and write blocks always run in parallel. This trades pipeline-level
    /// write-then-read consistency for throughput.
    pub safe_batch: bool,
    /// Optional co-located storage server to register a proxy shortcut for.
    pub local_proxy: Option<LocalServerProxy>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            master_addresses: "127.0.0.1:7100".to_owned(),
            client_timeout_millis: 60_000,
            init_rpc_timeout_millis: 5_000,
            safe_batch: true,
            local_proxy: None,
        }
    }
}
