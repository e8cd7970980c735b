//! Backend client handle and bootstrap builder.

use std::sync::Arc;

use redgate_common::error::{RgError, RgResult};

use crate::memory::MemoryBackend;
use crate::session::Session;

/// Resolved handle to one backend table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    /// Keyspace the table lives in.
    pub keyspace: String,
    /// Table name inside the keyspace.
    pub name: String,
}

/// Shared, read-only-after-bootstrap handle to the backend storage engine.
pub trait BackendClient: Send + Sync {
    /// Allocates a session typed for reads (`true`) or writes (`false`).
    fn new_session(&self, read: bool) -> Arc<dyn Session>;

    /// Resolves the target storage table.
    ///
    /// # Errors
    ///
    /// Returns an error when the table does not exist or cannot be reached.
    fn open_table(&self, keyspace: &str, name: &str) -> RgResult<TableHandle>;

    /// Registers a proxy shortcut for a co-located storage server, so RPCs targeting it skip
    /// the network stack.
    fn add_tablet_server_proxy(&self, uuid: &str, proxy_addr: &str);
}

/// Builder mirroring the backend library's client bootstrap surface.
///
/// The only client implementation shipped in this workspace is the in-process
/// [`MemoryBackend`]; an RPC-backed implementation would plug in behind the same trait.
#[derive(Debug, Clone)]
pub struct BackendClientBuilder {
    client_name: String,
    default_rpc_timeout_millis: u64,
    master_addresses: Vec<String>,
}

impl Default for BackendClientBuilder {
    fn default() -> Self {
        Self {
            client_name: "redgate_client".to_owned(),
            default_rpc_timeout_millis: 5_000,
            master_addresses: Vec::new(),
        }
    }
}

impl BackendClientBuilder {
    /// Creates a builder with default bootstrap settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client name reported to the backend for diagnostics.
    #[must_use]
    pub fn client_name(mut self, name: &str) -> Self {
        self.client_name = name.to_owned();
        self
    }

    /// Sets the default RPC timeout used during bootstrap calls.
    #[must_use]
    pub fn default_rpc_timeout_millis(mut self, millis: u64) -> Self {
        self.default_rpc_timeout_millis = millis;
        self
    }

    /// Adds a comma-separated list of master server addresses.
    #[must_use]
    pub fn add_master_addresses(mut self, addresses: &str) -> Self {
        self.master_addresses.extend(
            addresses
                .split(',')
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .map(str::to_owned),
        );
        self
    }

    /// Builds the backend client handle.
    ///
    /// # Errors
    ///
    /// Returns an error when no master address was configured.
    pub fn build(self) -> RgResult<Arc<dyn BackendClient>> {
        if self.master_addresses.is_empty() {
            return Err(RgError::InvalidConfig(
                "backend client needs at least one master address",
            ));
        }
        Ok(MemoryBackend::new())
    }
}
