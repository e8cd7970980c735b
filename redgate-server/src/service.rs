//! Batch dispatcher: command validation, parsing, and scheduler hand-off.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use redgate_batch::context::BatchContext;
use redgate_batch::sink::ResponseSink;
use redgate_client::client::{BackendClient, BackendClientBuilder, TableHandle};
use redgate_client::ops::BackendOp;
use redgate_common::command::RedisCommand;
use redgate_common::config::{REDIS_KEYSPACE_NAME, REDIS_TABLE_NAME, ServiceConfig};
use redgate_common::error::{RgError, RgResult};
use redgate_common::metrics::{LatencyHistogram, MetricsRegistry};
use redgate_common::response::RedisResponse;
use redgate_core::table::{CommandHandler, CommandInfo, CommandTable};

use crate::call::InboundCall;

/// Redis-protocol service front-end over the backend key-value client.
///
/// One instance serves all inbound calls. The backend client is created lazily on the first
/// batch and shared read-only afterwards.
pub struct RedisService {
    config: ServiceConfig,
    metrics: MetricsRegistry,
    table: CommandTable,
    latency_error: Arc<LatencyHistogram>,
    latency_get_internal: Arc<LatencyHistogram>,
    latency_set_internal: Arc<LatencyHistogram>,
    preset_client: Option<Arc<dyn BackendClient>>,
    client_initialized: AtomicBool,
    client: Mutex<Option<Arc<dyn BackendClient>>>,
    table_handle: Mutex<Option<TableHandle>>,
}

impl std::fmt::Debug for RedisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisService")
            .field("config", &self.config)
            .field("commands", &self.table.len())
            .field(
                "client_initialized",
                &self.client_initialized.load(Ordering::Acquire),
            )
            .finish()
    }
}

impl RedisService {
    /// Creates the service; the backend client is bootstrapped on the first call.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_client_source(config, None)
    }

    /// Creates the service around an already-built backend client.
    ///
    /// Table resolution and proxy registration still run lazily on the first call.
    #[must_use]
    pub fn with_backend(config: ServiceConfig, client: Arc<dyn BackendClient>) -> Self {
        Self::with_client_source(config, Some(client))
    }

    fn with_client_source(
        config: ServiceConfig,
        preset_client: Option<Arc<dyn BackendClient>>,
    ) -> Self {
        let metrics = MetricsRegistry::new();
        let table = CommandTable::with_supported_commands(&metrics);
        let latency_error = metrics.latency_histogram("redgate.service.handler_latency.error");
        let latency_get_internal =
            metrics.latency_histogram("redgate.service.handler_latency.get_internal");
        let latency_set_internal =
            metrics.latency_histogram("redgate.service.handler_latency.set_internal");
        Self {
            config,
            metrics,
            table,
            latency_error,
            latency_get_internal,
            latency_set_internal,
            preset_client,
            client_initialized: AtomicBool::new(false),
            client: Mutex::new(None),
            table_handle: Mutex::new(None),
        }
    }

    /// Latency metrics registry of this service.
    #[must_use]
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Storage table resolved during bootstrap, once the first call initialized the client.
    #[must_use]
    pub fn table_handle(&self) -> Option<TableHandle> {
        self.table_handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Handles one inbound batch: per-command validation and parsing, scheduler placement, and
    /// the final commit. Every batch index receives exactly one response.
    pub fn handle(&self, call: &Arc<InboundCall>) {
        let client = match self.ensure_client() {
            Ok(client) => client,
            Err(error) => {
                let message = format!("Could not open {REDIS_TABLE_NAME} table. {error}");
                for index in 0..call.client_batch().len() {
                    self.respond_with_failure(call, index, &message);
                }
                return;
            }
        };

        let mut context = BatchContext::new(
            client,
            Arc::clone(call) as Arc<dyn ResponseSink>,
            Arc::clone(&self.latency_get_internal),
            Arc::clone(&self.latency_set_internal),
            self.config.client_timeout_millis,
        );

        for (index, command) in call.client_batch().iter().enumerate() {
            let name = command.name_lowercase();
            let Some(info) = self.table.lookup(&name) else {
                tracing::error!(command = %name, "command not yet supported");
                self.respond_with_failure(call, index, "Unsupported call.");
                continue;
            };
            if let Err(message) = info.arity.check(command.len()) {
                tracing::error!(command = %name, tokens = command.len(), "bad argument count");
                self.respond_with_failure(call, index, message);
                continue;
            }

            match info.handler {
                CommandHandler::Echo => {
                    let payload = command.token(1).unwrap_or_default().to_vec();
                    call.respond_success(index, RedisResponse::BulkString(payload), &info.latency);
                }
                CommandHandler::Read(parser) => match parser(command) {
                    Ok(request) => {
                        self.apply_op(&mut context, index, BackendOp::read(request), info);
                    }
                    Err(message) => self.respond_with_failure(call, index, &message),
                },
                CommandHandler::Write(parser) => match parser(command) {
                    Ok(request) => {
                        self.apply_op(&mut context, index, BackendOp::write(request), info);
                    }
                    Err(message) => self.respond_with_failure(call, index, &message),
                },
            }
        }

        context.commit();
    }

    fn apply_op(
        &self,
        context: &mut BatchContext,
        index: usize,
        op: BackendOp,
        info: &CommandInfo,
    ) {
        let op = Arc::new(op);
        // With safe batching off the scheduler never sees keys, so conflict detection cannot
        // fire and read/write blocks always run in parallel.
        let keys = if self.config.safe_batch {
            vec![op.primary_key().to_vec()]
        } else {
            Vec::new()
        };
        context.apply(index, op, Arc::clone(&info.latency), keys);
    }

    fn respond_with_failure(&self, call: &Arc<InboundCall>, index: usize, error: &str) {
        let command_name = call
            .command(index)
            .map(RedisCommand::name_lowercase)
            .unwrap_or_default();
        self.latency_error.record_micros(call.elapsed_micros());
        call.respond_failure(index, RgError::Request(format!("{command_name}: {error}")));
    }

    /// Lazy one-time backend bootstrap, guarded by a mutex against concurrent first calls.
    fn ensure_client(&self) -> RgResult<Arc<dyn BackendClient>> {
        if !self.client_initialized.load(Ordering::Acquire) {
            self.set_up_client()?;
        }
        let client = self
            .client
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        client.ok_or(RgError::InvalidState("backend client is not initialized"))
    }

    fn set_up_client(&self) -> RgResult<()> {
        let mut slot = self
            .client
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if self.client_initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let client = match &self.preset_client {
            Some(client) => Arc::clone(client),
            None => BackendClientBuilder::new()
                .client_name("redgate_client")
                .default_rpc_timeout_millis(self.config.init_rpc_timeout_millis)
                .add_master_addresses(&self.config.master_addresses)
                .build()?,
        };

        if let Some(proxy) = &self.config.local_proxy {
            client.add_tablet_server_proxy(&proxy.uuid, &proxy.addr);
        }

        let table_handle = client.open_table(REDIS_KEYSPACE_NAME, REDIS_TABLE_NAME)?;
        *self
            .table_handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(table_handle);
        *slot = Some(client);
        self.client_initialized.store(true, Ordering::Release);
        Ok(())
    }
}
