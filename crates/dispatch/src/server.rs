//! Server context: the queue, the method table, and the live calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cqrpc_queue::{CallToken, EventQueue};
use serde::Deserialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::call::CallRecord;
use crate::dispatcher::Dispatcher;
use crate::method::MethodId;
use crate::registrar::Registrar;
use crate::registry::CallRegistry;
use crate::runtime::CallRuntime;
use crate::service::MethodTable;
use crate::stats::{DispatchStats, StatsSnapshot};
use crate::{Error, Result};

/// Server tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
	/// Dispatch workers sharing the event queue. Zero is treated as one.
	pub workers: usize,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self { workers: 1 }
	}
}

impl ServerConfig {
	/// Sets the number of dispatch workers.
	#[must_use]
	pub fn workers(mut self, workers: usize) -> Self {
		self.workers = workers;
		self
	}

	fn worker_count(&self) -> usize {
		self.workers.max(1)
	}
}

pub(crate) struct Shared {
	pub(crate) config: ServerConfig,
	pub(crate) methods: Arc<MethodTable>,
	pub(crate) queue: EventQueue,
	pub(crate) registry: CallRegistry,
	pub(crate) registrar: Registrar,
	pub(crate) runtime: Arc<dyn CallRuntime>,
	pub(crate) stats: Arc<DispatchStats>,
	pub(crate) shutdown: CancellationToken,
	started: AtomicBool,
}

impl Shared {
	/// Closes the queue once shutdown is requested and no call is left.
	pub(crate) fn close_if_drained(&self) {
		if self.shutdown.is_cancelled() && self.registry.is_empty() && self.queue.shutdown() {
			tracing::info!("server.drained");
		}
	}
}

/// Explicit server context tying the event queue, method table, runtime and
/// call registry together. Cheap to clone; clones share one server.
#[derive(Clone)]
pub struct Server {
	shared: Arc<Shared>,
}

impl std::fmt::Debug for Server {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Server")
			.field("config", &self.shared.config)
			.field("methods", &self.shared.methods.len())
			.field("live_calls", &self.shared.registry.len())
			.field("shutting_down", &self.shared.shutdown.is_cancelled())
			.finish()
	}
}

impl Server {
	/// Creates a server. `queue` must be the queue `runtime` posts to.
	pub fn new(config: ServerConfig, methods: MethodTable, runtime: Arc<dyn CallRuntime>, queue: EventQueue) -> Self {
		let methods = Arc::new(methods);
		let registry = CallRegistry::new();
		let stats = Arc::new(DispatchStats::default());
		let registrar = Registrar::new(Arc::clone(&methods), Arc::clone(&runtime), registry.clone(), Arc::clone(&stats));
		Self {
			shared: Arc::new(Shared {
				config,
				methods,
				queue,
				registry,
				registrar,
				runtime,
				stats,
				shutdown: CancellationToken::new(),
				started: AtomicBool::new(false),
			}),
		}
	}

	/// Arms one listener per method, then runs the configured dispatch
	/// workers until shutdown has drained every call.
	///
	/// # Errors
	///
	/// * [`Error::AlreadyStarted`] on a second call.
	/// * [`Error::Accept`] if the runtime refuses a method; the server shuts
	///   down and drains what was already armed before returning.
	/// * [`Error::Worker`] if a worker task panicked.
	pub async fn start(&self) -> Result<()> {
		if self.shared.started.swap(true, Ordering::AcqRel) {
			return Err(Error::AlreadyStarted);
		}
		let workers = self.shared.config.worker_count();
		tracing::info!(methods = self.shared.methods.len(), workers, "server.start");

		let mut armed = Ok(());
		for method in self.shared.methods.ids() {
			match self.shared.registrar.ensure_listening(method) {
				Ok(_) => {}
				Err(Error::ShuttingDown) => break,
				Err(error) => {
					tracing::error!(%method, %error, "server.arm_failed");
					self.shutdown();
					armed = Err(error);
					break;
				}
			}
		}
		if armed.is_ok() && !self.is_shutting_down() {
			self.shared.runtime.serving(&self.shared.methods);
		}
		self.shared.close_if_drained();

		let mut pool = JoinSet::new();
		for worker in 1..workers {
			pool.spawn(self.dispatcher(worker).run());
		}
		let mut result = self.dispatcher(0).run().await;
		while let Some(joined) = pool.join_next().await {
			let outcome = joined.map_err(|e| Error::Worker(e.to_string())).and_then(|r| r);
			if result.is_ok() {
				result = outcome;
			}
		}

		tracing::info!(stats = ?self.stats(), "server.stopped");
		armed.and(result)
	}

	/// Stops arming listeners, tells the runtime to stop accepting, and lets
	/// in-flight calls finish. The queue closes once the last call is gone.
	///
	/// Idempotent.
	pub fn shutdown(&self) {
		if self.shared.registrar.close() {
			tracing::info!(live_calls = self.shared.registry.len(), "server.shutdown");
			self.shared.shutdown.cancel();
			self.shared.runtime.shutdown();
		}
		self.shared.close_if_drained();
	}

	/// Returns `true` once [`shutdown`](Self::shutdown) was called.
	pub fn is_shutting_down(&self) -> bool {
		self.shared.registrar.is_closed()
	}

	/// Creates a dispatch worker with its own queue receiver, for hosts that
	/// drive workers themselves instead of calling [`start`](Self::start).
	pub fn dispatcher(&self, worker: usize) -> Dispatcher {
		Dispatcher::new(Arc::clone(&self.shared), worker)
	}

	/// Arms a listener for `method` if none is armed.
	///
	/// # Errors
	///
	/// [`Error::ShuttingDown`], [`Error::UnknownMethod`], or [`Error::Accept`].
	pub fn ensure_listening(&self, method: MethodId) -> Result<CallToken> {
		self.shared.registrar.ensure_listening(method)
	}

	/// Token of the call currently armed for `method`.
	pub fn listener(&self, method: MethodId) -> Option<CallToken> {
		self.shared.registrar.listener(method)
	}

	/// Every armed listener as `(method, token)`, sorted by method.
	pub fn listeners(&self) -> Vec<(MethodId, CallToken)> {
		self.shared.registrar.listeners()
	}

	/// Registered methods.
	pub fn methods(&self) -> &MethodTable {
		&self.shared.methods
	}

	/// Server configuration.
	pub fn config(&self) -> &ServerConfig {
		&self.shared.config
	}

	/// Live calls, sorted by token.
	pub fn calls(&self) -> Vec<CallRecord> {
		self.shared.registry.snapshot()
	}

	/// Counter snapshot.
	pub fn stats(&self) -> StatsSnapshot {
		self.shared.stats.snapshot()
	}
}
