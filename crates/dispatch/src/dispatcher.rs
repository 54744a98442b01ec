//! Completion-driven dispatch loop.

use std::sync::Arc;

use cqrpc_queue::{Completion, EventReceiver};

use crate::Result;
use crate::call::Disposition;
use crate::server::Shared;

/// Completions handled before a busy worker yields to its runtime.
const YIELD_EVERY: u32 = 64;

/// One dispatch worker: pulls completions and advances the calls they
/// belong to until the queue closes.
///
/// Several workers may share one server. A call is only ever driven by the
/// worker holding its lock, and a call never has more than one operation
/// outstanding, so completions for one token are applied in issue order.
pub struct Dispatcher {
	shared: Arc<Shared>,
	events: EventReceiver,
	worker: usize,
}

impl Dispatcher {
	pub(crate) fn new(shared: Arc<Shared>, worker: usize) -> Self {
		let events = shared.queue.receiver();
		Self { shared, events, worker }
	}

	/// Returns the worker index.
	pub fn worker(&self) -> usize {
		self.worker
	}

	/// Runs until the queue reports closed.
	///
	/// # Errors
	///
	/// Returns [`Error::Queue`](crate::Error::Queue) if this dispatcher is run
	/// again after it already drained.
	pub async fn run(mut self) -> Result<()> {
		tracing::debug!(worker = self.worker, "dispatch.worker_started");
		let mut handled = 0u32;
		while let Some(event) = self.events.next().await? {
			self.dispatch(event);
			handled = handled.wrapping_add(1);
			if handled % YIELD_EVERY == 0 {
				tokio::task::yield_now().await;
			}
		}
		tracing::debug!(worker = self.worker, "dispatch.worker_drained");
		Ok(())
	}

	/// Applies one completion.
	pub(crate) fn dispatch(&self, event: Completion) {
		let shared = &self.shared;
		let Some(call) = shared.registry.get(event.token) else {
			shared.stats.stale_event();
			tracing::debug!(token = %event.token, ok = event.ok, "dispatch.stale_event");
			return;
		};

		let mut state = call.lock();
		if state.is_retired() {
			shared.stats.stale_event();
			tracing::debug!(token = %event.token, ok = event.ok, "dispatch.stale_event");
			return;
		}

		if state.proceed(event.ok, &shared.registrar) == Disposition::Destroy {
			state.retire();
			drop(state);
			shared.registry.remove(event.token);
			shared.stats.destroyed();
			tracing::trace!(token = %event.token, worker = self.worker, "call.destroyed");
		} else {
			drop(state);
		}

		shared.close_if_drained();
	}
}
