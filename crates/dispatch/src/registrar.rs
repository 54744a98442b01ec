use std::sync::Arc;

use cqrpc_queue::{CallToken, TokenClock};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::call::CallState;
use crate::method::MethodId;
use crate::registry::CallRegistry;
use crate::runtime::CallRuntime;
use crate::service::MethodTable;
use crate::stats::DispatchStats;
use crate::{Error, Result};

#[derive(Default)]
struct Listeners {
	by_method: FxHashMap<MethodId, CallToken>,
	closed: bool,
}

/// Keeps exactly one call per method armed with the runtime.
pub(crate) struct Registrar {
	methods: Arc<MethodTable>,
	runtime: Arc<dyn CallRuntime>,
	registry: CallRegistry,
	clock: TokenClock,
	stats: Arc<DispatchStats>,
	listeners: Mutex<Listeners>,
}

impl Registrar {
	pub(crate) fn new(methods: Arc<MethodTable>, runtime: Arc<dyn CallRuntime>, registry: CallRegistry, stats: Arc<DispatchStats>) -> Self {
		Self {
			methods,
			runtime,
			registry,
			clock: TokenClock::new(),
			stats,
			listeners: Mutex::new(Listeners::default()),
		}
	}

	pub(crate) fn stats(&self) -> &DispatchStats {
		&self.stats
	}

	/// Arms a listener for `method` unless one is already armed, returning
	/// the listener's token.
	pub(crate) fn ensure_listening(&self, method: MethodId) -> Result<CallToken> {
		let mut listeners = self.listeners.lock();
		if listeners.closed {
			return Err(Error::ShuttingDown);
		}
		if let Some(token) = listeners.by_method.get(&method) {
			return Ok(*token);
		}
		self.arm(&mut listeners, method)
	}

	/// Called by a listener leaving `Create`: forgets it and arms its
	/// successor, unless shutdown has begun.
	pub(crate) fn replace_listener(&self, method: MethodId, token: CallToken) {
		let mut listeners = self.listeners.lock();
		if listeners.by_method.get(&method) == Some(&token) {
			listeners.by_method.remove(&method);
		}
		if listeners.closed || listeners.by_method.contains_key(&method) {
			return;
		}
		if let Err(error) = self.arm(&mut listeners, method) {
			tracing::warn!(%method, %error, "registrar.rearm_failed");
		}
	}

	/// Current listener token for `method`.
	pub(crate) fn listener(&self, method: MethodId) -> Option<CallToken> {
		self.listeners.lock().by_method.get(&method).copied()
	}

	/// Armed listeners, sorted by method.
	pub(crate) fn listeners(&self) -> Vec<(MethodId, CallToken)> {
		let mut armed: Vec<_> = self.listeners.lock().by_method.iter().map(|(m, t)| (*m, *t)).collect();
		armed.sort_unstable();
		armed
	}

	/// Rejects all further arming. Returns `true` for the first call.
	pub(crate) fn close(&self) -> bool {
		let mut listeners = self.listeners.lock();
		!std::mem::replace(&mut listeners.closed, true)
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.listeners.lock().closed
	}

	fn arm(&self, listeners: &mut Listeners, method: MethodId) -> Result<CallToken> {
		let entry = self.methods.entry(method).ok_or(Error::UnknownMethod(method))?;
		let token = self.clock.next();
		let call = CallState::new(token, method, &entry.handler);
		let slot = call.accept_slot();

		// Registered before the runtime sees the token: the accept may
		// complete on another thread before begin_accept returns.
		self.registry.insert(token, call);
		self.stats.created();
		listeners.by_method.insert(method, token);

		if let Err(source) = self.runtime.begin_accept(&entry.descriptor, slot, token) {
			listeners.by_method.remove(&method);
			self.registry.remove(token);
			self.stats.destroyed();
			return Err(Error::Accept {
				method: entry.descriptor.path().to_owned(),
				source,
			});
		}
		tracing::trace!(%token, path = entry.descriptor.path(), "registrar.armed");
		Ok(token)
	}
}
