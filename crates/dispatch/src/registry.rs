use std::sync::Arc;

use cqrpc_queue::CallToken;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::call::{CallRecord, CallState};

/// One call behind its own lock; whoever holds the lock drives the call.
pub(crate) type SharedCall = Arc<Mutex<CallState>>;

/// Token-to-call map. The single owner of every live [`CallState`].
///
/// Entries are inserted by the registrar when a listener is armed and removed
/// by the dispatcher worker that observed the call's terminal completion.
#[derive(Clone, Default)]
pub(crate) struct CallRegistry {
	calls: Arc<Mutex<FxHashMap<CallToken, SharedCall>>>,
}

impl CallRegistry {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn insert(&self, token: CallToken, call: CallState) {
		let previous = self.calls.lock().insert(token, Arc::new(Mutex::new(call)));
		debug_assert!(previous.is_none(), "token {token} claimed twice");
	}

	pub(crate) fn get(&self, token: CallToken) -> Option<SharedCall> {
		self.calls.lock().get(&token).cloned()
	}

	pub(crate) fn remove(&self, token: CallToken) -> Option<SharedCall> {
		self.calls.lock().remove(&token)
	}

	pub(crate) fn len(&self) -> usize {
		self.calls.lock().len()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.calls.lock().is_empty()
	}

	/// Returns records sorted by token.
	///
	/// Each call is locked in turn, so a call mid-transition is reported once
	/// its transition completes.
	pub(crate) fn snapshot(&self) -> Vec<CallRecord> {
		let calls: Vec<SharedCall> = self.calls.lock().values().cloned().collect();
		let mut records: Vec<_> = calls
			.iter()
			.filter_map(|call| {
				let call = call.lock();
				(!call.is_retired()).then(|| call.record())
			})
			.collect();
		records.sort_by_key(|r| r.token);
		records
	}
}
