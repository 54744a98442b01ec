use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use cqrpc_dispatch::{AcceptedCall, CallRuntime, CallToken, EventSender, MethodDescriptor, MethodTable, RuntimeError, Slot, Status};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;

use crate::client::{ClientCall, MemClient};
use crate::link::{Frame, Link, MemCallStream};

struct PendingAccept {
	token: CallToken,
	into: Slot<AcceptedCall>,
}

struct Incoming {
	link: Arc<Link>,
	replies: mpsc::UnboundedSender<Frame>,
	request: Option<Bytes>,
}

#[derive(Default)]
struct HubState {
	accepting: FxHashMap<String, VecDeque<PendingAccept>>,
	waiting: FxHashMap<String, VecDeque<Incoming>>,
	/// Paths the server serves, once every listener is armed.
	serving: Option<FxHashSet<String>>,
	shut_down: bool,
}

pub(crate) struct Hub {
	events: EventSender,
	state: Mutex<HubState>,
}

impl Hub {
	/// Pairs a new client call with an armed accept, or parks it until one
	/// is armed. Calls to paths the server does not serve end with
	/// `UNIMPLEMENTED`.
	pub(crate) fn connect(&self, path: &str, request: Option<Bytes>) -> ClientCall {
		let link = Link::new(self.events.clone());
		let (replies, frames) = mpsc::unbounded_channel();
		let call = ClientCall::new(Arc::clone(&link), frames);
		let incoming = Incoming { link, replies, request };

		let mut state = self.state.lock();
		if state.shut_down {
			drop(state);
			incoming.refuse(Status::unavailable("server is shutting down"));
			return call;
		}
		match state.accepting.get_mut(path).and_then(VecDeque::pop_front) {
			Some(accept) => {
				drop(state);
				self.hand_over(accept, incoming);
			}
			None if state.serving.as_ref().is_some_and(|paths| !paths.contains(path)) => {
				drop(state);
				tracing::debug!(path, "mem.unknown_method");
				incoming.refuse(unimplemented(path));
			}
			None => {
				tracing::trace!(path, "mem.call_waiting");
				state.waiting.entry(path.to_owned()).or_default().push_back(incoming);
			}
		}
		call
	}

	fn hand_over(&self, accept: PendingAccept, incoming: Incoming) {
		let Incoming { link, replies, request } = incoming;
		accept.into.fill(AcceptedCall {
			stream: Box::new(MemCallStream::new(link, replies)),
			request,
		});
		if let Err(error) = self.events.submit(accept.token, true) {
			tracing::warn!(token = %accept.token, %error, "mem.completion_dropped");
		}
	}
}

impl Incoming {
	fn refuse(self, status: Status) {
		let _ = self.replies.send(Frame::Finish(None, status));
	}
}

fn unimplemented(path: &str) -> Status {
	Status::unimplemented(format!("no method {path}"))
}

/// [`CallRuntime`] that connects [`MemClient`] calls to the dispatcher
/// in-process. Cheap to clone.
#[derive(Clone)]
pub struct MemRuntime {
	hub: Arc<Hub>,
}

impl std::fmt::Debug for MemRuntime {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemRuntime")
			.field("pending_accepts", &self.pending_accepts())
			.field("waiting_calls", &self.waiting_calls())
			.finish_non_exhaustive()
	}
}

impl MemRuntime {
	/// Creates a runtime posting completions through `events`.
	pub fn new(events: EventSender) -> Self {
		Self {
			hub: Arc::new(Hub {
				events,
				state: Mutex::new(HubState::default()),
			}),
		}
	}

	/// Returns a client bound to this runtime.
	pub fn client(&self) -> MemClient {
		MemClient::new(Arc::clone(&self.hub))
	}

	/// Accepts armed and not yet matched with a call.
	pub fn pending_accepts(&self) -> usize {
		self.hub.state.lock().accepting.values().map(VecDeque::len).sum()
	}

	/// Client calls waiting for an accept.
	pub fn waiting_calls(&self) -> usize {
		self.hub.state.lock().waiting.values().map(VecDeque::len).sum()
	}

	/// Returns `true` once the server armed every method and before
	/// shutdown.
	pub fn is_serving(&self) -> bool {
		let state = self.hub.state.lock();
		state.serving.is_some() && !state.shut_down
	}

	/// Returns `true` after [`CallRuntime::shutdown`].
	pub fn is_shut_down(&self) -> bool {
		self.hub.state.lock().shut_down
	}
}

impl CallRuntime for MemRuntime {
	fn begin_accept(&self, method: &MethodDescriptor, into: Slot<AcceptedCall>, token: CallToken) -> Result<(), RuntimeError> {
		let hub = &self.hub;
		let mut state = hub.state.lock();
		if state.shut_down {
			return Err(RuntimeError::ShutDown);
		}
		let accept = PendingAccept { token, into };
		match state.waiting.get_mut(method.path()).and_then(VecDeque::pop_front) {
			Some(incoming) => {
				drop(state);
				hub.hand_over(accept, incoming);
			}
			None => state.accepting.entry(method.path().to_owned()).or_default().push_back(accept),
		}
		Ok(())
	}

	fn serving(&self, methods: &MethodTable) {
		let paths: FxHashSet<String> = methods.descriptors().map(|d| d.path().to_owned()).collect();
		let unknown: Vec<(String, VecDeque<Incoming>)> = {
			let mut state = self.hub.state.lock();
			if state.shut_down {
				return;
			}
			let unknown = state.waiting.extract_if(|path, _| !paths.contains(path)).collect();
			state.serving = Some(paths);
			unknown
		};
		for (path, calls) in unknown {
			tracing::debug!(%path, calls = calls.len(), "mem.unknown_method");
			for incoming in calls {
				incoming.refuse(unimplemented(&path));
			}
		}
	}

	fn shutdown(&self) {
		let (accepting, waiting) = {
			let mut state = self.hub.state.lock();
			if std::mem::replace(&mut state.shut_down, true) {
				return;
			}
			(std::mem::take(&mut state.accepting), std::mem::take(&mut state.waiting))
		};
		tracing::debug!(accepts = accepting.len(), waiting = waiting.len(), "mem.shutdown");

		for accept in accepting.into_values().flatten() {
			if let Err(error) = self.hub.events.submit(accept.token, false) {
				tracing::warn!(token = %accept.token, %error, "mem.completion_dropped");
			}
		}
		for incoming in waiting.into_values().flatten() {
			incoming.refuse(Status::unavailable("server is shutting down"));
		}
	}
}
