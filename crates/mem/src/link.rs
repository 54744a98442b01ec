//! One call's in-memory connection between a [`ClientCall`](crate::ClientCall)
//! and the server-side [`MemCallStream`].

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use cqrpc_dispatch::{CallStream, CallToken, EventSender, Slot, Status};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Server-to-client traffic.
#[derive(Debug)]
pub(crate) enum Frame {
	Message(Bytes),
	Finish(Option<Bytes>, Status),
}

#[derive(Default)]
struct LinkState {
	inbox: VecDeque<Bytes>,
	half_closed: bool,
	cancelled: bool,
	finished: bool,
	parked_read: Option<(Slot<Bytes>, CallToken)>,
}

/// Client-to-server half plus call-wide flags, shared by both ends.
pub(crate) struct Link {
	state: Mutex<LinkState>,
	events: EventSender,
}

impl Link {
	pub(crate) fn new(events: EventSender) -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(LinkState::default()),
			events,
		})
	}

	/// Queues a client message, completing a parked read if there is one.
	pub(crate) fn send(&self, message: Bytes) -> Result<(), Status> {
		let mut state = self.state.lock();
		if state.cancelled || state.finished {
			return Err(Status::cancelled("call already ended"));
		}
		if state.half_closed {
			return Err(Status::internal("send after close_send"));
		}
		match state.parked_read.take() {
			Some((into, token)) => {
				drop(state);
				into.fill(message);
				self.post(token, true);
			}
			None => state.inbox.push_back(message),
		}
		Ok(())
	}

	/// Marks end of client input. A parked read completes as end of stream.
	pub(crate) fn close_send(&self) {
		let mut state = self.state.lock();
		state.half_closed = true;
		if state.inbox.is_empty()
			&& let Some((_, token)) = state.parked_read.take()
		{
			drop(state);
			self.post(token, false);
		}
	}

	/// Cancels the call from the client side. Pending and later server
	/// operations fail. No-op once the server finished the call.
	pub(crate) fn cancel(&self) {
		let mut state = self.state.lock();
		if state.finished || std::mem::replace(&mut state.cancelled, true) {
			return;
		}
		state.inbox.clear();
		let parked = state.parked_read.take();
		drop(state);
		if let Some((_, token)) = parked {
			self.post(token, false);
		}
	}

	pub(crate) fn is_cancelled(&self) -> bool {
		self.state.lock().cancelled
	}

	fn post(&self, token: CallToken, ok: bool) {
		if let Err(error) = self.events.submit(token, ok) {
			tracing::warn!(%token, ok, %error, "mem.completion_dropped");
		}
	}
}

/// Server-side handle the dispatcher drives. Dropping it without finishing
/// ends the client's view of the call with `CANCELLED`.
pub(crate) struct MemCallStream {
	link: Arc<Link>,
	replies: mpsc::UnboundedSender<Frame>,
}

impl MemCallStream {
	pub(crate) fn new(link: Arc<Link>, replies: mpsc::UnboundedSender<Frame>) -> Self {
		Self { link, replies }
	}
}

impl CallStream for MemCallStream {
	fn read(&self, into: Slot<Bytes>, token: CallToken) {
		let mut state = self.link.state.lock();
		if state.cancelled {
			drop(state);
			return self.link.post(token, false);
		}
		if let Some(message) = state.inbox.pop_front() {
			drop(state);
			into.fill(message);
			return self.link.post(token, true);
		}
		if state.half_closed {
			drop(state);
			return self.link.post(token, false);
		}
		debug_assert!(state.parked_read.is_none(), "two reads outstanding on {token}");
		state.parked_read = Some((into, token));
	}

	fn write(&self, message: Bytes, token: CallToken) {
		let ok = !self.link.is_cancelled() && self.replies.send(Frame::Message(message)).is_ok();
		self.link.post(token, ok);
	}

	fn finish(&self, reply: Option<Bytes>, status: Status, token: CallToken) {
		let cancelled = {
			let mut state = self.link.state.lock();
			state.finished = true;
			state.cancelled
		};
		let ok = !cancelled && self.replies.send(Frame::Finish(reply, status)).is_ok();
		self.link.post(token, ok);
	}
}
