use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{CallToken, QueueError};

/// One completion notification: the operation issued under `token` finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
	/// Token the finished operation was issued under.
	pub token: CallToken,
	/// `false` on failure, cancellation, or end of a streaming read.
	pub ok: bool,
}

impl Completion {
	/// Creates a completion.
	pub const fn new(token: CallToken, ok: bool) -> Self {
		Self { token, ok }
	}
}

/// Queue lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
	/// Accepting completions.
	Open,
	/// Rejecting completions, consumers drain what is left.
	ShuttingDown,
	/// Shut down and fully drained.
	Closed,
}

struct Pending {
	events: VecDeque<Completion>,
	state: QueueState,
}

struct QueueInner {
	pending: Mutex<Pending>,
	notify: Notify,
}

enum Pop {
	Event(Completion),
	Empty,
	Closed,
}

impl QueueInner {
	fn submit(&self, completion: Completion) -> Result<(), QueueError> {
		let mut pending = self.pending.lock();
		if pending.state != QueueState::Open {
			tracing::trace!(token = %completion.token, ok = completion.ok, "queue.rejected");
			return Err(QueueError::Rejected { token: completion.token });
		}
		pending.events.push_back(completion);
		drop(pending);
		self.notify.notify_one();
		Ok(())
	}

	fn pop(&self) -> Pop {
		let mut pending = self.pending.lock();
		match pending.events.pop_front() {
			Some(event) => {
				let more = !pending.events.is_empty();
				let drained = !more && pending.state == QueueState::ShuttingDown;
				if drained {
					pending.state = QueueState::Closed;
				}
				drop(pending);
				if drained {
					self.notify.notify_waiters();
				} else if more {
					self.notify.notify_one();
				}
				Pop::Event(event)
			}
			None if pending.state == QueueState::Open => Pop::Empty,
			None => {
				pending.state = QueueState::Closed;
				Pop::Closed
			}
		}
	}

	fn shutdown(&self) -> bool {
		let mut pending = self.pending.lock();
		if pending.state != QueueState::Open {
			return false;
		}
		pending.state = if pending.events.is_empty() {
			QueueState::Closed
		} else {
			QueueState::ShuttingDown
		};
		let remaining = pending.events.len();
		drop(pending);
		tracing::debug!(remaining, "queue.shutdown");
		self.notify.notify_waiters();
		true
	}
}

/// Unbounded completion queue shared by a runtime and dispatcher workers.
///
/// Completions come out in submission order. Consumers keep receiving after
/// [`shutdown`](Self::shutdown) until the backlog is empty, then every
/// receiver gets the closed sentinel once.
#[derive(Clone)]
pub struct EventQueue {
	inner: Arc<QueueInner>,
}

impl Default for EventQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for EventQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let pending = self.inner.pending.lock();
		f.debug_struct("EventQueue")
			.field("state", &pending.state)
			.field("len", &pending.events.len())
			.finish()
	}
}

impl EventQueue {
	/// Creates an open, empty queue.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(QueueInner {
				pending: Mutex::new(Pending {
					events: VecDeque::new(),
					state: QueueState::Open,
				}),
				notify: Notify::new(),
			}),
		}
	}

	/// Returns a producer handle.
	pub fn sender(&self) -> EventSender {
		EventSender {
			inner: Arc::clone(&self.inner),
		}
	}

	/// Returns a new consumer handle. Each dispatcher worker owns one.
	pub fn receiver(&self) -> EventReceiver {
		EventReceiver {
			inner: Arc::clone(&self.inner),
			closed_seen: false,
		}
	}

	/// Stops accepting completions. Returns `true` for the call that moved
	/// the queue out of `Open`; later calls are no-ops.
	pub fn shutdown(&self) -> bool {
		self.inner.shutdown()
	}

	/// Returns the lifecycle state.
	pub fn state(&self) -> QueueState {
		self.inner.pending.lock().state
	}

	/// Returns the number of undelivered completions.
	pub fn len(&self) -> usize {
		self.inner.pending.lock().events.len()
	}

	/// Returns `true` when no completion is waiting.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Producer half of an [`EventQueue`].
#[derive(Clone)]
pub struct EventSender {
	inner: Arc<QueueInner>,
}

impl EventSender {
	/// Enqueues one completion. Never blocks.
	///
	/// # Errors
	///
	/// Returns [`QueueError::Rejected`] once shutdown has begun.
	pub fn submit(&self, token: CallToken, ok: bool) -> Result<(), QueueError> {
		self.inner.submit(Completion::new(token, ok))
	}

	/// Returns `true` while completions are accepted.
	pub fn is_open(&self) -> bool {
		self.inner.pending.lock().state == QueueState::Open
	}

	/// Same as [`EventQueue::shutdown`].
	pub fn shutdown(&self) -> bool {
		self.inner.shutdown()
	}
}

/// Consumer half of an [`EventQueue`].
pub struct EventReceiver {
	inner: Arc<QueueInner>,
	closed_seen: bool,
}

impl EventReceiver {
	/// Waits for the next completion.
	///
	/// Returns `Ok(None)` once the queue is shut down and drained.
	///
	/// # Errors
	///
	/// Returns [`QueueError::Drained`] when called again after `Ok(None)`.
	pub async fn next(&mut self) -> Result<Option<Completion>, QueueError> {
		if self.closed_seen {
			return Err(QueueError::Drained);
		}
		loop {
			// Created before inspecting the queue so a submit or shutdown in
			// between still wakes us.
			let notified = self.inner.notify.notified();
			match self.inner.pop() {
				Pop::Event(event) => return Ok(Some(event)),
				Pop::Closed => {
					self.closed_seen = true;
					return Ok(None);
				}
				Pop::Empty => notified.await,
			}
		}
	}
}
