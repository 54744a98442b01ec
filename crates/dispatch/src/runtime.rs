//! Contract with the external RPC runtime.
//!
//! The runtime owns connections and message framing. The dispatcher only asks
//! it to start operations; each operation later completes as one event on the
//! [`EventQueue`](cqrpc_queue::EventQueue) under the token it was issued with.
//! Payloads produced by an operation (an accepted call, a read message) are
//! deposited into a [`Slot`] before the completion is posted.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use cqrpc_queue::CallToken;
use parking_lot::Mutex;
use thiserror::Error;

use crate::Status;
use crate::service::{MethodDescriptor, MethodTable};

/// Failures the runtime reports synchronously when asked to accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
	/// The runtime has been shut down.
	#[error("runtime is shut down")]
	ShutDown,
	/// The runtime cannot serve the method.
	#[error("{0}")]
	Rejected(String),
}

/// Single-value hand-off cell between a call and the runtime.
///
/// The call keeps one clone and passes another with the operation; the
/// runtime fills it before posting the completion.
pub struct Slot<T> {
	inner: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Slot<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Default for Slot<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> fmt::Debug for Slot<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Slot").field("filled", &self.is_filled()).finish()
	}
}

impl<T> Slot<T> {
	/// Creates an empty slot.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Mutex::new(None)),
		}
	}

	/// Stores a value, returning any value that was never taken.
	pub fn fill(&self, value: T) -> Option<T> {
		self.inner.lock().replace(value)
	}

	/// Removes the stored value.
	pub fn take(&self) -> Option<T> {
		self.inner.lock().take()
	}

	/// Returns `true` when a value is waiting.
	pub fn is_filled(&self) -> bool {
		self.inner.lock().is_some()
	}
}

/// A call handed over by the runtime when an accept completes.
pub struct AcceptedCall {
	/// Per-call handle for read/write/finish.
	pub stream: Box<dyn CallStream>,
	/// Initial request for unary and server-streaming methods. Streaming
	/// request methods receive their messages through reads instead.
	pub request: Option<Bytes>,
}

impl fmt::Debug for AcceptedCall {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AcceptedCall")
			.field("request_len", &self.request.as_ref().map(Bytes::len))
			.finish_non_exhaustive()
	}
}

/// Accept side of the runtime.
pub trait CallRuntime: Send + Sync + 'static {
	/// Registers willingness to take the next incoming call of `method`.
	///
	/// When a call arrives the runtime fills `into` and posts `(token, true)`.
	/// A pending accept that will never be satisfied (shutdown) completes with
	/// `(token, false)`.
	///
	/// # Errors
	///
	/// Returns an error when the runtime cannot take the registration at all;
	/// no completion is posted in that case.
	fn begin_accept(&self, method: &MethodDescriptor, into: Slot<AcceptedCall>, token: CallToken) -> Result<(), RuntimeError>;

	/// Every method in `methods` has a listener armed. Calls to any other
	/// path can be refused from here on.
	fn serving(&self, _methods: &MethodTable) {}

	/// Stops delivering calls. Every pending accept completes with `ok = false`.
	fn shutdown(&self);
}

/// Per-call operations. Each one is fire-and-forget: its outcome arrives as a
/// completion under `token`.
pub trait CallStream: Send + 'static {
	/// Reads the next inbound message into `into`. `ok = false` marks end of
	/// input or a broken call, and the two look the same: a cancelled call
	/// ends its input early. The finish a flow issues afterwards then fails
	/// and the peer never sees its reply.
	fn read(&self, into: Slot<Bytes>, token: CallToken);

	/// Writes one outbound message.
	fn write(&self, message: Bytes, token: CallToken);

	/// Sends the optional final reply and the status, ending the call.
	fn finish(&self, reply: Option<Bytes>, status: Status, token: CallToken);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn slot_hands_value_across_clones_once() {
		let slot = Slot::new();
		let runtime_side = slot.clone();

		assert_eq!(runtime_side.fill(Bytes::from_static(b"a")), None);
		assert!(slot.is_filled());
		assert_eq!(slot.take(), Some(Bytes::from_static(b"a")));
		assert_eq!(slot.take(), None);
	}
}
