//! Error types for the completion queue.

use thiserror::Error;

use crate::CallToken;

/// Errors reported by [`EventQueue`](crate::EventQueue) handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
	/// A completion was submitted after shutdown began.
	#[error("completion for {token} rejected: queue is shutting down")]
	Rejected {
		/// Token of the rejected completion.
		token: CallToken,
	},

	/// `next()` was called again on a receiver that already observed the
	/// closed sentinel.
	#[error("receiver polled after the queue reported closed")]
	Drained,
}
