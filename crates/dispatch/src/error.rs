//! Error types for the dispatcher.

use cqrpc_queue::QueueError;
use thiserror::Error;

use crate::MethodId;
use crate::runtime::RuntimeError;

/// Errors raised by the server, registrar, and dispatcher.
#[derive(Debug, Error)]
pub enum Error {
	/// Shutdown was requested; no new listeners are armed.
	#[error("server is shutting down")]
	ShuttingDown,

	/// The method id is not present in the method table.
	#[error("unknown method {0}")]
	UnknownMethod(MethodId),

	/// Two registrations share one method path.
	#[error("method {0} registered twice")]
	DuplicateMethod(String),

	/// The runtime refused to begin accepting calls.
	#[error("runtime refused to accept calls for {method}: {source}")]
	Accept {
		/// Method path.
		method: String,
		/// Runtime-side failure.
		#[source]
		source: RuntimeError,
	},

	/// [`Server::start`](crate::Server::start) was called twice.
	#[error("server already started")]
	AlreadyStarted,

	/// Event queue misuse.
	#[error(transparent)]
	Queue(#[from] QueueError),

	/// A dispatcher worker task failed.
	#[error("dispatcher worker failed: {0}")]
	Worker(String),
}

/// Result type for dispatcher operations.
pub type Result<T> = std::result::Result<T, Error>;
