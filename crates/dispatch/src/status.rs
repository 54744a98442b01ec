//! Peer-visible call outcome.

use std::fmt;

/// Status code sent to the peer when a call finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
	/// Success.
	Ok,
	/// The call was cancelled.
	Cancelled,
	/// Unclassified failure.
	Unknown,
	/// The request could not be decoded or was rejected by the handler.
	InvalidArgument,
	/// The requested entity does not exist.
	NotFound,
	/// Handler invariant broken.
	Internal,
	/// The server is not accepting calls.
	Unavailable,
	/// No handler is registered for the method.
	Unimplemented,
}

impl Code {
	/// Returns the canonical upper-snake-case name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ok => "OK",
			Self::Cancelled => "CANCELLED",
			Self::Unknown => "UNKNOWN",
			Self::InvalidArgument => "INVALID_ARGUMENT",
			Self::NotFound => "NOT_FOUND",
			Self::Internal => "INTERNAL",
			Self::Unavailable => "UNAVAILABLE",
			Self::Unimplemented => "UNIMPLEMENTED",
		}
	}
}

impl fmt::Display for Code {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Final status of a call: a [`Code`] plus a human-readable message.
///
/// Handlers return `Err(Status)` to fail a call; the dispatcher forwards it
/// through the runtime's finish operation rather than treating it as a local
/// fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
	code: Code,
	message: String,
}

impl Status {
	/// Creates a status.
	pub fn new(code: Code, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}

	/// Successful status with an empty message.
	pub fn ok() -> Self {
		Self::new(Code::Ok, String::new())
	}

	/// `CANCELLED` status.
	pub fn cancelled(message: impl Into<String>) -> Self {
		Self::new(Code::Cancelled, message)
	}

	/// `INVALID_ARGUMENT` status.
	pub fn invalid_argument(message: impl Into<String>) -> Self {
		Self::new(Code::InvalidArgument, message)
	}

	/// `INTERNAL` status.
	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(Code::Internal, message)
	}

	/// `UNAVAILABLE` status.
	pub fn unavailable(message: impl Into<String>) -> Self {
		Self::new(Code::Unavailable, message)
	}

	/// `UNIMPLEMENTED` status.
	pub fn unimplemented(message: impl Into<String>) -> Self {
		Self::new(Code::Unimplemented, message)
	}

	/// Returns the status code.
	pub fn code(&self) -> Code {
		self.code
	}

	/// Returns the message.
	pub fn message(&self) -> &str {
		&self.message
	}

	/// Returns `true` for [`Code::Ok`].
	pub fn is_ok(&self) -> bool {
		self.code == Code::Ok
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.message.is_empty() {
			write!(f, "{}", self.code)
		} else {
			write!(f, "{}: {}", self.code, self.message)
		}
	}
}

impl std::error::Error for Status {}
