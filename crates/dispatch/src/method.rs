//! Method cardinalities and the handler traits behind them.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::Status;

/// Index of a method in a [`MethodTable`](crate::MethodTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodId(pub(crate) u32);

impl MethodId {
	/// Returns the raw index.
	pub const fn index(self) -> usize {
		self.0 as usize
	}
}

impl fmt::Display for MethodId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "method#{}", self.0)
	}
}

/// Request/response cardinality of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
	/// One request, one reply.
	Unary,
	/// One request, many replies.
	ServerStreaming,
	/// Many requests, one reply.
	ClientStreaming,
	/// Many requests, many replies.
	BidiStreaming,
}

impl MethodKind {
	/// Returns `true` when the initial request arrives with the call.
	pub const fn has_initial_request(self) -> bool {
		matches!(self, Self::Unary | Self::ServerStreaming)
	}

	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Unary => "unary",
			Self::ServerStreaming => "server_streaming",
			Self::ClientStreaming => "client_streaming",
			Self::BidiStreaming => "bidi_streaming",
		}
	}
}

/// Replies produced by a server-streaming handler, pulled one per write.
pub type ReplyStream = Box<dyn Iterator<Item = Result<Bytes, Status>> + Send>;

/// Handler for one-request, one-reply methods.
pub trait UnaryHandler: Send + Sync + 'static {
	/// Computes the reply.
	fn call(&self, request: Bytes) -> Result<Bytes, Status>;
}

impl<F> UnaryHandler for F
where
	F: Fn(Bytes) -> Result<Bytes, Status> + Send + Sync + 'static,
{
	fn call(&self, request: Bytes) -> Result<Bytes, Status> {
		self(request)
	}
}

/// Handler for one-request, many-reply methods.
pub trait ServerStreamingHandler: Send + Sync + 'static {
	/// Opens the reply stream for one call. An `Err` item ends the call with
	/// that status.
	fn open(&self, request: Bytes) -> Result<ReplyStream, Status>;
}

impl<F> ServerStreamingHandler for F
where
	F: Fn(Bytes) -> Result<ReplyStream, Status> + Send + Sync + 'static,
{
	fn open(&self, request: Bytes) -> Result<ReplyStream, Status> {
		self(request)
	}
}

/// Per-call accumulator for a client-streaming method.
pub trait Aggregator: Send {
	/// Consumes one inbound message.
	fn push(&mut self, message: Bytes) -> Result<(), Status>;

	/// Produces the single reply once input ends.
	fn finish(self: Box<Self>) -> Result<Bytes, Status>;
}

/// Handler for many-request, one-reply methods.
pub trait ClientStreamingHandler: Send + Sync + 'static {
	/// Creates the accumulator for one call.
	fn start(&self) -> Box<dyn Aggregator>;
}

/// Per-call conversation state for a bidirectional method.
pub trait Exchange: Send {
	/// Handles one inbound message, optionally answering with one reply.
	fn on_message(&mut self, message: Bytes) -> Result<Option<Bytes>, Status>;

	/// Called once on end of input; the returned status finishes the call.
	fn on_end(&mut self) -> Result<(), Status> {
		Ok(())
	}
}

/// Handler for many-request, many-reply methods.
pub trait BidiStreamingHandler: Send + Sync + 'static {
	/// Creates the conversation state for one call.
	fn start(&self) -> Box<dyn Exchange>;
}

/// A registered handler, tagged with its cardinality.
#[derive(Clone)]
pub enum MethodHandler {
	/// See [`UnaryHandler`].
	Unary(Arc<dyn UnaryHandler>),
	/// See [`ServerStreamingHandler`].
	ServerStreaming(Arc<dyn ServerStreamingHandler>),
	/// See [`ClientStreamingHandler`].
	ClientStreaming(Arc<dyn ClientStreamingHandler>),
	/// See [`BidiStreamingHandler`].
	BidiStreaming(Arc<dyn BidiStreamingHandler>),
}

impl MethodHandler {
	/// Returns the cardinality.
	pub fn kind(&self) -> MethodKind {
		match self {
			Self::Unary(_) => MethodKind::Unary,
			Self::ServerStreaming(_) => MethodKind::ServerStreaming,
			Self::ClientStreaming(_) => MethodKind::ClientStreaming,
			Self::BidiStreaming(_) => MethodKind::BidiStreaming,
		}
	}
}

impl fmt::Debug for MethodHandler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("MethodHandler").field(&self.kind()).finish()
	}
}
