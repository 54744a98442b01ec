//! Per-call state machine.
//!
//! A [`CallState`] starts in [`Phase::Create`] as the armed listener of its
//! method. The accept completion moves it to [`Phase::Process`], where the
//! flow chosen for the method's cardinality takes over and issues one
//! operation at a time. Every later completion resumes the flow until it
//! finishes the call or a failed completion tears it down.

mod bidi;
mod client_stream;
mod server_stream;
mod unary;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use bytes::Bytes;
use cqrpc_queue::CallToken;

use crate::Status;
use crate::method::{MethodHandler, MethodId, MethodKind};
use crate::registrar::Registrar;
use crate::runtime::{AcceptedCall, CallStream, Slot};
use crate::stats::DispatchStats;

/// Lifecycle phase of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	/// Armed as the method's listener; nothing read or written yet.
	Create,
	/// The call arrived and its flow is starting.
	Process,
	/// A read is outstanding.
	StreamReading,
	/// A write is outstanding.
	StreamWriting,
	/// The finish operation is outstanding; the next completion destroys the call.
	Finish,
}

impl Phase {
	/// Returns the snake-case name used in logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Create => "create",
			Self::Process => "process",
			Self::StreamReading => "stream_reading",
			Self::StreamWriting => "stream_writing",
			Self::Finish => "finish",
		}
	}

	/// Returns `true` if a call may move from `self` to `next`.
	///
	/// Streaming phases may repeat and alternate; nothing moves back to
	/// `Create` or `Process`, and `Finish` is only left by destruction.
	pub const fn may_advance_to(self, next: Phase) -> bool {
		matches!(
			(self, next),
			(Self::Create, Self::Process)
				| (Self::Process, Self::StreamReading | Self::StreamWriting | Self::Finish)
				| (Self::StreamReading | Self::StreamWriting, Self::StreamReading | Self::StreamWriting | Self::Finish)
		)
	}
}

/// What a flow did with the completion it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
	/// An operation was issued; wait in this phase for its completion.
	Await(Phase),
	/// The call is broken; destroy it without issuing anything further.
	Abort,
}

/// Outcome of one transition for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
	Keep,
	Destroy,
}

/// Phase transitions for one method cardinality.
///
/// Chosen once when the call state is built. `begin` runs on arrival,
/// `resume` on every later completion except the one for finish.
pub(crate) trait CallFlow: Send {
	fn begin(&mut self, ops: &mut CallOps<'_>) -> Step;

	fn resume(&mut self, phase: Phase, ok: bool, ops: &mut CallOps<'_>) -> Step;
}

fn flow_for(handler: &MethodHandler) -> Box<dyn CallFlow> {
	match handler {
		MethodHandler::Unary(h) => Box::new(unary::UnaryFlow::new(Arc::clone(h))),
		MethodHandler::ServerStreaming(h) => Box::new(server_stream::ServerStreamFlow::new(Arc::clone(h))),
		MethodHandler::ClientStreaming(h) => Box::new(client_stream::ClientStreamFlow::new(Arc::clone(h))),
		MethodHandler::BidiStreaming(h) => Box::new(bidi::BidiFlow::new(Arc::clone(h))),
	}
}

/// Operations a flow may issue on its call. Each returns the [`Step`] to
/// hand back to the state machine.
pub(crate) struct CallOps<'a> {
	token: CallToken,
	stream: &'a dyn CallStream,
	request: &'a mut Option<Bytes>,
	inbound: &'a Slot<Bytes>,
	stats: &'a DispatchStats,
}

impl CallOps<'_> {
	pub(crate) fn take_request(&mut self) -> Option<Bytes> {
		self.request.take()
	}

	pub(crate) fn take_inbound(&mut self) -> Option<Bytes> {
		self.inbound.take()
	}

	pub(crate) fn read(&mut self) -> Step {
		self.stats.read();
		self.stream.read(self.inbound.clone(), self.token);
		Step::Await(Phase::StreamReading)
	}

	pub(crate) fn write(&mut self, message: Bytes) -> Step {
		self.stats.write();
		self.stream.write(message, self.token);
		Step::Await(Phase::StreamWriting)
	}

	pub(crate) fn finish(&mut self, reply: Option<Bytes>, status: Status) -> Step {
		if !status.is_ok() {
			tracing::debug!(token = %self.token, %status, "call.failed");
		}
		self.stats.finish();
		self.stream.finish(reply, status, self.token);
		Step::Await(Phase::Finish)
	}
}

/// Snapshot of one live call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallRecord {
	/// Correlation token.
	pub token: CallToken,
	/// Method served.
	pub method: MethodId,
	/// Method cardinality.
	pub kind: MethodKind,
	/// Current phase.
	pub phase: Phase,
}

/// State and buffers of one call.
pub(crate) struct CallState {
	token: CallToken,
	method: MethodId,
	kind: MethodKind,
	phase: Phase,
	flow: Box<dyn CallFlow>,
	accept: Slot<AcceptedCall>,
	stream: Option<Box<dyn CallStream>>,
	request: Option<Bytes>,
	inbound: Slot<Bytes>,
	retired: bool,
}

impl CallState {
	pub(crate) fn new(token: CallToken, method: MethodId, handler: &MethodHandler) -> Self {
		Self {
			token,
			method,
			kind: handler.kind(),
			phase: Phase::Create,
			flow: flow_for(handler),
			accept: Slot::new(),
			stream: None,
			request: None,
			inbound: Slot::new(),
			retired: false,
		}
	}

	pub(crate) fn accept_slot(&self) -> Slot<AcceptedCall> {
		self.accept.clone()
	}

	pub(crate) fn is_retired(&self) -> bool {
		self.retired
	}

	pub(crate) fn record(&self) -> CallRecord {
		CallRecord {
			token: self.token,
			method: self.method,
			kind: self.kind,
			phase: self.phase,
		}
	}

	/// Releases buffers and the runtime handle. The dispatcher removes the
	/// call from the registry right after.
	pub(crate) fn retire(&mut self) {
		self.retired = true;
		self.stream = None;
		self.request = None;
		let _ = self.inbound.take();
		let _ = self.accept.take();
	}

	/// Applies one completion.
	pub(crate) fn proceed(&mut self, ok: bool, registrar: &Registrar) -> Disposition {
		match self.phase {
			Phase::Create => self.on_arrival(ok, registrar),
			Phase::Finish => {
				if !ok {
					tracing::debug!(token = %self.token, "call.finish_failed");
				}
				Disposition::Destroy
			}
			phase => {
				let step = self.drive(registrar.stats(), |flow, ops| flow.resume(phase, ok, ops));
				self.apply(step, registrar.stats())
			}
		}
	}

	fn on_arrival(&mut self, ok: bool, registrar: &Registrar) -> Disposition {
		// This call stops listening either way; keep the method covered.
		registrar.replace_listener(self.method, self.token);

		if !ok {
			tracing::debug!(token = %self.token, method = %self.method, "call.accept_failed");
			return Disposition::Destroy;
		}
		let Some(AcceptedCall { stream, request }) = self.accept.take() else {
			tracing::warn!(token = %self.token, method = %self.method, "call.accept_without_call");
			return Disposition::Destroy;
		};

		let stats = registrar.stats();
		stats.accepted();
		self.stream = Some(stream);
		self.request = request;
		self.advance(Phase::Process, stats);

		let step = self.drive(stats, |flow, ops| flow.begin(ops));
		self.apply(step, stats)
	}

	fn drive(&mut self, stats: &DispatchStats, f: impl FnOnce(&mut dyn CallFlow, &mut CallOps<'_>) -> Step) -> Step {
		let Self {
			token,
			flow,
			stream,
			request,
			inbound,
			..
		} = self;
		let Some(stream) = stream.as_deref() else {
			return Step::Abort;
		};
		let mut ops = CallOps {
			token: *token,
			stream,
			request,
			inbound,
			stats,
		};
		f(flow.as_mut(), &mut ops)
	}

	fn apply(&mut self, step: Step, stats: &DispatchStats) -> Disposition {
		match step {
			Step::Await(next) => {
				self.advance(next, stats);
				Disposition::Keep
			}
			Step::Abort => {
				stats.aborted();
				tracing::debug!(token = %self.token, phase = self.phase.as_str(), "call.aborted");
				Disposition::Destroy
			}
		}
	}

	fn advance(&mut self, next: Phase, stats: &DispatchStats) {
		debug_assert!(self.phase.may_advance_to(next), "illegal transition {:?} -> {:?}", self.phase, next);
		tracing::trace!(
			token = %self.token,
			method = %self.method,
			from = self.phase.as_str(),
			to = next.as_str(),
			"call.transition"
		);
		self.phase = next;
		stats.transition();
	}
}
