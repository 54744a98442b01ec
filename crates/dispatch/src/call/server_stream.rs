use std::sync::Arc;

use super::{CallFlow, CallOps, Phase, Step};
use crate::Status;
use crate::method::{ReplyStream, ServerStreamingHandler};

/// `Process -> StreamWriting* -> Finish`. Never reads.
pub(super) struct ServerStreamFlow {
	handler: Arc<dyn ServerStreamingHandler>,
	replies: Option<ReplyStream>,
}

impl ServerStreamFlow {
	pub(super) fn new(handler: Arc<dyn ServerStreamingHandler>) -> Self {
		Self { handler, replies: None }
	}

	fn pump(&mut self, ops: &mut CallOps<'_>) -> Step {
		match self.replies.as_mut().and_then(Iterator::next) {
			Some(Ok(reply)) => ops.write(reply),
			Some(Err(status)) => ops.finish(None, status),
			None => {
				self.replies = None;
				ops.finish(None, Status::ok())
			}
		}
	}
}

impl CallFlow for ServerStreamFlow {
	fn begin(&mut self, ops: &mut CallOps<'_>) -> Step {
		let Some(request) = ops.take_request() else {
			return ops.finish(None, Status::internal("server-streaming call arrived without a request"));
		};
		match self.handler.open(request) {
			Ok(replies) => {
				self.replies = Some(replies);
				self.pump(ops)
			}
			Err(status) => ops.finish(None, status),
		}
	}

	fn resume(&mut self, phase: Phase, ok: bool, ops: &mut CallOps<'_>) -> Step {
		match (phase, ok) {
			(Phase::StreamWriting, true) => self.pump(ops),
			_ => Step::Abort,
		}
	}
}
