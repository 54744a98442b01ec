use std::sync::Arc;

use super::{CallFlow, CallOps, Phase, Step};
use crate::Status;
use crate::method::{BidiStreamingHandler, Exchange};

/// Reads alternate with at most one write per inbound message. End of input
/// finishes the call with the status from [`Exchange::on_end`].
pub(super) struct BidiFlow {
	handler: Arc<dyn BidiStreamingHandler>,
	exchange: Option<Box<dyn Exchange>>,
}

impl BidiFlow {
	pub(super) fn new(handler: Arc<dyn BidiStreamingHandler>) -> Self {
		Self { handler, exchange: None }
	}
}

impl CallFlow for BidiFlow {
	fn begin(&mut self, ops: &mut CallOps<'_>) -> Step {
		self.exchange = Some(self.handler.start());
		ops.read()
	}

	fn resume(&mut self, phase: Phase, ok: bool, ops: &mut CallOps<'_>) -> Step {
		let Some(exchange) = self.exchange.as_mut() else {
			return Step::Abort;
		};
		match (phase, ok) {
			(Phase::StreamReading, true) => {
				let Some(message) = ops.take_inbound() else {
					return ops.finish(None, Status::internal("read completed without a message"));
				};
				match exchange.on_message(message) {
					Ok(Some(reply)) => ops.write(reply),
					Ok(None) => ops.read(),
					Err(status) => ops.finish(None, status),
				}
			}
			(Phase::StreamReading, false) => {
				let status = exchange.on_end().err().unwrap_or_else(Status::ok);
				self.exchange = None;
				ops.finish(None, status)
			}
			(Phase::StreamWriting, true) => ops.read(),
			_ => Step::Abort,
		}
	}
}
