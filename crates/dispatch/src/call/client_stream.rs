use std::sync::Arc;

use super::{CallFlow, CallOps, Phase, Step};
use crate::Status;
use crate::method::{Aggregator, ClientStreamingHandler};

/// `Process -> StreamReading* -> Finish`. A failed read is end of input and
/// triggers the single aggregated reply.
pub(super) struct ClientStreamFlow {
	handler: Arc<dyn ClientStreamingHandler>,
	aggregate: Option<Box<dyn Aggregator>>,
}

impl ClientStreamFlow {
	pub(super) fn new(handler: Arc<dyn ClientStreamingHandler>) -> Self {
		Self { handler, aggregate: None }
	}
}

impl CallFlow for ClientStreamFlow {
	fn begin(&mut self, ops: &mut CallOps<'_>) -> Step {
		self.aggregate = Some(self.handler.start());
		ops.read()
	}

	fn resume(&mut self, phase: Phase, ok: bool, ops: &mut CallOps<'_>) -> Step {
		if phase != Phase::StreamReading {
			return Step::Abort;
		}

		if !ok {
			let Some(aggregate) = self.aggregate.take() else {
				return Step::Abort;
			};
			return match aggregate.finish() {
				Ok(reply) => ops.finish(Some(reply), Status::ok()),
				Err(status) => ops.finish(None, status),
			};
		}

		let Some(aggregate) = self.aggregate.as_mut() else {
			return Step::Abort;
		};
		let Some(message) = ops.take_inbound() else {
			return ops.finish(None, Status::internal("read completed without a message"));
		};
		match aggregate.push(message) {
			Ok(()) => ops.read(),
			Err(status) => ops.finish(None, status),
		}
	}
}
