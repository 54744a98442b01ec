use std::sync::Arc;

use super::{CallFlow, CallOps, Phase, Step};
use crate::Status;
use crate::method::UnaryHandler;

/// `Process -> Finish`: the reply goes out with the status in one finish.
pub(super) struct UnaryFlow {
	handler: Arc<dyn UnaryHandler>,
}

impl UnaryFlow {
	pub(super) fn new(handler: Arc<dyn UnaryHandler>) -> Self {
		Self { handler }
	}
}

impl CallFlow for UnaryFlow {
	fn begin(&mut self, ops: &mut CallOps<'_>) -> Step {
		let Some(request) = ops.take_request() else {
			return ops.finish(None, Status::internal("unary call arrived without a request"));
		};
		match self.handler.call(request) {
			Ok(reply) => ops.finish(Some(reply), Status::ok()),
			Err(status) => ops.finish(None, status),
		}
	}

	fn resume(&mut self, phase: Phase, _ok: bool, _ops: &mut CallOps<'_>) -> Step {
		tracing::warn!(phase = phase.as_str(), "unary call resumed before finish");
		Step::Abort
	}
}
