use std::sync::Arc;

use bytes::Bytes;
use cqrpc_dispatch::Status;
use tokio::sync::mpsc;

use crate::link::{Frame, Link};
use crate::runtime::Hub;

/// Starts calls against a [`MemRuntime`](crate::MemRuntime).
///
/// A call to a method with no armed listener waits until the server arms
/// one. Once the server is serving, calls to a path it does not serve end
/// with `UNIMPLEMENTED`. Calls started after shutdown end with `UNAVAILABLE`.
#[derive(Clone)]
pub struct MemClient {
	hub: Arc<Hub>,
}

impl std::fmt::Debug for MemClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemClient").finish_non_exhaustive()
	}
}

impl MemClient {
	pub(crate) fn new(hub: Arc<Hub>) -> Self {
		Self { hub }
	}

	/// One request, one reply: await [`ClientCall::finish`].
	pub fn unary(&self, path: &str, request: Bytes) -> ClientCall {
		self.hub.connect(path, Some(request))
	}

	/// One request, replies through [`ClientCall::message`].
	pub fn server_streaming(&self, path: &str, request: Bytes) -> ClientCall {
		self.hub.connect(path, Some(request))
	}

	/// Requests through [`ClientCall::send`], then one reply.
	pub fn client_streaming(&self, path: &str) -> ClientCall {
		self.hub.connect(path, None)
	}

	/// Requests and replies interleaved.
	pub fn bidi_streaming(&self, path: &str) -> ClientCall {
		self.hub.connect(path, None)
	}
}

/// Client end of one call. Dropping it before the call ended cancels it.
pub struct ClientCall {
	link: Arc<Link>,
	frames: mpsc::UnboundedReceiver<Frame>,
	outcome: Option<(Option<Bytes>, Status)>,
}

impl std::fmt::Debug for ClientCall {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClientCall")
			.field("finished", &self.outcome.is_some())
			.finish_non_exhaustive()
	}
}

impl ClientCall {
	pub(crate) fn new(link: Arc<Link>, frames: mpsc::UnboundedReceiver<Frame>) -> Self {
		Self {
			link,
			frames,
			outcome: None,
		}
	}

	/// Sends one request message.
	///
	/// # Errors
	///
	/// `CANCELLED` once the call ended, `INTERNAL` after
	/// [`close_send`](Self::close_send).
	pub fn send(&self, message: impl Into<Bytes>) -> Result<(), Status> {
		self.link.send(message.into())
	}

	/// Signals that no more requests follow.
	pub fn close_send(&self) {
		self.link.close_send();
	}

	/// Abandons the call. The server sees its next operation fail.
	pub fn cancel(&self) {
		self.link.cancel();
	}

	/// Waits for the next reply message. `Ok(None)` means the server finished
	/// with `OK`; the final reply, if any, is returned by
	/// [`finish`](Self::finish).
	///
	/// # Errors
	///
	/// The non-OK status the call ended with.
	pub async fn message(&mut self) -> Result<Option<Bytes>, Status> {
		if self.outcome.is_none() {
			match self.frames.recv().await {
				Some(Frame::Message(message)) => return Ok(Some(message)),
				Some(Frame::Finish(reply, status)) => self.outcome = Some((reply, status)),
				None => self.outcome = Some((None, self.dropped())),
			}
		}
		match &self.outcome {
			Some((_, status)) if !status.is_ok() => Err(status.clone()),
			_ => Ok(None),
		}
	}

	/// Waits for the call to end, skipping unread reply messages, and returns
	/// the final reply.
	///
	/// # Errors
	///
	/// The non-OK status the call ended with.
	pub async fn finish(mut self) -> Result<Option<Bytes>, Status> {
		while self.outcome.is_none() {
			match self.frames.recv().await {
				Some(Frame::Message(_)) => {}
				Some(Frame::Finish(reply, status)) => self.outcome = Some((reply, status)),
				None => self.outcome = Some((None, self.dropped())),
			}
		}
		match self.outcome.take() {
			Some((reply, status)) if status.is_ok() => Ok(reply),
			Some((_, status)) => Err(status),
			None => Err(self.dropped()),
		}
	}

	fn dropped(&self) -> Status {
		if self.link.is_cancelled() {
			Status::cancelled("call cancelled by client")
		} else {
			Status::cancelled("server dropped the call")
		}
	}
}

impl Drop for ClientCall {
	fn drop(&mut self) {
		self.link.cancel();
	}
}
