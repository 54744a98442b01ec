//! Typed greeter client and the demo run the binary performs.

use bytes::Bytes;
use cqrpc_dispatch::Status;
use cqrpc_mem::MemClient;

use crate::config::DemoConfig;
use crate::proto::{HelloReply, HelloRequest, decode, encode};
use crate::service::{SAY_HELLO, SAY_HELLO_FUNC1, SAY_HELLO_FUNC2, SAY_HELLO2, SAY_HELLO3, SAY_HELLO4, path};

/// Typed stub over a [`MemClient`].
#[derive(Debug, Clone)]
pub struct GreeterClient {
	client: MemClient,
}

fn request(name: &str) -> Result<Bytes, Status> {
	encode(&HelloRequest::new(name)).map_err(|e| Status::internal(e.to_string()))
}

fn reply(bytes: Option<Bytes>) -> Result<HelloReply, Status> {
	let bytes = bytes.ok_or_else(|| Status::internal("call finished without a reply"))?;
	Ok(decode(&bytes)?)
}

impl GreeterClient {
	/// Wraps `client`.
	pub fn new(client: MemClient) -> Self {
		Self { client }
	}

	/// `SayHello`.
	///
	/// # Errors
	///
	/// The status the call failed with.
	pub async fn say_hello(&self, name: &str) -> Result<String, Status> {
		self.unary(SAY_HELLO, name).await
	}

	/// `SayHelloFunc1`.
	///
	/// # Errors
	///
	/// The status the call failed with.
	pub async fn say_hello_func1(&self, name: &str) -> Result<String, Status> {
		self.unary(SAY_HELLO_FUNC1, name).await
	}

	/// `SayHelloFunc2`.
	///
	/// # Errors
	///
	/// The status the call failed with.
	pub async fn say_hello_func2(&self, name: &str) -> Result<String, Status> {
		self.unary(SAY_HELLO_FUNC2, name).await
	}

	async fn unary(&self, method: &str, name: &str) -> Result<String, Status> {
		let call = self.client.unary(&path(method), request(name)?);
		Ok(reply(call.finish().await?)?.message)
	}

	/// `SayHello2`: every streamed greeting, in order.
	///
	/// # Errors
	///
	/// The status the call failed with.
	pub async fn say_hello2(&self, name: &str) -> Result<Vec<String>, Status> {
		let mut call = self.client.server_streaming(&path(SAY_HELLO2), request(name)?);
		let mut replies = Vec::new();
		while let Some(bytes) = call.message().await? {
			replies.push(reply(Some(bytes))?.message);
		}
		call.finish().await?;
		Ok(replies)
	}

	/// `SayHello3`: streams `count` requests and returns the single reply.
	///
	/// # Errors
	///
	/// The status the call failed with.
	pub async fn say_hello3(&self, name: &str, count: usize) -> Result<String, Status> {
		let call = self.client.client_streaming(&path(SAY_HELLO3));
		let message = request(name)?;
		for _ in 0..count {
			call.send(message.clone())?;
		}
		call.close_send();
		Ok(reply(call.finish().await?)?.message)
	}

	/// `SayHello4`: streams `count` requests, then collects the replies.
	///
	/// # Errors
	///
	/// The status the call failed with.
	pub async fn say_hello4(&self, name: &str, count: usize) -> Result<Vec<String>, Status> {
		let mut call = self.client.bidi_streaming(&path(SAY_HELLO4));
		let message = request(name)?;
		for _ in 0..count {
			call.send(message.clone())?;
		}
		call.close_send();

		let mut replies = Vec::with_capacity(count);
		while let Some(bytes) = call.message().await? {
			replies.push(reply(Some(bytes))?.message);
		}
		call.finish().await?;
		Ok(replies)
	}
}

/// What one demo run observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoReport {
	/// `SayHello` reply.
	pub say_hello: String,
	/// `SayHelloFunc1` reply.
	pub func1: String,
	/// `SayHelloFunc2` reply.
	pub func2: String,
	/// Number of `SayHello2` replies.
	pub stream_replies: usize,
	/// `SayHello3` reply.
	pub client_stream: String,
	/// Number of `SayHello4` replies.
	pub bidi_replies: usize,
}

/// Calls every greeter method once.
///
/// # Errors
///
/// The first failed call's status.
pub async fn run(client: &GreeterClient, config: &DemoConfig) -> Result<DemoReport, Status> {
	let name = config.name.as_str();

	let say_hello = client.say_hello(name).await?;
	tracing::info!(reply = %say_hello, "demo.say_hello");

	let func1 = client.say_hello_func1(name).await?;
	let func2 = client.say_hello_func2(name).await?;
	tracing::info!(%func1, %func2, "demo.say_hello_func");

	let stream_replies = client.say_hello2(name).await?.len();
	tracing::info!(size = stream_replies, "demo.say_hello2");

	let client_stream = client.say_hello3(name, config.client_stream_messages).await?;
	tracing::info!(reply = %client_stream, "demo.say_hello3");

	let bidi_replies = client.say_hello4(name, config.bidi_messages).await?.len();
	tracing::info!(size = bidi_replies, "demo.say_hello4");

	Ok(DemoReport {
		say_hello,
		func1,
		func2,
		stream_replies,
		client_stream,
		bidi_replies,
	})
}
