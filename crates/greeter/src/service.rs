//! The `helloworld.Greeter` service.

use bytes::Bytes;
use cqrpc_dispatch::{Aggregator, BidiStreamingHandler, ClientStreamingHandler, Exchange, ReplyStream, Service, Status};

use crate::config::GreeterConfig;
use crate::proto::{HelloReply, HelloRequest, decode, encode};

/// Service name.
pub const SERVICE: &str = "helloworld.Greeter";

/// Unary greeting.
pub const SAY_HELLO: &str = "SayHello";
/// Unary, fixed reply.
pub const SAY_HELLO_FUNC1: &str = "SayHelloFunc1";
/// Unary, fixed reply.
pub const SAY_HELLO_FUNC2: &str = "SayHelloFunc2";
/// Server-streaming greeting.
pub const SAY_HELLO2: &str = "SayHello2";
/// Client-streaming greeting.
pub const SAY_HELLO3: &str = "SayHello3";
/// Bidirectional greeting.
pub const SAY_HELLO4: &str = "SayHello4";

/// Full method path for `method` on the greeter service.
pub fn path(method: &str) -> String {
	format!("/{SERVICE}/{method}")
}

fn reply(message: String) -> Result<Bytes, Status> {
	encode(&HelloReply { message }).map_err(|e| Status::internal(e.to_string()))
}

fn request(bytes: &[u8]) -> Result<HelloRequest, Status> {
	Ok(decode(bytes)?)
}

fn say_hello(bytes: Bytes) -> Result<Bytes, Status> {
	let HelloRequest { name } = request(&bytes)?;
	tracing::debug!(%name, "greeter.say_hello");
	reply(format!("Hello {name}"))
}

fn fixed(message: &'static str) -> impl Fn(Bytes) -> Result<Bytes, Status> + Send + Sync + 'static {
	move |bytes: Bytes| {
		request(&bytes)?;
		reply(message.to_owned())
	}
}

/// Replies with the last name received, once input ends.
struct LastName {
	last: Option<String>,
	received: usize,
}

impl Aggregator for LastName {
	fn push(&mut self, message: Bytes) -> Result<(), Status> {
		let HelloRequest { name } = request(&message)?;
		tracing::trace!(%name, "greeter.say_hello3.recv");
		self.last = Some(name);
		self.received += 1;
		Ok(())
	}

	fn finish(self: Box<Self>) -> Result<Bytes, Status> {
		let Some(name) = self.last else {
			return Err(Status::invalid_argument("SayHello3 needs at least one request"));
		};
		tracing::debug!(%name, received = self.received, "greeter.say_hello3");
		reply(format!("Hello3 {name}"))
	}
}

struct SayHello3;

impl ClientStreamingHandler for SayHello3 {
	fn start(&self) -> Box<dyn Aggregator> {
		Box::new(LastName { last: None, received: 0 })
	}
}

/// Answers every request with one greeting.
struct Echo;

impl Exchange for Echo {
	fn on_message(&mut self, message: Bytes) -> Result<Option<Bytes>, Status> {
		let HelloRequest { name } = request(&message)?;
		reply(format!("SayHello4 {name}")).map(Some)
	}
}

struct SayHello4;

impl BidiStreamingHandler for SayHello4 {
	fn start(&self) -> Box<dyn Exchange> {
		Box::new(Echo)
	}
}

/// Builds the greeter service.
pub fn greeter(config: &GreeterConfig) -> Service {
	let replies = config.stream_replies;
	let say_hello2 = move |bytes: Bytes| -> Result<ReplyStream, Status> {
		let HelloRequest { name } = request(&bytes)?;
		tracing::debug!(%name, replies, "greeter.say_hello2");
		let greeting = reply(format!("Hello2 {name}"))?;
		Ok(Box::new(std::iter::repeat_n(Ok::<_, Status>(greeting), replies)))
	};

	Service::new(SERVICE)
		.unary(SAY_HELLO, say_hello)
		.unary(SAY_HELLO_FUNC1, fixed("ST_HELLO_FUNC1 this is from server reply"))
		.unary(SAY_HELLO_FUNC2, fixed("ST_HELLO_FUNC2 this is from server reply"))
		.server_streaming(SAY_HELLO2, say_hello2)
		.client_streaming(SAY_HELLO3, SayHello3)
		.bidi_streaming(SAY_HELLO4, SayHello4)
}

#[cfg(test)]
mod tests {
	use cqrpc_dispatch::{Code, MethodTable};
	use pretty_assertions::assert_eq;

	use super::*;

	fn hello(name: &str) -> Bytes {
		encode(&HelloRequest::new(name)).expect("encode")
	}

	fn message(bytes: &[u8]) -> String {
		decode::<HelloReply>(bytes).expect("decode").message
	}

	#[test]
	fn registers_six_methods_under_one_service() {
		let table = MethodTable::new().with_service(greeter(&GreeterConfig::default())).expect("unique");

		assert_eq!(table.len(), 6);
		assert!(table.lookup("/helloworld.Greeter/SayHello4").is_some());
		assert_eq!(path(SAY_HELLO), "/helloworld.Greeter/SayHello");
	}

	#[test]
	fn say_hello_prefixes_name() {
		assert_eq!(message(&say_hello(hello("world")).expect("reply")), "Hello world");
	}

	#[test]
	fn garbage_request_is_invalid_argument() {
		let status = say_hello(Bytes::from_static(&[0xff])).expect_err("garbage");
		assert_eq!(status.code(), Code::InvalidArgument);
	}

	#[test]
	fn say_hello3_replies_with_last_name() {
		let mut agg = SayHello3.start();
		agg.push(hello("a")).expect("push");
		agg.push(hello("b")).expect("push");

		assert_eq!(message(&agg.finish().expect("reply")), "Hello3 b");
	}

	#[test]
	fn say_hello3_without_input_fails() {
		let status = SayHello3.start().finish().expect_err("empty");
		assert_eq!(status.code(), Code::InvalidArgument);
	}
}
