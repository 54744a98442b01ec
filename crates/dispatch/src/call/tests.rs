use std::sync::Arc;

use bytes::Bytes;
use cqrpc_queue::{CallToken, Completion, EventQueue, EventSender, QueueState};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use super::Phase;
use crate::dispatcher::Dispatcher;
use crate::method::{Aggregator, BidiStreamingHandler, ClientStreamingHandler, Exchange, MethodId, ReplyStream};
use crate::runtime::{AcceptedCall, CallRuntime, CallStream, RuntimeError, Slot};
use crate::service::{MethodDescriptor, MethodTable, Service};
use crate::{Code, Error, Server, ServerConfig, Status};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
	Accept(String, CallToken),
	Read(CallToken),
	Write(CallToken, Bytes),
	Finish(CallToken, Option<Bytes>, Status),
}

#[derive(Default)]
struct Log {
	ops: Vec<Op>,
	accepts: FxHashMap<CallToken, Slot<AcceptedCall>>,
	reads: FxHashMap<CallToken, Slot<Bytes>>,
	shutdowns: usize,
	serving: Vec<String>,
	refuse: Option<String>,
}

/// Runtime double that records every operation and leaves completions to
/// the test, except that shutdown fails pending accepts like a real runtime.
#[derive(Clone)]
struct Recorder {
	log: Arc<Mutex<Log>>,
	events: EventSender,
}

impl Recorder {
	fn ops(&self) -> Vec<Op> {
		self.log.lock().ops.clone()
	}

	fn last(&self) -> Option<Op> {
		self.log.lock().ops.last().cloned()
	}
}

impl CallRuntime for Recorder {
	fn begin_accept(&self, method: &MethodDescriptor, into: Slot<AcceptedCall>, token: CallToken) -> Result<(), RuntimeError> {
		let mut log = self.log.lock();
		if log.refuse.as_deref() == Some(method.path()) {
			return Err(RuntimeError::Rejected("refused".into()));
		}
		log.ops.push(Op::Accept(method.path().to_owned(), token));
		log.accepts.insert(token, into);
		Ok(())
	}

	fn serving(&self, methods: &MethodTable) {
		let mut log = self.log.lock();
		log.serving = methods.descriptors().map(|d| d.path().to_owned()).collect();
	}

	fn shutdown(&self) {
		let pending: Vec<CallToken> = {
			let mut log = self.log.lock();
			log.shutdowns += 1;
			log.accepts.drain().map(|(token, _)| token).collect()
		};
		for token in pending {
			let _ = self.events.submit(token, false);
		}
	}
}

struct RecordedStream {
	log: Arc<Mutex<Log>>,
}

impl CallStream for RecordedStream {
	fn read(&self, into: Slot<Bytes>, token: CallToken) {
		let mut log = self.log.lock();
		log.ops.push(Op::Read(token));
		log.reads.insert(token, into);
	}

	fn write(&self, message: Bytes, token: CallToken) {
		self.log.lock().ops.push(Op::Write(token, message));
	}

	fn finish(&self, reply: Option<Bytes>, status: Status, token: CallToken) {
		self.log.lock().ops.push(Op::Finish(token, reply, status));
	}
}

struct Concat(Vec<u8>);

impl Aggregator for Concat {
	fn push(&mut self, message: Bytes) -> Result<(), Status> {
		self.0.extend_from_slice(&message);
		Ok(())
	}

	fn finish(self: Box<Self>) -> Result<Bytes, Status> {
		Ok(Bytes::from(self.0))
	}
}

struct ConcatHandler;

impl ClientStreamingHandler for ConcatHandler {
	fn start(&self) -> Box<dyn Aggregator> {
		Box::new(Concat(Vec::new()))
	}
}

/// Answers every other message.
struct EveryOther(usize);

impl Exchange for EveryOther {
	fn on_message(&mut self, message: Bytes) -> Result<Option<Bytes>, Status> {
		self.0 += 1;
		Ok((self.0 % 2 == 1).then_some(message))
	}
}

struct EveryOtherHandler;

impl BidiStreamingHandler for EveryOtherHandler {
	fn start(&self) -> Box<dyn Exchange> {
		Box::new(EveryOther(0))
	}
}

fn hello(request: Bytes) -> Result<Bytes, Status> {
	if request.is_empty() {
		return Err(Status::invalid_argument("empty name"));
	}
	let mut reply = b"Hello ".to_vec();
	reply.extend_from_slice(&request);
	Ok(Bytes::from(reply))
}

fn counted(request: Bytes) -> Result<ReplyStream, Status> {
	let n: usize = std::str::from_utf8(&request)
		.ok()
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| Status::invalid_argument("not a count"))?;
	Ok(Box::new((0..n).map(|i| Ok::<_, Status>(Bytes::from(i.to_string())))))
}

fn methods() -> MethodTable {
	let service = Service::new("test.Svc")
		.unary("Hello", hello)
		.server_streaming("Count", counted)
		.client_streaming("Concat", ConcatHandler)
		.bidi_streaming("Echo", EveryOtherHandler);
	MethodTable::new().with_service(service).expect("unique paths")
}

struct Harness {
	server: Server,
	queue: EventQueue,
	runtime: Recorder,
	dispatcher: Dispatcher,
}

impl Harness {
	fn new() -> Self {
		Self::refusing(None)
	}

	fn refusing(path: Option<&str>) -> Self {
		let queue = EventQueue::new();
		let runtime = Recorder {
			log: Arc::new(Mutex::new(Log {
				refuse: path.map(str::to_owned),
				..Log::default()
			})),
			events: queue.sender(),
		};
		let server = Server::new(ServerConfig::default(), methods(), Arc::new(runtime.clone()), queue.clone());
		let dispatcher = server.dispatcher(0);
		Self {
			server,
			queue,
			runtime,
			dispatcher,
		}
	}

	fn arm_all(&self) {
		for method in self.server.methods().ids() {
			self.server.ensure_listening(method).expect("armed");
		}
	}

	fn method(&self, path: &str) -> MethodId {
		self.server.methods().lookup(path).expect("registered")
	}

	fn listener(&self, path: &str) -> CallToken {
		self.server.listener(self.method(path)).expect("listener armed")
	}

	/// Delivers an incoming call to the current listener of `path`.
	fn arrive(&self, path: &str, request: Option<&'static [u8]>) -> CallToken {
		let token = self.listener(path);
		let slot = self.runtime.log.lock().accepts.remove(&token).expect("pending accept");
		slot.fill(AcceptedCall {
			stream: Box::new(RecordedStream {
				log: Arc::clone(&self.runtime.log),
			}),
			request: request.map(Bytes::from_static),
		});
		self.complete(token, true);
		token
	}

	fn deliver(&self, token: CallToken, message: &'static [u8]) {
		let slot = self.runtime.log.lock().reads.remove(&token).expect("read outstanding");
		slot.fill(Bytes::from_static(message));
		self.complete(token, true);
	}

	fn complete(&self, token: CallToken, ok: bool) {
		self.dispatcher.dispatch(Completion::new(token, ok));
	}

	fn phase(&self, token: CallToken) -> Option<Phase> {
		self.server.calls().into_iter().find(|c| c.token == token).map(|c| c.phase)
	}

	fn creates(&self, method: MethodId) -> usize {
		self.server
			.calls()
			.iter()
			.filter(|c| c.method == method && c.phase == Phase::Create)
			.count()
	}
}

fn count(ops: &[Op], token: CallToken, pred: impl Fn(&Op) -> bool) -> usize {
	ops.iter()
		.filter(|op| match op {
			Op::Read(t) | Op::Write(t, _) | Op::Finish(t, ..) => *t == token,
			Op::Accept(..) => false,
		})
		.filter(|op| pred(op))
		.count()
}

#[test]
fn arming_leaves_one_listener_per_method() {
	let h = Harness::new();
	h.arm_all();

	let calls = h.server.calls();
	assert_eq!(calls.len(), 4);
	assert!(calls.iter().all(|c| c.phase == Phase::Create));
	for method in h.server.methods().ids() {
		assert_eq!(h.creates(method), 1);
		let armed = h.server.listener(method).expect("armed");
		assert_eq!(h.server.ensure_listening(method).expect("armed"), armed);
	}
	assert_eq!(h.server.listeners().len(), 4);
	assert_eq!(h.server.stats().created, 4);
}

#[test]
fn unary_call_replies_and_arms_one_sibling() {
	let h = Harness::new();
	h.arm_all();
	let method = h.method("/test.Svc/Hello");

	let token = h.arrive("/test.Svc/Hello", Some(b"world"));

	assert_eq!(
		h.runtime.last(),
		Some(Op::Finish(token, Some(Bytes::from_static(b"Hello world")), Status::ok()))
	);
	assert_eq!(h.phase(token), Some(Phase::Finish));
	let sibling = h.listener("/test.Svc/Hello");
	assert!(sibling > token);
	assert_eq!(h.creates(method), 1);

	h.complete(token, true);
	assert_eq!(h.phase(token), None);
	assert_eq!(h.creates(method), 1);

	let stats = h.server.stats();
	assert_eq!(stats.accepted, 1);
	assert_eq!(stats.finishes, 1);
	assert_eq!(stats.destroyed, 1);
	assert_eq!(stats.live(), 4);
}

#[test]
fn handler_error_is_sent_as_status() {
	let h = Harness::new();
	h.arm_all();

	let token = h.arrive("/test.Svc/Hello", Some(b""));

	let Some(Op::Finish(_, reply, status)) = h.runtime.last() else {
		panic!("expected finish");
	};
	assert_eq!(reply, None);
	assert_eq!(status.code(), Code::InvalidArgument);
	h.complete(token, true);
	assert_eq!(h.server.stats().aborted, 0);
}

#[test]
fn server_stream_writes_every_reply_without_reading() {
	let h = Harness::new();
	h.arm_all();

	let token = h.arrive("/test.Svc/Count", Some(b"1000"));
	while let Some(Op::Write(..)) = h.runtime.last() {
		assert_eq!(h.phase(token), Some(Phase::StreamWriting));
		h.complete(token, true);
	}

	let ops = h.runtime.ops();
	assert_eq!(count(&ops, token, |op| matches!(op, Op::Write(..))), 1000);
	assert_eq!(count(&ops, token, |op| matches!(op, Op::Read(_))), 0);
	assert_eq!(h.runtime.last(), Some(Op::Finish(token, None, Status::ok())));

	h.complete(token, true);
	assert_eq!(h.phase(token), None);
}

#[test]
fn client_stream_reads_until_end_of_input() {
	let h = Harness::new();
	h.arm_all();

	let token = h.arrive("/test.Svc/Concat", None);
	for _ in 0..10 {
		assert_eq!(h.phase(token), Some(Phase::StreamReading));
		h.deliver(token, b"ab");
	}
	h.complete(token, false);

	let ops = h.runtime.ops();
	assert_eq!(count(&ops, token, |op| matches!(op, Op::Read(_))), 11);
	assert_eq!(count(&ops, token, |op| matches!(op, Op::Write(..))), 0);
	assert_eq!(
		h.runtime.last(),
		Some(Op::Finish(token, Some(Bytes::from("ab".repeat(10))), Status::ok()))
	);
	h.complete(token, true);
	assert_eq!(h.phase(token), None);
}

#[test]
fn bidi_writes_at_most_once_per_message_and_ends_on_eof() {
	let h = Harness::new();
	h.arm_all();

	let token = h.arrive("/test.Svc/Echo", None);
	for _ in 0..5 {
		h.deliver(token, b"hi");
		if let Some(Op::Write(..)) = h.runtime.last() {
			h.complete(token, true);
		}
	}
	h.complete(token, false);

	let ops = h.runtime.ops();
	assert_eq!(count(&ops, token, |op| matches!(op, Op::Write(..))), 3);
	assert_eq!(h.runtime.last(), Some(Op::Finish(token, None, Status::ok())));

	h.complete(token, true);
	assert_eq!(h.phase(token), None);
	assert_eq!(count(&h.runtime.ops(), token, |_| true), count(&ops, token, |_| true));
}

#[test]
fn failed_write_destroys_without_reply() {
	let h = Harness::new();
	h.arm_all();

	let token = h.arrive("/test.Svc/Count", Some(b"3"));
	h.complete(token, false);

	assert_eq!(h.phase(token), None);
	let ops = h.runtime.ops();
	assert_eq!(count(&ops, token, |op| matches!(op, Op::Finish(..))), 0);
	assert_eq!(count(&ops, token, |op| matches!(op, Op::Write(..))), 1);
	assert_eq!(h.server.stats().aborted, 1);
}

#[test]
fn failed_unary_finish_still_destroys_the_call() {
	let h = Harness::new();
	h.arm_all();
	let method = h.method("/test.Svc/Hello");

	let token = h.arrive("/test.Svc/Hello", Some(b"gone"));
	assert_eq!(h.phase(token), Some(Phase::Finish));
	h.complete(token, false);

	assert_eq!(h.phase(token), None);
	assert_eq!(h.creates(method), 1);
	let ops = h.runtime.ops();
	assert_eq!(count(&ops, token, |op| matches!(op, Op::Finish(..))), 1);
	let stats = h.server.stats();
	assert_eq!(stats.finishes, 1);
	assert_eq!(stats.aborted, 0);
	assert_eq!(stats.destroyed, 1);
	assert_eq!(stats.live(), 4);
}

#[test]
fn failed_accept_rearms_the_method() {
	let h = Harness::new();
	h.arm_all();
	let method = h.method("/test.Svc/Hello");
	let first = h.listener("/test.Svc/Hello");

	h.complete(first, false);

	assert_eq!(h.phase(first), None);
	let second = h.listener("/test.Svc/Hello");
	assert_ne!(first, second);
	assert_eq!(h.creates(method), 1);
	assert_eq!(h.server.stats().accepted, 0);
}

#[test]
fn stale_tokens_are_ignored() {
	let h = Harness::new();
	h.arm_all();

	let token = h.arrive("/test.Svc/Hello", Some(b"x"));
	h.complete(token, true);
	let before = h.runtime.ops();

	h.complete(token, true);
	h.complete(token, false);
	h.complete(CallToken::from_raw(u64::MAX), true);

	assert_eq!(h.runtime.ops(), before);
	assert_eq!(h.server.stats().stale_events, 3);
	assert_eq!(h.server.calls().len(), 4);
}

#[test]
fn phases_only_move_forward() {
	use Phase::*;
	let all = [Create, Process, StreamReading, StreamWriting, Finish];
	for from in all {
		assert!(!from.may_advance_to(Create));
		assert!(!Finish.may_advance_to(from));
		assert_eq!(from.may_advance_to(Process), from == Create);
	}
	assert!(!Create.may_advance_to(Finish));
	assert!(Process.may_advance_to(Finish));
	assert!(StreamReading.may_advance_to(StreamWriting));
	assert!(StreamWriting.may_advance_to(StreamReading));
}

#[tokio::test]
async fn shutdown_twice_equals_once_and_drains() {
	let h = Harness::new();
	h.arm_all();
	let token = h.arrive("/test.Svc/Concat", None);

	h.server.shutdown();
	h.server.shutdown();

	assert!(h.server.is_shutting_down());
	assert_eq!(h.runtime.log.lock().shutdowns, 1);
	let method = h.method("/test.Svc/Hello");
	assert!(matches!(h.server.ensure_listening(method), Err(Error::ShuttingDown)));

	// The in-flight call keeps the queue open until it finishes.
	let Harness {
		server,
		queue,
		runtime,
		dispatcher,
	} = h;
	let worker = tokio::spawn(dispatcher.run());
	while server.calls().len() > 1 {
		tokio::task::yield_now().await;
	}
	assert_eq!(server.calls().iter().map(|c| c.token).collect::<Vec<_>>(), vec![token]);
	assert_eq!(queue.state(), QueueState::Open);

	let drain = server.dispatcher(1);
	drain.dispatch(Completion::new(token, false));
	drain.dispatch(Completion::new(token, true));

	worker.await.expect("join").expect("drained");
	assert_eq!(queue.state(), QueueState::Closed);
	assert!(server.calls().is_empty());
	assert!(server.listeners().is_empty());
	let accepts = runtime.ops().iter().filter(|op| matches!(op, Op::Accept(..))).count();
	assert_eq!(accepts, 5);
}

#[tokio::test]
async fn start_twice_is_rejected() {
	let h = Harness::new();
	h.server.shutdown();

	h.server.start().await.expect("nothing to drain");
	assert!(matches!(h.server.start().await, Err(Error::AlreadyStarted)));
	assert_eq!(h.queue.state(), QueueState::Closed);
}

#[tokio::test]
async fn refused_accept_shuts_down_and_drains() {
	let h = Harness::refusing(Some("/test.Svc/Count"));

	let err = h.server.start().await.expect_err("refused");

	assert!(matches!(err, Error::Accept { ref method, .. } if method == "/test.Svc/Count"));
	assert!(h.server.is_shutting_down());
	assert!(h.server.calls().is_empty());
	assert_eq!(h.queue.state(), QueueState::Closed);
	assert_eq!(h.server.stats().live(), 0);
	assert!(h.runtime.log.lock().serving.is_empty());
}

#[tokio::test]
async fn start_reports_served_methods_after_arming() {
	let h = Harness::new();
	let server = h.server.clone();
	let running = tokio::spawn(async move { server.start().await });

	while h.runtime.log.lock().serving.is_empty() {
		tokio::task::yield_now().await;
	}
	let mut served = h.runtime.log.lock().serving.clone();
	served.sort();
	assert_eq!(served, ["/test.Svc/Concat", "/test.Svc/Count", "/test.Svc/Echo", "/test.Svc/Hello"]);
	assert_eq!(h.server.listeners().len(), 4);

	h.server.shutdown();
	running.await.expect("join").expect("drained");
	assert!(h.server.calls().is_empty());
}
