//! Completion-driven RPC call dispatcher.
//!
//! Every in-flight call is a small state machine keyed by a [`CallToken`].
//! An external runtime performs the actual I/O and reports each finished
//! operation on an [`EventQueue`]; dispatcher workers pull those completions
//! and advance the owning call by exactly one transition.
//!
//! * [`Service`] / [`MethodTable`]: handlers for unary, server-streaming,
//!   client-streaming and bidirectional methods
//! * [`CallRuntime`] / [`CallStream`]: contract with the runtime
//! * [`Server`]: keeps one listener armed per method and runs the workers
//! * [`Dispatcher`]: one worker loop
//!
//! # Lock order
//!
//! call state, then registrar listeners, then the call registry. Nothing
//! holds a lock across an `.await`.

#![warn(missing_docs)]

mod call;
mod dispatcher;
mod error;
mod method;
mod registrar;
mod registry;
pub mod runtime;
mod server;
mod service;
mod stats;
mod status;

pub use call::{CallRecord, Phase};
pub use cqrpc_queue::{CallToken, Completion, EventQueue, EventReceiver, EventSender, QueueError, QueueState};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use method::{
	Aggregator, BidiStreamingHandler, ClientStreamingHandler, Exchange, MethodHandler, MethodId, MethodKind, ReplyStream, ServerStreamingHandler,
	UnaryHandler,
};
pub use runtime::{AcceptedCall, CallRuntime, CallStream, RuntimeError, Slot};
pub use server::{Server, ServerConfig};
pub use service::{MethodDescriptor, MethodTable, Service};
pub use stats::StatsSnapshot;
pub use status::{Code, Status};
