//! Greeter service served by the cqrpc dispatcher.
//!
//! * [`service::greeter`]: unary, server-streaming, client-streaming and
//!   bidirectional greeting methods
//! * [`demo`]: typed client and the demo run
//! * [`config`]: TOML configuration
//! * [`GreeterApp`]: server and in-process runtime wired together

#![warn(missing_docs)]

pub mod config;
pub mod demo;
pub mod proto;
pub mod service;

use std::sync::Arc;

// Used by the binary.
use clap as _;
use tracing_subscriber as _;

use cqrpc_dispatch::{EventQueue, MethodTable, Server};
use cqrpc_mem::MemRuntime;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::demo::GreeterClient;

/// The greeter service on a [`Server`] backed by a [`MemRuntime`].
#[derive(Debug, Clone)]
pub struct GreeterApp {
	server: Server,
	runtime: MemRuntime,
}

impl GreeterApp {
	/// Builds the method table and wires the server to a fresh runtime.
	///
	/// # Errors
	///
	/// [`cqrpc_dispatch::Error::DuplicateMethod`] if the service table is
	/// inconsistent.
	pub fn new(config: &Config) -> cqrpc_dispatch::Result<Self> {
		let methods = MethodTable::new().with_service(service::greeter(&config.greeter))?;
		let queue = EventQueue::new();
		let runtime = MemRuntime::new(queue.sender());
		let server = Server::new(config.server.clone(), methods, Arc::new(runtime.clone()), queue);
		Ok(Self { server, runtime })
	}

	/// Starts the server on the current tokio runtime. The task ends once
	/// [`shutdown`](Self::shutdown) has drained every call.
	pub fn spawn(&self) -> JoinHandle<cqrpc_dispatch::Result<()>> {
		let server = self.server.clone();
		tokio::spawn(async move { server.start().await })
	}

	/// Returns a typed client.
	pub fn client(&self) -> GreeterClient {
		GreeterClient::new(self.runtime.client())
	}

	/// Requests a graceful shutdown.
	pub fn shutdown(&self) {
		self.server.shutdown();
	}

	/// The underlying server.
	pub fn server(&self) -> &Server {
		&self.server
	}

	/// The in-process runtime.
	pub fn runtime(&self) -> &MemRuntime {
		&self.runtime
	}
}
