//! Service registration and the flattened method table.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::method::{BidiStreamingHandler, ClientStreamingHandler, MethodHandler, MethodId, MethodKind, ServerStreamingHandler, UnaryHandler};
use crate::{Error, Result};

/// Identity of one servable method, as handed to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
	id: MethodId,
	path: String,
	kind: MethodKind,
}

impl MethodDescriptor {
	/// Table index.
	pub fn id(&self) -> MethodId {
		self.id
	}

	/// Fully qualified path, `/<service>/<method>`.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Cardinality.
	pub fn kind(&self) -> MethodKind {
		self.kind
	}
}

/// A named group of method handlers.
///
/// ```ignore
/// let service = Service::new("helloworld.Greeter")
/// 	.unary("SayHello", |req: Bytes| Ok(req));
/// ```
#[derive(Debug)]
pub struct Service {
	name: String,
	methods: Vec<(String, MethodHandler)>,
}

impl Service {
	/// Creates an empty service.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			methods: Vec::new(),
		}
	}

	/// Returns the service name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Adds a handler of any kind.
	#[must_use]
	pub fn method(mut self, name: impl Into<String>, handler: MethodHandler) -> Self {
		self.methods.push((name.into(), handler));
		self
	}

	/// Adds a unary method.
	#[must_use]
	pub fn unary(self, name: impl Into<String>, handler: impl UnaryHandler) -> Self {
		self.method(name, MethodHandler::Unary(Arc::new(handler)))
	}

	/// Adds a server-streaming method.
	#[must_use]
	pub fn server_streaming(self, name: impl Into<String>, handler: impl ServerStreamingHandler) -> Self {
		self.method(name, MethodHandler::ServerStreaming(Arc::new(handler)))
	}

	/// Adds a client-streaming method.
	#[must_use]
	pub fn client_streaming(self, name: impl Into<String>, handler: impl ClientStreamingHandler) -> Self {
		self.method(name, MethodHandler::ClientStreaming(Arc::new(handler)))
	}

	/// Adds a bidirectional-streaming method.
	#[must_use]
	pub fn bidi_streaming(self, name: impl Into<String>, handler: impl BidiStreamingHandler) -> Self {
		self.method(name, MethodHandler::BidiStreaming(Arc::new(handler)))
	}
}

#[derive(Debug, Clone)]
pub(crate) struct MethodEntry {
	pub(crate) descriptor: MethodDescriptor,
	pub(crate) handler: MethodHandler,
}

/// Every servable method, indexed by [`MethodId`].
#[derive(Debug, Default, Clone)]
pub struct MethodTable {
	entries: Vec<MethodEntry>,
	by_path: FxHashMap<String, MethodId>,
}

impl MethodTable {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends all methods of `service`.
	///
	/// # Errors
	///
	/// Returns [`Error::DuplicateMethod`] if a path is already registered; the
	/// table is left unchanged in that case.
	pub fn add_service(&mut self, service: Service) -> Result<()> {
		let paths: Vec<String> = service.methods.iter().map(|(name, _)| format!("/{}/{}", service.name, name)).collect();
		for (i, path) in paths.iter().enumerate() {
			if self.by_path.contains_key(path) || paths[..i].contains(path) {
				return Err(Error::DuplicateMethod(path.clone()));
			}
		}

		for (path, (_, handler)) in paths.into_iter().zip(service.methods) {
			let id = MethodId(self.entries.len() as u32);
			tracing::debug!(%id, path, kind = handler.kind().as_str(), "service.register");
			self.by_path.insert(path.clone(), id);
			self.entries.push(MethodEntry {
				descriptor: MethodDescriptor {
					id,
					path,
					kind: handler.kind(),
				},
				handler,
			});
		}
		Ok(())
	}

	/// Builder form of [`add_service`](Self::add_service).
	///
	/// # Errors
	///
	/// See [`add_service`](Self::add_service).
	pub fn with_service(mut self, service: Service) -> Result<Self> {
		self.add_service(service)?;
		Ok(self)
	}

	/// Returns the number of methods.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns `true` when no method is registered.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Iterates method ids in registration order.
	pub fn ids(&self) -> impl Iterator<Item = MethodId> + '_ {
		self.entries.iter().map(|e| e.descriptor.id)
	}

	/// Iterates descriptors in registration order.
	pub fn descriptors(&self) -> impl Iterator<Item = &MethodDescriptor> {
		self.entries.iter().map(|e| &e.descriptor)
	}

	/// Returns the descriptor for `id`.
	pub fn descriptor(&self, id: MethodId) -> Option<&MethodDescriptor> {
		self.entry(id).map(|e| &e.descriptor)
	}

	/// Resolves a `/<service>/<method>` path.
	pub fn lookup(&self, path: &str) -> Option<MethodId> {
		self.by_path.get(path).copied()
	}

	pub(crate) fn entry(&self, id: MethodId) -> Option<&MethodEntry> {
		self.entries.get(id.index())
	}
}

#[cfg(test)]
mod tests {
	use bytes::Bytes;

	use super::*;
	use crate::Status;

	fn echo(req: Bytes) -> std::result::Result<Bytes, Status> {
		Ok(req)
	}

	#[test]
	fn methods_get_sequential_ids_and_paths() {
		let table = MethodTable::new()
			.with_service(Service::new("demo.A").unary("One", echo).unary("Two", echo))
			.unwrap()
			.with_service(Service::new("demo.B").unary("One", echo))
			.unwrap();

		assert_eq!(table.len(), 3);
		let paths: Vec<_> = table.descriptors().map(|d| d.path().to_owned()).collect();
		assert_eq!(paths, ["/demo.A/One", "/demo.A/Two", "/demo.B/One"]);
		assert_eq!(table.lookup("/demo.B/One").map(MethodId::index), Some(2));
		assert_eq!(table.descriptor(MethodId(1)).map(MethodDescriptor::kind), Some(MethodKind::Unary));
	}

	#[test]
	fn duplicate_paths_are_rejected_atomically() {
		let mut table = MethodTable::new().with_service(Service::new("demo.A").unary("One", echo)).unwrap();

		let err = table
			.add_service(Service::new("demo.A").unary("Fresh", echo).unary("One", echo))
			.unwrap_err();
		assert!(matches!(err, Error::DuplicateMethod(path) if path == "/demo.A/One"));
		assert_eq!(table.len(), 1);
		assert_eq!(table.lookup("/demo.A/Fresh"), None);
	}
}
