//! Greeter messages and their postcard encoding.

use bytes::Bytes;
use cqrpc_dispatch::Status;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request carrying the name to greet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HelloRequest {
	/// Name to greet.
	pub name: String,
}

impl HelloRequest {
	/// Creates a request for `name`.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into() }
	}
}

/// Reply carrying the greeting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HelloReply {
	/// Greeting text.
	pub message: String,
}

impl HelloReply {
	/// Creates a reply.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// A message could not be encoded or decoded.
#[derive(Debug, Error)]
#[error("malformed message: {0}")]
pub struct CodecError(#[from] postcard::Error);

impl From<CodecError> for Status {
	fn from(error: CodecError) -> Self {
		Status::invalid_argument(error.to_string())
	}
}

/// Encodes a message.
///
/// # Errors
///
/// Fails only if `value` cannot be represented by postcard.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, CodecError> {
	Ok(Bytes::from(postcard::to_allocvec(value)?))
}

/// Decodes a message.
///
/// # Errors
///
/// Returns [`CodecError`] for truncated or malformed input.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
	Ok(postcard::from_bytes(bytes)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn truncated_input_is_invalid_argument() {
		let bytes = encode(&HelloRequest::new("world")).expect("encode");

		let err = decode::<HelloRequest>(&bytes[..bytes.len() - 1]).expect_err("truncated");
		let status = Status::from(err);

		assert_eq!(status.code(), cqrpc_dispatch::Code::InvalidArgument);
	}

	#[test]
	fn request_survives_encoding() {
		let request = HelloRequest::new("wörld");
		let bytes = encode(&request).expect("encode");
		assert_eq!(decode::<HelloRequest>(&bytes).expect("decode"), request);
	}
}
