//! In-process call runtime for the cqrpc dispatcher.
//!
//! [`MemRuntime`] implements [`CallRuntime`](cqrpc_dispatch::CallRuntime) by
//! pairing armed accepts with calls started through a [`MemClient`]. Messages
//! move between tasks as [`Bytes`](bytes::Bytes); there is no wire format.
//! Every operation the dispatcher issues completes by posting to the event
//! queue, exactly as a networked runtime would.

#![warn(missing_docs)]

mod client;
mod link;
mod runtime;


pub use client::{ClientCall, MemClient};
pub use runtime::MemRuntime;
