//! Completion event queue for asynchronous call dispatch.
//!
//! An external RPC runtime reports every finished operation (accept, read,
//! write, finish) as a [`Completion`]: the [`CallToken`] the operation was
//! issued under plus a success flag. Dispatcher workers pull completions from
//! the queue and advance the call that owns the token.
//!
//! * [`EventQueue`]: unbounded multi-producer/multi-consumer queue with an
//!   `Open -> ShuttingDown -> Closed` lifecycle
//! * [`EventSender`] / [`EventReceiver`]: producer and consumer halves
//! * [`TokenClock`]: monotonic source of never-reused [`CallToken`]s

#![warn(missing_docs)]

mod error;
mod queue;
mod token;

pub use error::QueueError;
pub use queue::{Completion, EventQueue, EventReceiver, EventSender, QueueState};
pub use token::{CallToken, TokenClock};
