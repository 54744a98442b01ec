use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation token linking a completion back to the call awaiting it.
///
/// Tokens come from a [`TokenClock`] and are never reused, so a completion
/// carrying the token of a destroyed call can only miss on lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallToken(u64);

impl CallToken {
	/// Rebuilds a token from its raw value.
	///
	/// Runtimes that carry tokens across an FFI or process boundary use this
	/// to hand them back.
	pub const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	/// Returns the raw token value.
	pub const fn into_raw(self) -> u64 {
		self.0
	}
}

impl fmt::Display for CallToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "call#{}", self.0)
	}
}

/// Monotonic token source. The first token is `call#1`.
#[derive(Debug, Default, Clone)]
pub struct TokenClock {
	next: Arc<AtomicU64>,
}

impl TokenClock {
	/// Creates a new clock.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next unused token. Takes `&self` so clones share one
	/// sequence, which rules out `Iterator`.
	pub fn next(&self) -> CallToken {
		CallToken(self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokens_are_monotonic_across_clones() {
		let clock = TokenClock::new();
		let other = clock.clone();

		let a = clock.next();
		let b = other.next();
		let c = clock.next();

		assert_eq!(a.into_raw(), 1);
		assert!(a < b && b < c);
		assert_eq!(c.to_string(), "call#3");
	}

	#[test]
	fn concurrent_clocks_never_hand_out_duplicates() {
		let clock = TokenClock::new();
		let handles: Vec<_> = (0..4)
			.map(|_| {
				let clock = clock.clone();
				std::thread::spawn(move || (0..500).map(|_| clock.next()).collect::<Vec<_>>())
			})
			.collect();

		let mut all: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
		all.sort();
		all.dedup();
		assert_eq!(all.len(), 2_000);
	}
}
