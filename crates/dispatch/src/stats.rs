use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing dispatcher activity.
#[derive(Debug, Default)]
pub(crate) struct DispatchStats {
	created: AtomicU64,
	destroyed: AtomicU64,
	accepted: AtomicU64,
	aborted: AtomicU64,
	stale_events: AtomicU64,
	transitions: AtomicU64,
	reads: AtomicU64,
	writes: AtomicU64,
	finishes: AtomicU64,
}

macro_rules! bump {
	($($name:ident => $field:ident),* $(,)?) => {
		$(
			pub(crate) fn $name(&self) {
				self.$field.fetch_add(1, Ordering::Relaxed);
			}
		)*
	};
}

impl DispatchStats {
	bump! {
		created => created,
		destroyed => destroyed,
		accepted => accepted,
		aborted => aborted,
		stale_event => stale_events,
		transition => transitions,
		read => reads,
		write => writes,
		finish => finishes,
	}

	pub(crate) fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			created: self.created.load(Ordering::Relaxed),
			destroyed: self.destroyed.load(Ordering::Relaxed),
			accepted: self.accepted.load(Ordering::Relaxed),
			aborted: self.aborted.load(Ordering::Relaxed),
			stale_events: self.stale_events.load(Ordering::Relaxed),
			transitions: self.transitions.load(Ordering::Relaxed),
			reads: self.reads.load(Ordering::Relaxed),
			writes: self.writes.load(Ordering::Relaxed),
			finishes: self.finishes.load(Ordering::Relaxed),
		}
	}
}

/// Point-in-time copy of the dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
	/// Call states allocated (listeners armed).
	pub created: u64,
	/// Call states removed from the registry.
	pub destroyed: u64,
	/// Accepts that delivered a call.
	pub accepted: u64,
	/// Calls torn down by a failed completion without finishing.
	pub aborted: u64,
	/// Completions whose token resolved to no live call.
	pub stale_events: u64,
	/// Phase changes across all calls.
	pub transitions: u64,
	/// Read operations issued.
	pub reads: u64,
	/// Write operations issued.
	pub writes: u64,
	/// Finish operations issued.
	pub finishes: u64,
}

impl StatsSnapshot {
	/// Call states currently alive.
	pub fn live(&self) -> u64 {
		self.created.saturating_sub(self.destroyed)
	}
}
