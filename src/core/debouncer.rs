use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-engine "last emitted" gate (spec §4.4). The map is never pruned —
/// its footprint is bounded by the number of distinct relative paths the
/// engine has ever observed in the process lifetime.
pub struct Debouncer {
	last_emitted: Mutex<HashMap<PathBuf, Instant>>,
	cooldown: Duration,
	skipped: AtomicU64,
}

impl Debouncer {
	pub fn new(debounce_seconds: u64) -> Self {
		Self {
			last_emitted: Mutex::new(HashMap::new()),
			cooldown: Duration::from_secs(debounce_seconds),
			skipped: AtomicU64::new(0),
		}
	}

	/// Records `path` as emitted at "now" and returns whether the task
	/// should be admitted. Updates the timestamp at call time regardless
	/// of outcome for an accepted path — the window measures arrival, not
	/// completion (spec §3's invariant).
	pub fn should_accept(&self, path: &std::path::Path) -> bool {
		let now = Instant::now();
		let mut guard = self.last_emitted.lock().expect("debounce mutex poisoned");

		match guard.get(path) {
			Some(&last) if now.duration_since(last) < self.cooldown => {
				self.skipped.fetch_add(1, Ordering::Relaxed);
				false
			}
			_ => {
				guard.insert(path.to_path_buf(), now);
				true
			}
		}
	}

	pub fn skipped_count(&self) -> u64 {
		self.skipped.load(Ordering::Relaxed)
	}
}
