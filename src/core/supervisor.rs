use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::core::engine::{BackupEngine, CounterSnapshot};
use crate::error::WatchError;
use crate::watcher::RecursiveWatcher;

const WORKERS_PER_ENGINE: usize = 2;

/// Owns every `(source, engine)` pair plus the shared recursive watcher
/// (spec §4.7). Construction does not touch the filesystem; `start`
/// does: it skips sources whose root is missing or disabled, logging a
/// warning for each, and only registers the survivors with the watcher.
pub struct Supervisor {
	engines: Vec<Arc<BackupEngine>>,
	watcher: Option<RecursiveWatcher>,
}

impl Supervisor {
	/// Builds one engine per enabled, present source. Does not start
	/// workers or the watcher yet — call `start` for that.
	pub fn new(config: &Config) -> Self {
		let mut engines = Vec::new();

		for source in &config.backup_sources {
			if !source.enabled {
				info!(path = %source.path.display(), "source disabled in config, skipping");
				continue;
			}
			if !source.path.exists() {
				warn!(path = %source.path.display(), "configured source path does not exist, skipping");
				continue;
			}

			engines.push(Arc::new(BackupEngine::new(
				source.path.clone(),
				config.backup_destination_base.clone(),
				source.filter.clone(),
				config.strategy,
			)));
		}

		Self { engines, watcher: None }
	}

	pub fn usable_source_count(&self) -> usize {
		self.engines.len()
	}

	/// Starts every engine's worker pool, then registers each source's
	/// root with a single recursive watcher (spec §4.7's ordering:
	/// engine before watch registration, so no event can race a
	/// not-yet-running engine).
	pub fn start(&mut self) -> Result<(), WatchError> {
		for engine in &self.engines {
			engine.start(WORKERS_PER_ENGINE);
			info!(path = %engine.source_root().display(), "watching");
		}

		let roots = self
			.engines
			.iter()
			.map(|engine| (engine.source_root().to_path_buf(), Arc::clone(engine) as Arc<dyn crate::watcher::BackupListener>))
			.collect();

		self.watcher = Some(RecursiveWatcher::start(roots)?);
		Ok(())
	}

	/// Stops the watcher first (so no further events are dispatched),
	/// then stops every engine in turn (spec §4.7).
	pub fn stop(&mut self) {
		if let Some(mut watcher) = self.watcher.take() {
			watcher.stop();
		}
		for engine in &self.engines {
			engine.stop();
		}
	}

	/// Sums every engine's counters (spec §4.7's "aggregated counters").
	pub fn aggregated_counters(&self) -> CounterSnapshot {
		self.engines.iter().map(|engine| engine.counters()).fold(CounterSnapshot::default(), |acc, next| CounterSnapshot {
			total_backups: acc.total_backups + next.total_backups,
			failed_backups: acc.failed_backups + next.failed_backups,
			skipped_backups: acc.skipped_backups + next.skipped_backups,
			compressed_backups: acc.compressed_backups + next.compressed_backups,
			total_bytes: acc.total_bytes + next.total_bytes,
		})
	}

	/// Sum of on-disk backup size across every engine's destination
	/// subtree (spec §SPEC_FULL D).
	pub fn total_backup_size(&self) -> u64 {
		self.engines.iter().map(|engine| engine.total_backup_size()).sum()
	}
}
