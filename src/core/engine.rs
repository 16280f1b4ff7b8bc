use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{Filter, Strategy};
use crate::core::compressor;
use crate::core::debouncer::Debouncer;
use crate::core::hasher;
use crate::core::version_store::VersionStore;
use crate::core::work_queue::{BackupTask, WorkQueue};
use crate::watcher::BackupListener;

/// File-watcher actions the engine admits. Anything else (delete, rename)
/// is ignored at `on_event` (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
	Created,
	Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
	Fresh,
	Running,
	Stopping,
	Stopped,
}

#[derive(Debug, Default)]
struct Counters {
	total_backups: AtomicU64,
	failed_backups: AtomicU64,
	skipped_backups: AtomicU64,
	compressed_backups: AtomicU64,
	total_bytes: AtomicU64,
}

/// A snapshot of one engine's counters, safe to read across threads at
/// any time (spec §4.6's "all counters are atomic scalars").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
	pub total_backups: u64,
	pub failed_backups: u64,
	pub skipped_backups: u64,
	pub compressed_backups: u64,
	pub total_bytes: u64,
}

/// `initial_retry_backoff_seconds`, doubling on every attempt (spec §3).
fn retry_backoff(initial_retry_backoff_seconds: u64, attempt_index: u32) -> Duration {
	let seconds = initial_retry_backoff_seconds.saturating_mul(1u64 << attempt_index.min(63));
	Duration::from_secs(seconds)
}

/// The per-source orchestrator: filter, debounce, enqueue, and a worker
/// pool that hashes, compresses, writes, retries, and garbage-collects
/// (spec §4.6). Owns its debounce map, hash cache, and queue, each behind
/// its own mutex.
pub struct BackupEngine {
	source_root: PathBuf,
	filter: Filter,
	strategy: Strategy,
	version_store: Arc<VersionStore>,
	debouncer: Arc<Debouncer>,
	last_hash_cache: Arc<Mutex<HashMap<PathBuf, String>>>,
	queue: Arc<WorkQueue>,
	counters: Arc<Counters>,
	state: Mutex<EngineState>,
	workers: Mutex<Vec<JoinHandle<()>>>,
	label: String,
}

impl BackupEngine {
	pub fn new(source_root: PathBuf, dest_base: PathBuf, filter: Filter, strategy: Strategy) -> Self {
		let label = source_root.display().to_string();
		Self {
			source_root,
			filter,
			debouncer: Arc::new(Debouncer::new(strategy.debounce_seconds)),
			strategy,
			version_store: Arc::new(VersionStore::new(dest_base)),
			last_hash_cache: Arc::new(Mutex::new(HashMap::new())),
			queue: Arc::new(WorkQueue::new()),
			counters: Arc::new(Counters::default()),
			state: Mutex::new(EngineState::Fresh),
			workers: Mutex::new(Vec::new()),
			label,
		}
	}

	pub fn source_root(&self) -> &Path {
		&self.source_root
	}

	/// Spawns `num_workers` threads running `pop_or_wait -> process`.
	/// Drives `Fresh -> Running`; a no-op if already running.
	pub fn start(&self, num_workers: usize) {
		let mut state = self.state.lock().expect("engine state mutex poisoned");
		if *state != EngineState::Fresh {
			return;
		}
		*state = EngineState::Running;
		drop(state);

		let mut workers = self.workers.lock().expect("workers mutex poisoned");
		for i in 0..num_workers {
			let queue = Arc::clone(&self.queue);
			let version_store = Arc::clone(&self.version_store);
			let last_hash_cache = Arc::clone(&self.last_hash_cache);
			let counters = Arc::clone(&self.counters);
			let source_root = self.source_root.clone();
			let filter = self.filter.clone();
			let strategy = self.strategy;
			let label = self.label.clone();

			let handle = thread::Builder::new()
				.name(format!("backupd-worker-{}-{i}", label))
				.spawn(move || {
					while let Some(task) = queue.pop_or_wait() {
						process_task(&task, &source_root, &filter, &strategy, &version_store, &last_hash_cache, &counters, &label, &queue);
					}
				})
				.expect("failed to spawn worker thread");
			workers.push(handle);
		}
	}

	/// Sets the stop flag, wakes every worker, and joins them. Safe to
	/// call twice and from a destructor (spec §4.6).
	pub fn stop(&self) {
		{
			let mut state = self.state.lock().expect("engine state mutex poisoned");
			if *state == EngineState::Stopped || *state == EngineState::Fresh {
				*state = EngineState::Stopped;
				return;
			}
			*state = EngineState::Stopping;
		}

		self.queue.stop();
		let mut workers = self.workers.lock().expect("workers mutex poisoned");
		for handle in workers.drain(..) {
			let _ = handle.join();
		}

		*self.state.lock().expect("engine state mutex poisoned") = EngineState::Stopped;
	}

	pub fn worker_count(&self) -> usize {
		self.workers.lock().expect("workers mutex poisoned").len()
	}

	/// Entry point from the watcher. Must return quickly: filter and
	/// debounce only, no I/O (spec §5).
	pub fn on_event(&self, dir: &Path, filename: &str, action: FileAction) {
		if *self.state.lock().expect("engine state mutex poisoned") != EngineState::Running {
			return;
		}

		let path = dir.join(filename);
		if path.is_dir() {
			return;
		}
		let _ = action; // Created and Modified are both admitted identically.

		if !self.filter.allows(filename) {
			return;
		}

		if !self.debouncer.should_accept(&path) {
			return;
		}

		self.queue.push(BackupTask::new(path));
	}

	pub fn counters(&self) -> CounterSnapshot {
		CounterSnapshot {
			total_backups: self.counters.total_backups.load(Ordering::Relaxed),
			failed_backups: self.counters.failed_backups.load(Ordering::Relaxed),
			skipped_backups: self.counters.skipped_backups.load(Ordering::Relaxed) + self.debouncer.skipped_count(),
			compressed_backups: self.counters.compressed_backups.load(Ordering::Relaxed),
			total_bytes: self.counters.total_bytes.load(Ordering::Relaxed),
		}
	}

	pub fn total_backup_size(&self) -> u64 {
		self.version_store.total_backup_size()
	}
}

impl Drop for BackupEngine {
	fn drop(&mut self) {
		self.stop();
	}
}

/// The watcher drives the engine through this narrow capability rather
/// than a downcast or class hierarchy (spec §9). Delegates to the
/// inherent `on_event`.
impl BackupListener for BackupEngine {
	fn on_event(&self, dir: &Path, filename: &str, action: FileAction) {
		BackupEngine::on_event(self, dir, filename, action)
	}
}

/// Implements the 11-step worker body of spec §4.6, minus directory-event
/// filtering (already handled in `on_event`).
#[allow(clippy::too_many_arguments)]
fn process_task(
	task: &BackupTask,
	source_root: &Path,
	filter: &Filter,
	strategy: &Strategy,
	version_store: &VersionStore,
	last_hash_cache: &Mutex<HashMap<PathBuf, String>>,
	counters: &Counters,
	label: &str,
	queue: &WorkQueue,
) {
	let path = &task.source_file_path;

	let metadata = match fs::metadata(path) {
		Ok(metadata) if metadata.is_file() => metadata,
		_ => return,
	};

	let filename = match path.file_name().and_then(|n| n.to_str()) {
		Some(name) => name,
		None => return,
	};
	if !filter.allows(filename) {
		return;
	}

	let size = metadata.len();
	if size > strategy.max_file_bytes {
		warn!(label, ?path, size, limit = strategy.max_file_bytes, "file exceeds size limit, skipping");
		return;
	}

	if !drive_mounted(version_store.dest_base()) {
		warn!(label, dest_base = %version_store.dest_base().display(), "destination drive unavailable, skipping this backup");
		return;
	}

	let relpath = match path.strip_prefix(source_root) {
		Ok(rel) => rel.to_path_buf(),
		Err(_) => path.clone(),
	};

	let current_hash = match hasher::hash_file(path) {
		Some(hash) => hash,
		None => {
			error!(label, ?path, "could not compute hash, counting as failed backup");
			counters.failed_backups.fetch_add(1, Ordering::Relaxed);
			return;
		}
	};

	{
		let cache = last_hash_cache.lock().expect("hash cache mutex poisoned");
		if cache.get(&relpath) == Some(&current_hash) {
			debug!(label, ?relpath, "content unchanged since last backup, skipping");
			counters.skipped_backups.fetch_add(1, Ordering::Relaxed);
			return;
		}
	}

	let (dir, timestamp) = match version_store.artifact_dir(&relpath) {
		Ok(pair) => pair,
		Err(error) => {
			error!(label, ?relpath, %error, "could not create destination directory");
			counters.failed_backups.fetch_add(1, Ordering::Relaxed);
			return;
		}
	};

	let should_compress = compressor::should_compress(&relpath, size, strategy.compression_enabled, strategy.compression_min_bytes);
	let mut dest_path = VersionStore::artifact_path(&dir, &relpath, &timestamp, should_compress);

	let mut succeeded = false;
	let mut compressed = false;
	let mut abandoned_for_shutdown = false;

	// Bounded retry budget per spec §5: backoff doubles from
	// `initial_retry_backoff_seconds` on every failed attempt
	// (1, 2, 4, 8, 16 seconds at the defaults, summing to 31s). Checked
	// against the queue's stop flag between sleeps so a shutdown doesn't
	// have to wait out a task's whole retry budget (spec §5's
	// cancellation note).
	for attempt in 0..strategy.max_retries.max(1) {
		dest_path = VersionStore::artifact_path(&dir, &relpath, &timestamp, should_compress);
		let outcome = if should_compress {
			match compressor::compress_file(path, &dest_path, strategy.compression_level) {
				Some(()) => {
					compressed = true;
					Ok(())
				}
				None => {
					warn!(label, ?path, "compression failed, falling back to plain copy");
					dest_path = VersionStore::artifact_path(&dir, &relpath, &timestamp, false);
					fs::copy(path, &dest_path).map(|_| ())
				}
			}
		} else {
			fs::copy(path, &dest_path).map(|_| ())
		};

		match outcome {
			Ok(()) => {
				succeeded = true;
				break;
			}
			Err(error) => {
				if queue.is_stopped() {
					debug!(label, ?path, "engine stopping, abandoning retry early");
					abandoned_for_shutdown = true;
					break;
				}
				let backoff = retry_backoff(strategy.initial_retry_backoff_seconds, attempt);
				warn!(label, ?path, %error, backoff = %humantime::format_duration(backoff), attempt, "file busy, retrying after backoff");
				thread::sleep(backoff);
				if queue.is_stopped() {
					debug!(label, ?path, "engine stopped mid-backoff, abandoning retry");
					abandoned_for_shutdown = true;
					break;
				}
				if attempt + 1 >= strategy.max_retries {
					error!(label, ?path, "backup failed after exhausting retries");
				}
			}
		}
	}

	if !succeeded {
		if !abandoned_for_shutdown {
			counters.failed_backups.fetch_add(1, Ordering::Relaxed);
		}
		return;
	}

	counters.total_backups.fetch_add(1, Ordering::Relaxed);
	counters.total_bytes.fetch_add(size, Ordering::Relaxed);
	if compressed {
		counters.compressed_backups.fetch_add(1, Ordering::Relaxed);
	}

	last_hash_cache
		.lock()
		.expect("hash cache mutex poisoned")
		.insert(relpath.clone(), current_hash);

	let deleted = version_store.cleanup_old_versions(&relpath, strategy.retention_days, strategy.max_versions_per_file);
	if deleted > 0 {
		debug!(label, ?relpath, deleted, "cleaned up old versions");
	}

	info!(label, ?relpath, dest = %dest_path.display(), compressed, "backup complete");
}

fn drive_mounted(dest_base: &Path) -> bool {
	dest_base.exists() || dest_base.parent().is_some_and(|parent| parent.exists())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::File;
	use std::io::Write;
	use std::sync::Arc;

	fn write_source(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
		let path = dir.join(name);
		let mut f = File::create(&path).unwrap();
		f.write_all(contents).unwrap();
		path
	}

	#[test]
	fn retry_backoff_doubles_from_the_configured_initial_value() {
		assert_eq!(retry_backoff(1, 0), Duration::from_secs(1));
		assert_eq!(retry_backoff(1, 1), Duration::from_secs(2));
		assert_eq!(retry_backoff(1, 4), Duration::from_secs(16));
		assert_eq!(retry_backoff(2, 0), Duration::from_secs(2));
		assert_eq!(retry_backoff(2, 3), Duration::from_secs(16));
	}

	#[test]
	fn retry_backoff_budget_across_five_attempts_is_31_seconds() {
		let total: Duration = (0..5).map(|attempt| retry_backoff(1, attempt)).sum();
		assert_eq!(total, Duration::from_secs(31));
	}

	#[test]
	fn on_event_while_not_running_is_a_no_op() {
		let source = tempfile::tempdir().unwrap();
		let dest = tempfile::tempdir().unwrap();
		let engine = BackupEngine::new(source.path().to_path_buf(), dest.path().to_path_buf(), Filter::None, Strategy::default());

		write_source(source.path(), "a.txt", b"hello");
		engine.on_event(source.path(), "a.txt", FileAction::Modified);

		assert_eq!(engine.counters().total_backups, 0);
	}

	#[test]
	fn full_cycle_backs_up_and_dedups() {
		let source = tempfile::tempdir().unwrap();
		let dest = tempfile::tempdir().unwrap();
		let mut strategy = Strategy::default();
		strategy.compression_enabled = false;
		strategy.debounce_seconds = 0;

		let engine = Arc::new(BackupEngine::new(source.path().to_path_buf(), dest.path().to_path_buf(), Filter::None, strategy));
		engine.start(1);

		write_source(source.path(), "a.txt", b"hello world");
		engine.on_event(source.path(), "a.txt", FileAction::Created);

		for _ in 0..100 {
			if engine.counters().total_backups == 1 {
				break;
			}
			thread::sleep(Duration::from_millis(20));
		}
		assert_eq!(engine.counters().total_backups, 1);

		// Re-firing with unchanged content should dedup, not create a new artifact.
		engine.on_event(source.path(), "a.txt", FileAction::Modified);
		for _ in 0..100 {
			if engine.counters().skipped_backups >= 1 {
				break;
			}
			thread::sleep(Duration::from_millis(20));
		}
		assert_eq!(engine.counters().total_backups, 1);

		engine.stop();
		assert_eq!(engine.worker_count(), 0);
	}

	#[test]
	fn stop_is_idempotent() {
		let source = tempfile::tempdir().unwrap();
		let dest = tempfile::tempdir().unwrap();
		let engine = BackupEngine::new(source.path().to_path_buf(), dest.path().to_path_buf(), Filter::None, Strategy::default());
		engine.start(2);
		engine.stop();
		engine.stop();
		assert_eq!(engine.worker_count(), 0);
	}

	#[test]
	fn oversize_file_is_skipped_without_counting_as_failed() {
		let source = tempfile::tempdir().unwrap();
		let dest = tempfile::tempdir().unwrap();
		let mut strategy = Strategy::default();
		strategy.max_file_bytes = 4;
		strategy.debounce_seconds = 0;

		let engine = Arc::new(BackupEngine::new(source.path().to_path_buf(), dest.path().to_path_buf(), Filter::None, strategy));
		engine.start(1);

		write_source(source.path(), "big.txt", b"way too big for the limit");
		engine.on_event(source.path(), "big.txt", FileAction::Modified);
		thread::sleep(Duration::from_millis(100));

		let counters = engine.counters();
		assert_eq!(counters.total_backups, 0);
		assert_eq!(counters.failed_backups, 0);
		engine.stop();
	}
}
