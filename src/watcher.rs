use std::path::Path;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use notify::{Event, EventKind, ModifyKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, warn};

use crate::core::FileAction;
use crate::error::WatchError;

/// The narrow capability the filesystem watcher drives — no class
/// hierarchy or downcast is needed, just this one method (spec §9's
/// "Polymorphism over a callback interface"). `BackupEngine` implements
/// it directly.
pub trait BackupListener: Send + Sync {
	fn on_event(&self, dir: &Path, filename: &str, action: FileAction);
}

impl<T: BackupListener + ?Sized> BackupListener for std::sync::Arc<T> {
	fn on_event(&self, dir: &Path, filename: &str, action: FileAction) {
		(**self).on_event(dir, filename, action)
	}
}

/// Recursive, multi-root filesystem watcher bridging `notify` events to
/// a set of `(root, listener)` pairs. The watcher thread calls listeners
/// synchronously and must do so quickly — it owns no queue of its own,
/// only demultiplexes (spec §5: "this call must return quickly").
pub struct RecursiveWatcher {
	_watcher: RecommendedWatcher,
	dispatcher: Option<JoinHandle<()>>,
	stop: mpsc::Sender<()>,
}

struct Root {
	path: std::path::PathBuf,
	listener: std::sync::Arc<dyn BackupListener>,
}

impl RecursiveWatcher {
	/// Starts watching every `(root, listener)` pair recursively. Events
	/// outside any registered root are ignored; events inside more than
	/// one (nested roots) are delivered to every matching listener.
	pub fn start(roots: Vec<(std::path::PathBuf, std::sync::Arc<dyn BackupListener>)>) -> Result<Self, WatchError> {
		let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
		let mut watcher = notify::recommended_watcher(tx).map_err(|source| WatchError::Start {
			path: roots.first().map(|(p, _)| p.clone()).unwrap_or_default(),
			source,
		})?;

		for (path, _) in &roots {
			watcher
				.watch(path, RecursiveMode::Recursive)
				.map_err(|source| WatchError::Start { path: path.clone(), source })?;
		}

		let roots: Vec<Root> = roots.into_iter().map(|(path, listener)| Root { path, listener }).collect();
		let (stop_tx, stop_rx) = mpsc::channel::<()>();

		let dispatcher = thread::Builder::new()
			.name("backupd-watcher".to_string())
			.spawn(move || dispatch_loop(rx, stop_rx, roots))
			.expect("failed to spawn watcher dispatch thread");

		Ok(Self {
			_watcher: watcher,
			dispatcher: Some(dispatcher),
			stop: stop_tx,
		})
	}

	/// Stops the dispatch loop and joins its thread. Dropping the watcher
	/// unregisters every watch automatically.
	pub fn stop(&mut self) {
		let _ = self.stop.send(());
		if let Some(handle) = self.dispatcher.take() {
			let _ = handle.join();
		}
	}
}

impl Drop for RecursiveWatcher {
	fn drop(&mut self) {
		self.stop();
	}
}

fn dispatch_loop(rx: mpsc::Receiver<notify::Result<Event>>, stop_rx: mpsc::Receiver<()>, roots: Vec<Root>) {
	loop {
		if stop_rx.try_recv().is_ok() {
			return;
		}

		match rx.recv_timeout(std::time::Duration::from_millis(200)) {
			Ok(Ok(event)) => dispatch_event(&event, &roots),
			Ok(Err(error)) => warn!(%error, "filesystem watch error"),
			Err(mpsc::RecvTimeoutError::Timeout) => continue,
			Err(mpsc::RecvTimeoutError::Disconnected) => return,
		}
	}
}

/// Only creation and modification are admitted; everything else (delete,
/// rename, metadata-only) is ignored, matching the original listener's
/// `action != Modified && action != Add` gate (spec §6).
fn dispatch_event(event: &Event, roots: &[Root]) {
	let action = match event.kind {
		EventKind::Create(_) => FileAction::Created,
		EventKind::Modify(ModifyKind::Data(_)) => FileAction::Modified,
		_ => return,
	};

	for path in &event.paths {
		let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
			continue;
		};
		let Some(dir) = path.parent() else { continue };

		for root in roots {
			if path.starts_with(&root.path) {
				root.listener.on_event(dir, filename, action);
			}
		}
	}
}
