use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

/// A unit of work admitted past the filter and debouncer (spec §3).
/// Not persisted: a crash or `stop()` abandons whatever is still queued.
#[derive(Debug, Clone)]
pub struct BackupTask {
	pub source_file_path: PathBuf,
	pub enqueue_time: Instant,
}

impl BackupTask {
	pub fn new(source_file_path: PathBuf) -> Self {
		Self {
			source_file_path,
			enqueue_time: Instant::now(),
		}
	}
}

struct State {
	tasks: VecDeque<BackupTask>,
	stopped: bool,
}

/// FIFO handoff from the watcher callback to the worker pool, guarded by
/// one mutex and one condvar (spec §4.5). Unbounded: the debouncer is the
/// only admission gate.
pub struct WorkQueue {
	state: Mutex<State>,
	condvar: Condvar,
}

impl WorkQueue {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(State {
				tasks: VecDeque::new(),
				stopped: false,
			}),
			condvar: Condvar::new(),
		}
	}

	/// Appends a task and wakes one waiting worker. No-op once stopped.
	pub fn push(&self, task: BackupTask) {
		let mut state = self.state.lock().expect("work queue mutex poisoned");
		if state.stopped {
			return;
		}
		state.tasks.push_back(task);
		self.condvar.notify_one();
	}

	/// Blocks until a task is available or the queue is stopped. Returns
	/// `None` on shutdown, once the queue has been drained.
	pub fn pop_or_wait(&self) -> Option<BackupTask> {
		let mut state = self.state.lock().expect("work queue mutex poisoned");
		loop {
			if let Some(task) = state.tasks.pop_front() {
				return Some(task);
			}
			if state.stopped {
				return None;
			}
			state = self.condvar.wait(state).expect("work queue mutex poisoned");
		}
	}

	/// Sets the stop flag and wakes every waiter. Idempotent.
	pub fn stop(&self) {
		let mut state = self.state.lock().expect("work queue mutex poisoned");
		state.stopped = true;
		self.condvar.notify_all();
	}

	/// Whether `stop` has been called. Checked by workers between retry
	/// backoff sleeps so a shutdown doesn't wait out a task's whole retry
	/// budget before exiting (spec §5).
	pub fn is_stopped(&self) -> bool {
		self.state.lock().expect("work queue mutex poisoned").stopped
	}
}

impl Default for WorkQueue {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;

	#[test]
	fn push_then_pop_returns_the_same_task() {
		let queue = WorkQueue::new();
		queue.push(BackupTask::new(PathBuf::from("a.txt")));
		let task = queue.pop_or_wait().unwrap();
		assert_eq!(task.source_file_path, PathBuf::from("a.txt"));
	}

	#[test]
	fn fifo_order_is_preserved() {
		let queue = WorkQueue::new();
		queue.push(BackupTask::new(PathBuf::from("a.txt")));
		queue.push(BackupTask::new(PathBuf::from("b.txt")));
		assert_eq!(queue.pop_or_wait().unwrap().source_file_path, PathBuf::from("a.txt"));
		assert_eq!(queue.pop_or_wait().unwrap().source_file_path, PathBuf::from("b.txt"));
	}

	#[test]
	fn stop_wakes_a_blocked_waiter_with_none() {
		let queue = Arc::new(WorkQueue::new());
		let waiter = {
			let queue = Arc::clone(&queue);
			thread::spawn(move || queue.pop_or_wait())
		};
		thread::sleep(std::time::Duration::from_millis(20));
		queue.stop();
		assert!(waiter.join().unwrap().is_none());
	}

	#[test]
	fn push_after_stop_is_a_no_op() {
		let queue = WorkQueue::new();
		queue.stop();
		queue.push(BackupTask::new(PathBuf::from("a.txt")));
		assert!(queue.pop_or_wait().is_none());
	}
}
