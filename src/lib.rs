#![deny(rust_2018_idioms)]

use std::sync::{Arc, Condvar, Mutex};

use miette::{Context as _, IntoDiagnostic, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

pub(crate) mod args;
pub mod config;
pub mod core;
pub(crate) mod error;
pub(crate) mod logging;
pub(crate) mod watcher;

pub use crate::args::Args;
pub use crate::core::Supervisor;
pub use crate::error::{ConfigError, WatchError};

/// Parses CLI arguments and installs the process-wide logger. Mirrors the
/// teacher's `(Args, WorkerGuard)` tuple so the guard's lifetime is tied
/// to whatever scope calls this (spec §SPEC_FULL B).
pub fn args() -> Result<(Args, Option<WorkerGuard>)> {
	let args = args::get_args();
	let guard = logging::init(args.verbose, args.log_file.as_deref());
	Ok((args, guard))
}

/// Loads configuration, starts the supervisor, and blocks until
/// SIGINT/SIGTERM, then shuts down cleanly (spec §6's CLI/daemon
/// surface). Returns `Ok(())` on clean shutdown; any `Err` causes the
/// caller to exit with status 1.
pub fn run(args: Args) -> Result<()> {
	let config = config::load_config(&args.config, &args.presets)
		.into_diagnostic()
		.wrap_err("failed to load configuration")?;

	if config.backup_sources.iter().all(|source| !source.enabled || !source.path.exists()) {
		return Err(ConfigError::NoUsableSources).into_diagnostic();
	}

	let mut supervisor = Supervisor::new(&config);
	if supervisor.usable_source_count() == 0 {
		return Err(ConfigError::NoUsableSources).into_diagnostic();
	}

	supervisor.start().into_diagnostic().wrap_err("failed to start watcher")?;

	info!(
		destination = %config.backup_destination_base.display(),
		sources = supervisor.usable_source_count(),
		retention_days = config.strategy.retention_days,
		max_versions_per_file = config.strategy.max_versions_per_file,
		compression = config.strategy.compression_enabled,
		"backupd is running, press Ctrl+C to stop",
	);

	wait_for_shutdown_signal()?;

	supervisor.stop();

	let counters = supervisor.aggregated_counters();
	info!(
		total_backups = counters.total_backups,
		failed_backups = counters.failed_backups,
		skipped_backups = counters.skipped_backups,
		compressed_backups = counters.compressed_backups,
		total_bytes = counters.total_bytes,
		total_backup_size = supervisor.total_backup_size(),
		"backupd stopped",
	);

	Ok(())
}

/// Installs SIGINT/SIGTERM handlers and blocks on a condition variable
/// they signal, replacing polling (spec §5's "application thread that
/// waits on a shutdown condition variable").
fn wait_for_shutdown_signal() -> Result<()> {
	let pair = Arc::new((Mutex::new(false), Condvar::new()));
	let handler_pair = Arc::clone(&pair);

	ctrlc::set_handler(move || {
		let (lock, cvar) = &*handler_pair;
		*lock.lock().expect("shutdown mutex poisoned") = true;
		cvar.notify_one();
	})
	.into_diagnostic()
	.wrap_err("failed to install signal handler")?;

	let (lock, cvar) = &*pair;
	let mut should_exit = lock.lock().expect("shutdown mutex poisoned");
	while !*should_exit {
		should_exit = cvar.wait(should_exit).expect("shutdown mutex poisoned");
	}
	Ok(())
}
