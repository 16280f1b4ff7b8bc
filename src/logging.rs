use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer as _};

/// Installs the process-wide subscriber: an ANSI console layer plus, when
/// `log_file` is given, a daily-rotating file layer in the named directory
/// (spec §6's "two sinks (console + dated rotating file)"). Returns the
/// [`WorkerGuard`] for the non-blocking file writer — it must be held for
/// the life of the process, since dropping it flushes and closes the
/// writer (spec §9's "injected logger capability ... drop on shutdown").
///
/// `verbosity` follows the CLI's repeated `-v` count: 0 is `info`-level
/// for this crate and `warn` elsewhere, climbing to `trace` everywhere at
/// 3+.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Option<WorkerGuard> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	let console_layer = tracing_subscriber::fmt::layer()
		.with_timer(ChronoLocal::rfc_3339())
		.with_target(false);

	match log_file {
		Some(path) => {
			let (dir, prefix) = split_log_target(path);
			let appender = tracing_appender::rolling::daily(dir, prefix);
			let (writer, guard) = tracing_appender::non_blocking(appender);

			let file_layer = tracing_subscriber::fmt::layer()
				.json()
				.with_writer(writer)
				.with_ansi(false);

			tracing_subscriber::registry()
				.with(filter)
				.with(console_layer)
				.with(file_layer)
				.init();

			Some(guard)
		}
		None => {
			tracing_subscriber::registry().with(filter).with(console_layer).init();
			None
		}
	}
}

fn default_directives(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "backupd=info,warn",
		1 => "backupd=debug,info",
		2 => "debug",
		_ => "trace",
	}
}

/// Splits a user-supplied `--log-file` path into the directory
/// `tracing_appender::rolling::daily` rotates within and the filename
/// prefix it appends a date to. A bare filename rotates in the current
/// directory.
fn split_log_target(path: &Path) -> (PathBuf, String) {
	let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
	let prefix = path.file_name().and_then(|n| n.to_str()).unwrap_or("backupd").to_string();
	(dir.to_path_buf(), prefix)
}
