use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::{debug, warn};

/// A continuously-running file-system watcher that produces timestamped,
/// optionally-compressed versioned copies of changed files.
#[derive(Debug, Clone, Parser)]
#[command(
	author,
	version,
	after_help = "Want more detail? Try the long '--help' flag!",
	after_long_help = "Didn't expect this much output? Use the short '-h' flag to get short help.",
)]
#[cfg_attr(debug_assertions, command(before_help = "⚠ DEBUG BUILD ⚠"))]
pub struct Args {
	/// Path to the configuration file
	///
	/// Recognised keys: 'backup_destination_base', 'backup_sources', and
	/// 'strategy'. See the README for the full schema.
	#[arg(long, default_value = "config.json", value_name = "PATH")]
	pub config: PathBuf,

	/// Path to the filter presets file
	///
	/// A mapping from preset name to '{mode, extensions}'. Missing is
	/// tolerated — sources that reference presets simply get no filter.
	#[arg(long, default_value = "presets.json", value_name = "PATH")]
	pub presets: PathBuf,

	/// Set diagnostic log level
	///
	/// This enables diagnostic logging, which is useful for investigating bugs. Use multiple
	/// times to increase verbosity. Goes up to '-vvv'.
	///
	/// Setting $RUST_LOG also works, and takes precedence, but is not recommended unless you know
	/// what you're doing.
	#[arg(
		long,
		short,
		action = ArgAction::Count,
		num_args = 0,
	)]
	pub verbose: u8,

	/// Write diagnostic logs to a file instead of the terminal
	///
	/// Logs are written in JSON format to a daily-rotating file named after
	/// this path. If the path's directory doesn't exist yet it is created.
	/// Bare '--log-file' with no path defaults to the current directory.
	#[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = ".")]
	pub log_file: Option<PathBuf>,
}

pub fn get_args() -> Args {
	if std::env::var("RUST_LOG").is_ok() {
		warn!("⚠ RUST_LOG environment variable set, logging options have no effect");
	}

	debug!("parsing arguments");
	let args = Args::parse();

	debug!(?args, "got arguments");
	args
}

#[test]
fn verify_cli() {
	use clap::CommandFactory;
	Args::command().debug_assert()
}

#[test]
fn bare_log_file_flag_defaults_to_current_directory() {
	let args = Args::parse_from(["backupd", "--log-file"]);
	assert_eq!(args.log_file, Some(PathBuf::from(".")));
}

#[test]
fn log_file_flag_with_path_uses_that_path() {
	let args = Args::parse_from(["backupd", "--log-file", "/var/log/backupd.log"]);
	assert_eq!(args.log_file, Some(PathBuf::from("/var/log/backupd.log")));
}

#[test]
fn omitted_log_file_flag_is_none() {
	let args = Args::parse_from(["backupd"]);
	assert_eq!(args.log_file, None);
}
