use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while loading or validating `config.json`/`presets.json`.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
	#[error("failed to read {path:?}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {path:?} as JSON")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("preset {name:?} has unknown filter mode {mode:?} (expected \"whitelist\", \"blacklist\", or \"none\")")]
	UnknownFilterMode { name: String, mode: String },

	#[error("no backup sources are both enabled and present on disk")]
	NoUsableSources,
}

/// Errors raised while starting the watcher.
#[derive(Debug, Error, Diagnostic)]
pub enum WatchError {
	#[error("failed to start filesystem watcher on {path:?}")]
	Start {
		path: PathBuf,
		#[source]
		source: notify::Error,
	},
}
