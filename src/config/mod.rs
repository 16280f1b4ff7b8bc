pub mod filter;
pub mod strategy;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

pub use filter::Filter;
pub use strategy::Strategy;

use crate::error::ConfigError;
use filter::{merge_presets, RawFilter};

/// A fully resolved backup source: path, its effective filter (custom
/// filter, if present, otherwise the merge of its named presets), and
/// whether it is enabled.
#[derive(Debug, Clone)]
pub struct SourceConfig {
	pub path: PathBuf,
	pub enabled: bool,
	pub filter: Filter,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub backup_destination_base: PathBuf,
	pub backup_sources: Vec<SourceConfig>,
	pub strategy: Strategy,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
	backup_destination_base: PathBuf,
	#[serde(default)]
	backup_sources: Vec<RawSource>,
	#[serde(default)]
	strategy: Strategy,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PresetsValue {
	One(String),
	Many(Vec<String>),
}

impl PresetsValue {
	fn into_vec(self) -> Vec<String> {
		match self {
			PresetsValue::One(s) => vec![s],
			PresetsValue::Many(v) => v,
		}
	}
}

#[derive(Debug, Deserialize)]
struct RawSource {
	path: PathBuf,
	#[serde(default)]
	enabled: bool,
	/// Accepts either `presets: [...]` or the back-compat singular/array
	/// `preset: "..."` / `preset: [...]` key.
	#[serde(default, alias = "preset")]
	presets: Option<PresetsValue>,
	#[serde(default)]
	filter: Option<RawFilter>,
}

/// Loads and validates `config.json`. Resolves each source's effective
/// filter (custom filter wins over preset merge, matching
/// `main.cpp`'s precedence in the original) against the presets loaded
/// from `presets_path`.
pub fn load_config(config_path: &Path, presets_path: &Path) -> Result<Config, ConfigError> {
	let raw = read_json::<RawConfig>(config_path)?;
	let presets = load_presets(presets_path)?;

	let mut backup_sources = Vec::with_capacity(raw.backup_sources.len());
	for source in raw.backup_sources {
		let filter = if let Some(custom) = source.filter {
			info!(path = %source.path.display(), "applied custom filter");
			custom.into_filter(&source.path.display().to_string())?
		} else if let Some(presets_value) = source.presets {
			let names = presets_value.into_vec();
			info!(path = %source.path.display(), ?names, "applied merged presets");
			merge_presets(&names, &presets)?
		} else {
			Filter::None
		};

		backup_sources.push(SourceConfig {
			path: source.path,
			enabled: source.enabled,
			filter,
		});
	}

	Ok(Config {
		backup_destination_base: raw.backup_destination_base,
		backup_sources,
		strategy: raw.strategy,
	})
}

/// Loads `presets.json`. A missing file degrades to an empty preset map
/// (matching `ConfigLoader::loadPresets` in the original prototype,
/// which tolerates an absent presets file); a malformed one is a hard
/// error.
fn load_presets(path: &Path) -> Result<HashMap<String, RawFilter>, ConfigError> {
	if !path.exists() {
		warn!(path = %path.display(), "presets file not found, continuing with no presets");
		return Ok(HashMap::new());
	}
	read_json(path)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
	let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})?;
	serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
		path: path.to_path_buf(),
		source,
	})
}
