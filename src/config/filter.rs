use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// A source's extension filter. Extensions are matched case-insensitively
/// against the trailing extension of the filename, leading dot included —
/// `"c.rs.bak"` matches on `".bak"`, not `".rs"`, mirroring
/// `std::filesystem::path::extension()` in the original prototype.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
	#[default]
	None,
	Whitelist(Vec<String>),
	Blacklist(Vec<String>),
}

impl Filter {
	pub fn allows(&self, filename: &str) -> bool {
		match self {
			Filter::None => true,
			Filter::Whitelist(exts) => extension_of(filename).is_some_and(|ext| exts.iter().any(|e| e.eq_ignore_ascii_case(&ext))),
			Filter::Blacklist(exts) => !extension_of(filename).is_some_and(|ext| exts.iter().any(|e| e.eq_ignore_ascii_case(&ext))),
		}
	}
}

fn extension_of(filename: &str) -> Option<String> {
	let ext = Path::new(filename).extension()?.to_str()?;
	Some(format!(".{}", ext.to_ascii_lowercase()))
}

/// The on-disk shape of a `filter` object in `config.json`/`presets.json`:
/// `{mode: "whitelist"|"blacklist"|"none", extensions: [".ext", ...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFilter {
	#[serde(default = "default_mode")]
	pub mode: String,
	#[serde(default)]
	pub extensions: Vec<String>,
}

fn default_mode() -> String {
	"none".to_string()
}

impl RawFilter {
	pub fn into_filter(self, context: &str) -> Result<Filter, ConfigError> {
		match self.mode.as_str() {
			"none" => Ok(Filter::None),
			"whitelist" => Ok(Filter::Whitelist(self.extensions)),
			"blacklist" => Ok(Filter::Blacklist(self.extensions)),
			other => Err(ConfigError::UnknownFilterMode {
				name: context.to_string(),
				mode: other.to_string(),
			}),
		}
	}
}

/// Merge rule for a source's `presets` list (spec §6 "Presets"):
/// concatenate every named preset's whitelist; if any preset declares a
/// whitelist, the merged mode is `Whitelist` with the union minus anything
/// that also appears in a blacklist preset. Otherwise, if any preset
/// declares a blacklist, the merged mode is `Blacklist` with the union.
/// Otherwise `None`.
pub fn merge_presets(names: &[String], presets: &HashMap<String, RawFilter>) -> Result<Filter, ConfigError> {
	let mut whitelisted = Vec::new();
	let mut blacklisted = Vec::new();
	let mut has_whitelist = false;

	for name in names {
		let Some(raw) = presets.get(name) else {
			continue;
		};
		let filter = raw.clone().into_filter(name)?;
		match filter {
			Filter::Whitelist(exts) => {
				whitelisted.extend(exts);
				has_whitelist = true;
			}
			Filter::Blacklist(exts) => blacklisted.extend(exts),
			Filter::None => {}
		}
	}

	if has_whitelist {
		let merged = whitelisted
			.into_iter()
			.filter(|ext| !blacklisted.iter().any(|b| b.eq_ignore_ascii_case(ext)))
			.collect();
		Ok(Filter::Whitelist(merged))
	} else if !blacklisted.is_empty() {
		Ok(Filter::Blacklist(blacklisted))
	} else {
		Ok(Filter::None)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn whitelist_matches_case_insensitively() {
		let f = Filter::Whitelist(vec![".rs".to_string()]);
		assert!(f.allows("a.rs"));
		assert!(f.allows("A.RS"));
		assert!(!f.allows("b.TXT"));
		assert!(!f.allows("c.rs.bak"));
	}

	#[test]
	fn blacklist_admits_unlisted_extensions() {
		let f = Filter::Blacklist(vec![".tmp".to_string()]);
		assert!(f.allows("a.rs"));
		assert!(!f.allows("a.tmp"));
	}

	#[test]
	fn none_admits_everything() {
		assert!(Filter::None.allows("whatever.exe"));
		assert!(Filter::None.allows("noext"));
	}

	#[test]
	fn merge_prefers_whitelist_and_subtracts_blacklist() {
		let mut presets = HashMap::new();
		presets.insert(
			"code".to_string(),
			RawFilter {
				mode: "whitelist".to_string(),
				extensions: vec![".rs".to_string(), ".toml".to_string()],
			},
		);
		presets.insert(
			"noisy".to_string(),
			RawFilter {
				mode: "blacklist".to_string(),
				extensions: vec![".toml".to_string()],
			},
		);

		let merged = merge_presets(&["code".to_string(), "noisy".to_string()], &presets).unwrap();
		assert_eq!(merged, Filter::Whitelist(vec![".rs".to_string()]));
	}

	#[test]
	fn merge_falls_back_to_blacklist_when_no_whitelist_present() {
		let mut presets = HashMap::new();
		presets.insert(
			"noisy".to_string(),
			RawFilter {
				mode: "blacklist".to_string(),
				extensions: vec![".log".to_string()],
			},
		);

		let merged = merge_presets(&["noisy".to_string()], &presets).unwrap();
		assert_eq!(merged, Filter::Blacklist(vec![".log".to_string()]));
	}

	#[test]
	fn unknown_mode_is_a_hard_error() {
		let raw = RawFilter {
			mode: "denylist".to_string(),
			extensions: vec![],
		};
		assert!(raw.into_filter("bogus").is_err());
	}
}
