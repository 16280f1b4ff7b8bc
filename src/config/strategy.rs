use serde::{Deserialize, Serialize};

/// Per-engine backup policy. Every field is independently overridable from
/// `config.json`'s `strategy` object; unset fields fall back to the defaults
/// below, matching `ConfigLoader::loadStrategy` in the original prototype.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Strategy {
	pub retention_days: u32,
	pub max_versions_per_file: usize,
	pub compression_enabled: bool,
	pub compression_level: u32,
	pub compression_min_bytes: u64,
	pub max_file_bytes: u64,
	pub debounce_seconds: u64,
	pub max_retries: u32,
	pub initial_retry_backoff_seconds: u64,

	/// Forward-compatible field, parsed but never realized: see spec §9's
	/// open question on incremental backup. Only `incremental_enabled`
	/// participates in observable behavior, and only indirectly — it has
	/// no effect on the hash-equality dedup short-circuit, which always
	/// runs regardless of this flag.
	pub incremental_enabled: bool,
	pub full_backup_interval: u32,
	pub delta_ratio_threshold: f32,
}

impl Default for Strategy {
	fn default() -> Self {
		Self {
			retention_days: 30,
			max_versions_per_file: 10,
			compression_enabled: true,
			compression_level: 6,
			compression_min_bytes: 1024,
			max_file_bytes: 100 * 1024 * 1024,
			debounce_seconds: 5,
			max_retries: 5,
			initial_retry_backoff_seconds: 1,
			incremental_enabled: false,
			full_backup_interval: 10,
			delta_ratio_threshold: 0.3,
		}
	}
}
