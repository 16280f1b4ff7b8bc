use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;
use walkdir::WalkDir;

/// A parsed view of one artifact on disk, per spec §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
	pub absolute_path: PathBuf,
	pub timestamp: NaiveDateTime,
	pub size_bytes: u64,
	pub compressed: bool,
	/// Always `false` today — see spec §9's open question on incremental
	/// backup; the field is carried for forward compatibility only.
	pub incremental: bool,
	/// Display-only; derived from the timestamp's seconds-since-midnight.
	/// Not a monotone counter, must not be used for ordering (spec §9).
	pub version_number: u32,
}

fn timestamp_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\.(\d{8})_(\d{6})\.").expect("static regex is valid"))
}

/// Owns the destination directory tree rooted at `dest_base` and implements
/// the naming, enumeration, and GC contracts of spec §4.3.
pub struct VersionStore {
	dest_base: PathBuf,
}

impl VersionStore {
	pub fn new(dest_base: PathBuf) -> Self {
		Self { dest_base }
	}

	pub fn dest_base(&self) -> &Path {
		&self.dest_base
	}

	/// Builds `<dest_base>/<D>/<dirname(relpath)>` for "now", creating it
	/// recursively. Returns the directory and the `YYYYMMDD_HHMMSS`
	/// timestamp to embed in the artifact's filename.
	pub fn artifact_dir(&self, relpath: &Path) -> std::io::Result<(PathBuf, String)> {
		let now = Local::now();
		let date_bucket = now.format("%Y-%m-%d").to_string();
		let timestamp = now.format("%Y%m%d_%H%M%S").to_string();

		let mut dir = self.dest_base.join(date_bucket);
		if let Some(parent) = relpath.parent() {
			if parent != Path::new("") {
				dir.push(parent);
			}
		}
		fs::create_dir_all(&dir)?;
		Ok((dir, timestamp))
	}

	/// `<dest_base>/<D>/<dirname(P)>/<stem(P)>.<T><ext(P)>[.gz]`.
	pub fn artifact_path(dir: &Path, relpath: &Path, timestamp: &str, compressed: bool) -> PathBuf {
		let stem = relpath.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
		let ext = relpath.extension().and_then(|e| e.to_str());

		let mut name = format!("{stem}.{timestamp}");
		if let Some(ext) = ext {
			name.push('.');
			name.push_str(ext);
		}
		if compressed {
			name.push_str(".gz");
		}
		dir.join(name)
	}

	/// Scans every date-bucket directory under `dest_base`, descends into
	/// `dirname(relpath)`, and parses every file whose name starts with
	/// `stem(relpath)` and carries a `_YYYYMMDD_HHMMSS_`-shaped infix.
	/// Sorted newest-first.
	pub fn versions_of(&self, relpath: &Path) -> Vec<VersionInfo> {
		let stem = match relpath.file_stem().and_then(|s| s.to_str()) {
			Some(s) => s,
			None => return Vec::new(),
		};
		let subdir = relpath.parent().filter(|p| *p != Path::new(""));

		let mut versions = Vec::new();
		let Ok(buckets) = fs::read_dir(&self.dest_base) else {
			return versions;
		};

		for bucket in buckets.flatten() {
			let mut dir = bucket.path();
			if !dir.is_dir() {
				continue;
			}
			if let Some(subdir) = subdir {
				dir.push(subdir);
			}
			let Ok(entries) = fs::read_dir(&dir) else {
				continue;
			};
			for entry in entries.flatten() {
				let path = entry.path();
				let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
					continue;
				};
				if !name.starts_with(stem) {
					continue;
				}
				if let Some(info) = parse_artifact(&path) {
					versions.push(info);
				}
			}
		}

		versions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
		versions
	}

	/// Per-path GC (spec §4.3). Keeps the three newest regardless of age;
	/// beyond that, keeps anything younger than `retention_days` up to
	/// `max_versions_per_file`. Returns the count of artifacts actually
	/// removed (failures to remove are swallowed and omitted, per spec
	/// §4.3's failure semantics).
	pub fn cleanup_old_versions(&self, relpath: &Path, retention_days: u32, max_versions_per_file: usize) -> usize {
		let versions = self.versions_of(relpath);
		let cutoff = Local::now().naive_local() - chrono::Duration::days(retention_days as i64);

		let mut deleted = 0;
		for (i, version) in versions.iter().enumerate() {
			let should_delete = if i >= max_versions_per_file {
				true
			} else if i >= 3 {
				version.timestamp < cutoff
			} else {
				false
			};

			if should_delete {
				if remove_artifact(&version.absolute_path) {
					deleted += 1;
				}
			}
		}
		deleted
	}

	/// Global GC (spec §4.3). Recursively walks `dest_base`, parsing every
	/// regular file; deletes any parse-success older than `retention_days`.
	/// Unparseable files are left untouched.
	pub fn cleanup_all(&self, retention_days: u32) -> usize {
		let cutoff = Local::now().naive_local() - chrono::Duration::days(retention_days as i64);
		WalkDir::new(&self.dest_base)
			.into_iter()
			.filter_map(|entry| entry.ok())
			.filter(|entry| entry.file_type().is_file())
			.filter_map(|entry| parse_artifact(entry.path()))
			.filter(|info| info.timestamp < cutoff)
			.filter(|info| remove_artifact(&info.absolute_path))
			.count()
	}

	/// Every parsed version for a relative path, newest-first. A
	/// convenience read path over `versions_of` (spec §SPEC_FULL D).
	pub fn get_file_versions(&self, relpath: &Path) -> Vec<VersionInfo> {
		self.versions_of(relpath)
	}

	/// The newest version for a relative path, if any.
	pub fn get_latest_version(&self, relpath: &Path) -> Option<VersionInfo> {
		self.versions_of(relpath).into_iter().next()
	}

	/// Sum of `size_bytes` across every artifact currently under
	/// `dest_base`, parsed or not — an aggregate disk-usage figure logged
	/// at shutdown (spec §SPEC_FULL D).
	pub fn total_backup_size(&self) -> u64 {
		WalkDir::new(&self.dest_base)
			.into_iter()
			.filter_map(|entry| entry.ok())
			.filter(|entry| entry.file_type().is_file())
			.filter_map(|entry| entry.metadata().ok())
			.map(|meta| meta.len())
			.sum()
	}
}

fn remove_artifact(path: &Path) -> bool {
	fs::remove_file(path)
		.inspect_err(|error| debug!(?path, %error, "failed to remove expired artifact"))
		.is_ok()
}

/// Parses one artifact's filename and metadata into a [`VersionInfo`].
/// Returns `None` for anything that doesn't carry the `_YYYYMMDD_HHMMSS_`
/// infix or isn't a regular file — non-matching files are left alone by
/// every GC path (forward compatibility with sibling tooling, spec §4.3).
fn parse_artifact(path: &Path) -> Option<VersionInfo> {
	let meta = fs::metadata(path).ok().filter(|m| m.is_file())?;
	let name = path.file_name()?.to_str()?;
	let caps = timestamp_regex().captures(name)?;

	let date = NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok()?;
	let time = chrono::NaiveTime::parse_from_str(&caps[2], "%H%M%S").ok()?;
	let timestamp = NaiveDateTime::new(date, time);

	let version_number = (timestamp.and_utc().timestamp() % 1_000_000) as u32;

	Some(VersionInfo {
		absolute_path: path.to_path_buf(),
		timestamp,
		size_bytes: meta.len(),
		compressed: name.ends_with(".gz"),
		incremental: false,
		version_number,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::File;
	use std::io::Write;

	fn touch(path: &Path) {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).unwrap();
		}
		let mut f = File::create(path).unwrap();
		f.write_all(b"x").unwrap();
	}

	#[test]
	fn artifact_path_matches_naming_contract() {
		let dir = PathBuf::from("/tmp/backups/2026-07-27/src");
		let relpath = Path::new("src/main.rs");
		let path = VersionStore::artifact_path(&dir, relpath, "20260727_120000", false);
		assert_eq!(path, PathBuf::from("/tmp/backups/2026-07-27/src/main.20260727_120000.rs"));

		let compressed = VersionStore::artifact_path(&dir, relpath, "20260727_120000", true);
		assert!(compressed.to_str().unwrap().ends_with(".rs.gz"));
	}

	#[test]
	fn versions_of_parses_and_sorts_newest_first() {
		let dir = tempfile::tempdir().unwrap();
		let store = VersionStore::new(dir.path().to_path_buf());

		touch(&dir.path().join("2026-07-25/foo.20260725_100000.txt"));
		touch(&dir.path().join("2026-07-26/foo.20260726_100000.txt.gz"));
		touch(&dir.path().join("2026-07-27/foo.20260727_100000.txt"));
		touch(&dir.path().join("2026-07-27/unrelated.txt"));

		let versions = store.versions_of(Path::new("foo.txt"));
		assert_eq!(versions.len(), 3);
		assert!(versions[0].timestamp > versions[1].timestamp);
		assert!(versions[1].timestamp > versions[2].timestamp);
		assert!(versions[0].compressed || versions[1].compressed);
	}

	#[test]
	fn cleanup_keeps_retention_floor_of_three() {
		let dir = tempfile::tempdir().unwrap();
		let store = VersionStore::new(dir.path().to_path_buf());

		for days_ago in 0..15u32 {
			let date = Local::now().naive_local().date() - chrono::Duration::days(days_ago as i64);
			let name = format!("foo.{}_{:02}{:02}{:02}.txt", date.format("%Y%m%d"), days_ago, 0, 0);
			touch(&dir.path().join(format!("{}/{}", date.format("%Y-%m-%d"), name)));
		}

		let deleted = store.cleanup_old_versions(Path::new("foo.txt"), 30, 10);
		let remaining = store.versions_of(Path::new("foo.txt"));
		assert_eq!(remaining.len(), 10);
		assert_eq!(deleted, 5);
	}

	#[test]
	fn cleanup_all_removes_only_expired_parseable_files() {
		let dir = tempfile::tempdir().unwrap();
		let store = VersionStore::new(dir.path().to_path_buf());

		let old_date = Local::now().naive_local().date() - chrono::Duration::days(90);
		touch(&dir.path().join(format!("{}/old.{}_100000.txt", old_date.format("%Y-%m-%d"), old_date.format("%Y%m%d"))));
		touch(&dir.path().join("2026-07-27/recent.20260727_100000.txt"));
		touch(&dir.path().join("2026-07-27/no-timestamp-here.txt"));

		let deleted = store.cleanup_all(30);
		assert_eq!(deleted, 1);
		assert!(dir.path().join("2026-07-27/recent.20260727_100000.txt").exists());
		assert!(dir.path().join("2026-07-27/no-timestamp-here.txt").exists());
	}

	#[test]
	fn total_backup_size_sums_every_artifact() {
		let dir = tempfile::tempdir().unwrap();
		let store = VersionStore::new(dir.path().to_path_buf());
		touch(&dir.path().join("2026-07-27/a.20260727_100000.txt"));
		touch(&dir.path().join("2026-07-27/b.20260727_100000.txt"));
		assert_eq!(store.total_backup_size(), 2);
	}
}
