use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Extensions already in a compressed container format; compressing them
/// again wastes CPU for no gain (spec §4.2).
const ALREADY_COMPRESSED: &[&str] = &[
	".zip", ".rar", ".7z", ".gz", ".bz2", ".xz", ".jpg", ".jpeg", ".png", ".gif", ".mp4", ".mp3", ".avi", ".mkv", ".pdf", ".docx", ".xlsx",
];

/// Whether a file should be compressed, given the strategy's knobs.
/// False when compression is disabled, the file is under the size floor,
/// or its extension is already a compressed container format.
pub fn should_compress(path: &Path, size: u64, enabled: bool, min_bytes: u64) -> bool {
	if !enabled || size < min_bytes {
		return false;
	}
	match path.extension().and_then(|e| e.to_str()) {
		Some(ext) => {
			let ext = format!(".{}", ext.to_ascii_lowercase());
			!ALREADY_COMPRESSED.contains(&ext.as_str())
		}
		None => true,
	}
}

/// Compresses `src` into `dst` using deflate (zlib framing). On-disk
/// format (spec §4.2):
///
/// ```text
///  0..8   little-endian u64 original_size
///  8..N   deflate-compressed payload (zlib format, level in [1,9])
/// ```
///
/// Returns `None` on any I/O or codec failure — a soft failure, callers
/// fall back to a plain copy.
pub fn compress_file(src: &Path, dst: &Path, level: u32) -> Option<()> {
	try_compress_file(src, dst, level).ok()
}

fn try_compress_file(src: &Path, dst: &Path, level: u32) -> io::Result<()> {
	let mut input = Vec::new();
	File::open(src)?.read_to_end(&mut input)?;

	let mut output = File::create(dst)?;
	output.write_all(&(input.len() as u64).to_le_bytes())?;

	let mut encoder = ZlibEncoder::new(output, Compression::new(level.clamp(1, 9)));
	encoder.write_all(&input)?;
	encoder.finish()?;
	Ok(())
}

/// Inverse of [`compress_file`]. Returns `false` on failure or a size
/// mismatch against the stored original size.
pub fn decompress_file(src: &Path, dst: &Path) -> bool {
	try_decompress_file(src, dst).unwrap_or(false)
}

fn try_decompress_file(src: &Path, dst: &Path) -> io::Result<bool> {
	let mut input = File::open(src)?;
	let mut header = [0u8; 8];
	input.read_exact(&mut header)?;
	let original_size = u64::from_le_bytes(header);

	let mut decoded = Vec::with_capacity(original_size as usize);
	ZlibDecoder::new(input).read_to_end(&mut decoded)?;

	let ok = decoded.len() as u64 == original_size;
	File::create(dst)?.write_all(&decoded)?;
	Ok(ok)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	fn path(name: &str) -> PathBuf {
		PathBuf::from(name)
	}

	#[test]
	fn already_compressed_extensions_are_skipped() {
		assert!(!should_compress(&path("photo.JPG"), 10_000_000, true, 1024));
		assert!(!should_compress(&path("archive.zip"), 10_000_000, true, 1024));
	}

	#[test]
	fn small_files_are_skipped() {
		assert!(!should_compress(&path("a.txt"), 100, true, 1024));
	}

	#[test]
	fn disabled_strategy_never_compresses() {
		assert!(!should_compress(&path("a.txt"), 1_000_000, false, 1024));
	}

	#[test]
	fn compressible_large_text_file_is_selected() {
		assert!(should_compress(&path("a.txt"), 5_000_000, true, 1024));
	}

	#[test]
	fn round_trip_byte_equal() {
		let dir = tempfile::tempdir().unwrap();
		let src = dir.path().join("source.txt");
		let payload = "the quick brown fox ".repeat(1000);
		std::fs::write(&src, &payload).unwrap();

		let compressed = dir.path().join("source.txt.gz");
		compress_file(&src, &compressed, 6).expect("compression should succeed");

		assert!(std::fs::metadata(&compressed).unwrap().len() < payload.len() as u64);

		let restored = dir.path().join("restored.txt");
		assert!(decompress_file(&compressed, &restored));
		assert_eq!(std::fs::read(&restored).unwrap(), payload.as_bytes());
	}

	#[test]
	fn compress_missing_source_is_a_soft_failure() {
		let dir = tempfile::tempdir().unwrap();
		let missing = dir.path().join("nope.bin");
		let dst = dir.path().join("nope.bin.gz");
		assert!(compress_file(&missing, &dst, 6).is_none());
	}
}
