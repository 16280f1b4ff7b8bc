use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

const CHUNK_SIZE: usize = 8 * 1024;

/// SHA-256 of a file's contents, streamed in fixed-size chunks so
/// arbitrarily large files use bounded memory. Returns `None` (not an
/// error) when the file can't be opened or read — the caller treats
/// absence as "cannot back up now, skip with a warning" (spec §4.1).
pub fn hash_file(path: &Path) -> Option<String> {
	let mut file = File::open(path)
		.inspect_err(|error| debug!(?path, %error, "could not open file for hashing"))
		.ok()?;

	let mut hasher = Sha256::new();
	let mut buf = [0u8; CHUNK_SIZE];
	loop {
		let read = file
			.read(&mut buf)
			.inspect_err(|error| debug!(?path, %error, "read error while hashing"))
			.ok()?;
		if read == 0 {
			break;
		}
		hasher.update(&buf[..read]);
	}

	Some(hex::encode(hasher.finalize()))
}

/// SHA-256 of an in-memory buffer, lowercase hex.
pub fn hash_bytes(buf: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(buf);
	hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn hash_bytes_is_stable_and_lowercase_hex() {
		let digest = hash_bytes(b"hello world");
		assert_eq!(digest.len(), 64);
		assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
		assert_eq!(digest, hash_bytes(b"hello world"));
	}

	#[test]
	fn hash_file_matches_hash_bytes() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("f.txt");
		let mut f = File::create(&path).unwrap();
		f.write_all(b"versioned contents").unwrap();
		drop(f);

		assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"versioned contents"));
	}

	#[test]
	fn hash_file_large_buffer_spans_multiple_chunks() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("big.bin");
		let data = vec![0x5au8; CHUNK_SIZE * 3 + 17];
		fs_write(&path, &data);

		assert_eq!(hash_file(&path).unwrap(), hash_bytes(&data));
	}

	fn fs_write(path: &std::path::Path, data: &[u8]) {
		let mut f = File::create(path).unwrap();
		f.write_all(data).unwrap();
	}

	#[test]
	fn missing_file_hashes_to_none() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nope.txt");
		assert!(hash_file(&path).is_none());
	}
}
