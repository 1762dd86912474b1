use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Writes `bytes` to `path` atomically.
///
/// - Creates the parent directory if needed
/// - Writes into a temp file in the same directory, then renames it over
///   `path`, so readers see either the old or the new content
pub(crate) fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> io::Result<()> {
	let path = path.as_ref();
	let parent = path.parent().unwrap_or_else(|| Path::new("."));
	fs::create_dir_all(parent)?;

	let mut temp_file = NamedTempFile::new_in(parent)?;
	temp_file.write_all(bytes)?;
	temp_file.as_file().sync_all()?;
	temp_file.persist(path).map_err(|e| e.error)?;
	Ok(())
}

/// Reads a whole file, mapping "not found" to `None`.
pub(crate) fn read_optional<P: AsRef<Path>>(path: P) -> io::Result<Option<Vec<u8>>> {
	match fs::read(path) {
		Ok(bytes) => Ok(Some(bytes)),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e),
	}
}

/// Builds the file path for an identifier inside `dir`.
///
/// The identifier is hex encoded, so arbitrary IDs never escape `dir`.
///
/// Example:
/// `data/corpus` + `"42"` + `"bin"` → `data/corpus/3432.bin`
pub(crate) fn keyed_path<P: AsRef<Path>>(dir: P, id: &str, extension: &str) -> PathBuf {
	let mut stem: String = id.bytes().map(|b| format!("{b:02x}")).collect();
	if stem.is_empty() {
		stem.push('_');
	}
	let mut path = dir.as_ref().join(stem);
	path.set_extension(extension);
	path
}
