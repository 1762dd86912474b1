use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::error::MarkovError;
use crate::io::{keyed_path, read_optional, write_atomic};
use crate::types::CommunityId;

/// Persistence of one opaque corpus record per community.
///
/// Writes must be atomic: a reader sees either the previous record or the
/// new one, never a partial write.
pub trait CorpusBackend: Send + Sync {
	fn exists(&self, id: &CommunityId) -> Result<bool, MarkovError>;

	/// Returns `None` if the community has no record.
	fn read(&self, id: &CommunityId) -> Result<Option<Vec<u8>>, MarkovError>;

	fn write(&self, id: &CommunityId, bytes: &[u8]) -> Result<(), MarkovError>;

	/// Removes the record. Returns `false` if there was none.
	fn delete(&self, id: &CommunityId) -> Result<bool, MarkovError>;

	/// Size of the stored record in bytes, `None` if absent.
	fn size(&self, id: &CommunityId) -> Result<Option<u64>, MarkovError>;
}

/// One `<hex id>.bin` file per community under a directory.
#[derive(Debug, Clone)]
pub struct FsCorpusBackend {
	dir: PathBuf,
}

impl FsCorpusBackend {
	pub fn new<P: AsRef<Path>>(dir: P) -> Self {
		Self { dir: dir.as_ref().to_path_buf() }
	}

	fn path(&self, id: &CommunityId) -> PathBuf {
		keyed_path(&self.dir, id.as_str(), "bin")
	}
}

impl CorpusBackend for FsCorpusBackend {
	fn exists(&self, id: &CommunityId) -> Result<bool, MarkovError> {
		Ok(self.path(id).try_exists()?)
	}

	fn read(&self, id: &CommunityId) -> Result<Option<Vec<u8>>, MarkovError> {
		Ok(read_optional(self.path(id))?)
	}

	fn write(&self, id: &CommunityId, bytes: &[u8]) -> Result<(), MarkovError> {
		Ok(write_atomic(self.path(id), bytes)?)
	}

	fn delete(&self, id: &CommunityId) -> Result<bool, MarkovError> {
		match std::fs::remove_file(self.path(id)) {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
			Err(e) => Err(e.into()),
		}
	}

	fn size(&self, id: &CommunityId) -> Result<Option<u64>, MarkovError> {
		match std::fs::metadata(self.path(id)) {
			Ok(meta) => Ok(Some(meta.len())),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}
}

/// Corpus records held in memory only.
#[derive(Debug, Default)]
pub struct MemoryCorpusBackend {
	records: DashMap<CommunityId, Vec<u8>>,
}

impl MemoryCorpusBackend {
	pub fn new() -> Self {
		Self::default()
	}
}

impl CorpusBackend for MemoryCorpusBackend {
	fn exists(&self, id: &CommunityId) -> Result<bool, MarkovError> {
		Ok(self.records.contains_key(id))
	}

	fn read(&self, id: &CommunityId) -> Result<Option<Vec<u8>>, MarkovError> {
		Ok(self.records.get(id).map(|r| r.value().clone()))
	}

	fn write(&self, id: &CommunityId, bytes: &[u8]) -> Result<(), MarkovError> {
		self.records.insert(id.clone(), bytes.to_vec());
		Ok(())
	}

	fn delete(&self, id: &CommunityId) -> Result<bool, MarkovError> {
		Ok(self.records.remove(id).is_some())
	}

	fn size(&self, id: &CommunityId) -> Result<Option<u64>, MarkovError> {
		Ok(self.records.get(id).map(|r| r.value().len() as u64))
	}
}
