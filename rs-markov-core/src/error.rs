use std::io;

use thiserror::Error;

use crate::types::CommunityId;

/// Errors produced by corpus, settings and ingestion operations.
///
/// `EmptyCorpus`, `CorpusOverflow`, `NotFound` and `Cancelled` are expected,
/// recoverable conditions that callers turn into user-facing messages.
/// The remaining variants are storage or configuration faults and propagate.
#[derive(Debug, Error)]
pub enum MarkovError {
	/// The input text did not contain a single trainable line.
	#[error("no trainable lines in input")]
	EmptyCorpus,

	/// The merged corpus would exceed the configured allowance.
	#[error("corpus would grow to {size} bytes, over the {max} byte allowance")]
	CorpusOverflow { size: u64, max: u64 },

	/// No corpus is persisted for this community.
	#[error("no corpus stored for community {0}")]
	NotFound(CommunityId),

	/// Underlying file I/O failure.
	#[error("storage error: {0}")]
	Storage(#[from] io::Error),

	/// Corpus bytes could not be encoded or decoded.
	#[error("corpus codec error: {0}")]
	Codec(#[from] postcard::Error),

	/// A settings file could not be read or written.
	#[error("settings error: {0}")]
	Settings(#[from] serde_json::Error),

	#[error("unknown setting: {0}")]
	UnknownSetting(String),

	#[error("invalid value for setting {name}: {reason}")]
	InvalidSetting { name: String, reason: String },

	/// An ingestion session was aborted before it committed.
	#[error("ingestion cancelled")]
	Cancelled,

	#[error("configuration error: {0}")]
	Config(String),
}

impl MarkovError {
	/// Returns `true` for persistence failures that must not be swallowed.
	pub fn is_storage_fault(&self) -> bool {
		matches!(self, Self::Storage(_) | Self::Codec(_) | Self::Settings(_))
	}
}

impl From<figment::Error> for MarkovError {
	fn from(err: figment::Error) -> Self {
		Self::Config(err.to_string())
	}
}

impl From<tokio::task::JoinError> for MarkovError {
	fn from(err: tokio::task::JoinError) -> Self {
		Self::Storage(io::Error::other(err))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn storage_faults_are_classified() {
		assert!(MarkovError::Storage(io::Error::other("disk")).is_storage_fault());
		assert!(!MarkovError::EmptyCorpus.is_storage_fault());
		assert!(!MarkovError::CorpusOverflow { size: 2, max: 1 }.is_storage_fault());
		assert!(!MarkovError::NotFound(CommunityId::from("guild")).is_storage_fault());
	}

	#[test]
	fn overflow_message_names_both_sizes() {
		let err = MarkovError::CorpusOverflow { size: 2048, max: 1024 };
		assert_eq!(err.to_string(), "corpus would grow to 2048 bytes, over the 1024 byte allowance");
	}
}
