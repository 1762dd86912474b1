//! Bulk seeding of a corpus from feeds and message history.
//!
//! A session buffers everything in memory and commits with a single
//! append, so an aborted or oversized ingestion never leaves a partial
//! corpus behind.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::corpus::CorpusStore;
use crate::error::MarkovError;
use crate::sanitize::{clean_feed_item, sanitize};
use crate::types::CommunityId;

/// What a committed session added.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestReport {
	/// Feed items or messages accepted.
	pub items: usize,
	/// Size of the text handed to the corpus.
	pub bytes: u64,
}

pub struct IngestSession {
	corpus: Arc<CorpusStore>,
	community: CommunityId,
	buffer: String,
	items: usize,
	token: CancellationToken,
}

impl IngestSession {
	pub fn new(corpus: Arc<CorpusStore>, community: CommunityId) -> Self {
		Self::with_token(corpus, community, CancellationToken::new())
	}

	pub fn with_token(corpus: Arc<CorpusStore>, community: CommunityId, token: CancellationToken) -> Self {
		Self { corpus, community, buffer: String::new(), items: 0, token }
	}

	/// Token that aborts this session when cancelled.
	pub fn cancellation_token(&self) -> CancellationToken {
		self.token.clone()
	}

	pub fn items(&self) -> usize {
		self.items
	}

	fn ensure_active(&self) -> Result<(), MarkovError> {
		if self.token.is_cancelled() {
			return Err(MarkovError::Cancelled);
		}
		Ok(())
	}

	/// Buffers the body of one feed item.
	pub fn push_feed_item(&mut self, body: &str) -> Result<(), MarkovError> {
		self.ensure_active()?;
		self.buffer.push_str(&clean_feed_item(body));
		self.buffer.push('\n');
		self.items += 1;
		Ok(())
	}

	/// Buffers one prior message. The caller has already filtered out
	/// commands and the bot's own messages.
	pub fn push_message(&mut self, content: &str) -> Result<(), MarkovError> {
		self.ensure_active()?;
		self.buffer.push_str(&sanitize(content));
		self.buffer.push('\n');
		self.items += 1;
		Ok(())
	}

	/// Appends everything buffered in one size-checked write.
	///
	/// # Errors
	/// - `Cancelled` if the token fired before the write started
	/// - `EmptyCorpus` / `CorpusOverflow` from the append, with the corpus unchanged
	pub async fn commit(self) -> Result<IngestReport, MarkovError> {
		if self.token.is_cancelled() {
			info!(community = %self.community, items = self.items, "ingestion cancelled before commit");
			return Err(MarkovError::Cancelled);
		}

		self.corpus.append(&self.community, &self.buffer).await?;
		let report = IngestReport { items: self.items, bytes: self.buffer.len() as u64 };
		info!(community = %self.community, items = report.items, bytes = report.bytes, "ingestion committed");
		Ok(report)
	}
}

/// Feeds every item body into one session and commits it.
///
/// Yields to the scheduler between items and stops at the first check
/// after `token` is cancelled.
pub async fn ingest_feed<I>(
	corpus: Arc<CorpusStore>,
	community: CommunityId,
	items: I,
	token: CancellationToken,
) -> Result<IngestReport, MarkovError>
where
	I: IntoIterator,
	I::Item: AsRef<str>,
{
	let mut session = IngestSession::with_token(corpus, community, token);
	for item in items {
		session.push_feed_item(item.as_ref())?;
		tokio::task::yield_now().await;
	}
	session.commit().await
}

/// Replays prior messages into one session and commits it.
pub async fn ingest_history<I>(
	corpus: Arc<CorpusStore>,
	community: CommunityId,
	messages: I,
	token: CancellationToken,
) -> Result<IngestReport, MarkovError>
where
	I: IntoIterator,
	I::Item: AsRef<str>,
{
	let mut session = IngestSession::with_token(corpus, community, token);
	for message in messages {
		session.push_message(message.as_ref())?;
		tokio::task::yield_now().await;
	}
	session.commit().await
}
