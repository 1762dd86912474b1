use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::backend::CorpusBackend;
use super::cache::ModelCache;
use super::CorpusUsage;
use crate::error::MarkovError;
use crate::model::MarkovModel;
use crate::settings::SettingsStore;
use crate::types::CommunityId;

/// Bounded, persistent corpus of every community.
///
/// Mutations of one community are serialized by a per-community lock held
/// across load, merge, size check and write; communities never contend.
/// Model building, merging and serialization run on the blocking pool so
/// large corpora do not stall the event loop.
pub struct CorpusStore {
	backend: Arc<dyn CorpusBackend>,
	settings: Arc<dyn SettingsStore>,
	cache: Arc<ModelCache>,
	/// One lock per community; an entry is pruned on `wipe` once no task holds it.
	locks: DashMap<CommunityId, Arc<Mutex<()>>>,
	state_size: usize,
}

impl CorpusStore {
	pub fn new(backend: Arc<dyn CorpusBackend>, settings: Arc<dyn SettingsStore>, state_size: usize) -> Self {
		Self { backend, settings, cache: Arc::new(ModelCache::new()), locks: DashMap::new(), state_size }
	}

	pub fn cache(&self) -> &ModelCache {
		&self.cache
	}

	pub fn settings(&self) -> &Arc<dyn SettingsStore> {
		&self.settings
	}

	fn lock_for(&self, id: &CommunityId) -> Arc<Mutex<()>> {
		Arc::clone(self.locks.entry(id.clone()).or_default().value())
	}

	/// Deserializes the persisted model, or builds the placeholder if there is none.
	fn read_model(backend: &dyn CorpusBackend, id: &CommunityId, state_size: usize) -> Result<MarkovModel, MarkovError> {
		match backend.read(id)? {
			Some(bytes) => MarkovModel::from_bytes(&bytes),
			None => MarkovModel::placeholder(state_size),
		}
	}

	async fn read_model_blocking(&self, id: &CommunityId) -> Result<MarkovModel, MarkovError> {
		let backend = Arc::clone(&self.backend);
		let id = id.clone();
		let state_size = self.state_size;
		tokio::task::spawn_blocking(move || Self::read_model(&*backend, &id, state_size)).await?
	}

	/// Loads the persisted model, bypassing the cache.
	///
	/// A community without a corpus gets the placeholder model; absence is
	/// never an error here.
	pub async fn load(&self, id: &CommunityId) -> Result<MarkovModel, MarkovError> {
		let lock = self.lock_for(id);
		let _guard = lock.lock().await;
		self.read_model_blocking(id).await
	}

	/// The community's model, served from the cache when possible.
	pub async fn model(&self, id: &CommunityId) -> Result<Arc<MarkovModel>, MarkovError> {
		if let Some(model) = self.cache.get(id) {
			return Ok(model);
		}

		let lock = self.lock_for(id);
		let _guard = lock.lock().await;
		self.cached_or_load(id).await
	}

	/// Cache lookup with a backend fallback. The caller holds the community lock.
	async fn cached_or_load(&self, id: &CommunityId) -> Result<Arc<MarkovModel>, MarkovError> {
		if let Some(model) = self.cache.get(id) {
			return Ok(model);
		}
		let model = Arc::new(self.read_model_blocking(id).await?);
		self.cache.insert(id.clone(), Arc::clone(&model));
		Ok(model)
	}

	/// Trains on `text` and merges the result into the community's corpus.
	///
	/// The caller is expected to have sanitized `text` already. The merged
	/// model is only written if its serialized size fits the `max_corpus`
	/// allowance; otherwise nothing changes.
	///
	/// # Errors
	/// - `EmptyCorpus` if `text` has no trainable line (nothing written)
	/// - `CorpusOverflow` if the merged corpus is too large (nothing written)
	/// - storage faults from the backend
	pub async fn append(&self, id: &CommunityId, text: &str) -> Result<Arc<MarkovModel>, MarkovError> {
		// Owned guard: it moves into the blocking task, so the lock outlives a
		// cancelled caller until the write and cache update are done.
		let guard = self.lock_for(id).lock_owned().await;
		let base = self.cached_or_load(id).await?;

		let backend = Arc::clone(&self.backend);
		let cache = Arc::clone(&self.cache);
		let max = self.settings.max_corpus();
		let state_size = self.state_size;
		let text = text.to_owned();
		let id = id.clone();

		tokio::task::spawn_blocking(move || -> Result<Arc<MarkovModel>, MarkovError> {
			let _guard = guard;
			let delta = MarkovModel::build(&text, state_size)?;
			let merged = base.merge(&delta)?;
			let bytes = merged.to_bytes()?;
			let size = bytes.len() as u64;
			if size > max {
				debug!(community = %id, size, max, "corpus append rejected: over allowance");
				return Err(MarkovError::CorpusOverflow { size, max });
			}

			backend.write(&id, &bytes)?;
			let merged = Arc::new(merged);
			cache.insert(id.clone(), Arc::clone(&merged));
			info!(community = %id, size, lines = merged.line_count(), "corpus updated");
			Ok(merged)
		})
		.await?
	}

	/// Deletes the community's corpus.
	///
	/// # Errors
	/// `NotFound` if nothing was persisted.
	pub async fn wipe(&self, id: &CommunityId) -> Result<(), MarkovError> {
		let deleted = {
			let lock = self.lock_for(id);
			let _guard = lock.lock().await;
			let deleted = self.backend.delete(id);
			self.cache.invalidate(id);
			deleted
		};
		self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);

		if !deleted? {
			return Err(MarkovError::NotFound(id.clone()));
		}
		info!(community = %id, "corpus wiped");
		Ok(())
	}

	#[cfg(test)]
	fn lock_count(&self) -> usize {
		self.locks.len()
	}

	/// Serialized size of the persisted corpus, 0 if there is none.
	pub fn usage_bytes(&self, id: &CommunityId) -> Result<u64, MarkovError> {
		Ok(self.backend.size(id)?.unwrap_or(0))
	}

	/// Usage measured against the current allowance.
	pub fn usage(&self, id: &CommunityId) -> Result<CorpusUsage, MarkovError> {
		Ok(CorpusUsage::new(self.usage_bytes(id)?, self.settings.max_corpus()))
	}
}
