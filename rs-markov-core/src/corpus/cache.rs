use std::sync::Arc;

use dashmap::DashMap;

use crate::model::MarkovModel;
use crate::types::CommunityId;

/// Loaded models by community.
///
/// Only an optimization: the corpus backend stays authoritative and any
/// entry may be dropped and recomputed at any time.
#[derive(Debug, Default)]
pub struct ModelCache {
	entries: DashMap<CommunityId, Arc<MarkovModel>>,
}

impl ModelCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, id: &CommunityId) -> Option<Arc<MarkovModel>> {
		self.entries.get(id).map(|entry| Arc::clone(entry.value()))
	}

	/// Returns the cached model, or stores and returns the one from `load`.
	pub fn get_or_try_insert<E>(
		&self,
		id: &CommunityId,
		load: impl FnOnce() -> Result<MarkovModel, E>,
	) -> Result<Arc<MarkovModel>, E> {
		if let Some(model) = self.get(id) {
			return Ok(model);
		}
		let model = Arc::new(load()?);
		self.entries.insert(id.clone(), Arc::clone(&model));
		Ok(model)
	}

	pub fn insert(&self, id: CommunityId, model: Arc<MarkovModel>) {
		self.entries.insert(id, model);
	}

	pub fn invalidate(&self, id: &CommunityId) {
		self.entries.remove(id);
	}

	pub fn clear(&self) {
		self.entries.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn loads_once_then_serves_cached() {
		let cache = ModelCache::new();
		let id = CommunityId::from("guild");
		let mut loads = 0;
		for _ in 0..3 {
			cache
				.get_or_try_insert::<()>(&id, || {
					loads += 1;
					Ok(MarkovModel::build("hello world", 2).unwrap())
				})
				.unwrap();
		}
		assert_eq!(loads, 1);
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn invalidate_forces_reload() {
		let cache = ModelCache::new();
		let id = CommunityId::from("guild");
		cache.insert(id.clone(), Arc::new(MarkovModel::placeholder(2).unwrap()));
		cache.invalidate(&id);
		assert!(cache.get(&id).is_none());
		assert!(cache.is_empty());
	}

	#[test]
	fn load_errors_leave_no_entry() {
		let cache = ModelCache::new();
		let id = CommunityId::from("guild");
		assert!(cache.get_or_try_insert(&id, || Err("disk on fire")).is_err());
		assert!(cache.get(&id).is_none());
	}
}
