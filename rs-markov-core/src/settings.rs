//! Global and per-community settings.
//!
//! Missing entries always read as their defaults; a community's settings
//! are only written once something is changed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_MAX_CORPUS;
use crate::error::MarkovError;
use crate::io::{keyed_path, read_optional, write_atomic};
use crate::types::{ChannelId, CommunityId};

pub const MAX_CORPUS: &str = "max_corpus";
pub const TOGGLE: &str = "toggle";
pub const MENTION: &str = "mention";
pub const TYPING_DELAY: &str = "typing_delay";
pub const SOLO: &str = "solo";
pub const LEARN_CHANNELS: &str = "learn_channels";
pub const SPEAK_CHANNELS: &str = "speak_channels";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GlobalSettings {
	/// Maximum serialized corpus size per community, in bytes.
	pub max_corpus: u64,
}

impl Default for GlobalSettings {
	fn default() -> Self {
		Self { max_corpus: DEFAULT_MAX_CORPUS }
	}
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CommunitySettings {
	/// Learning switch; when off learning pauses, mention-triggered replies still work.
	pub toggle: bool,
	/// Prefix replies with a mention of the author.
	pub mention: bool,
	pub typing_delay: bool,
	/// Occasionally speak without being mentioned.
	pub solo: bool,
	/// Channels whose messages are learned from.
	pub learn_channels: BTreeSet<ChannelId>,
	/// Channels replies may go to. Empty means every channel.
	pub speak_channels: BTreeSet<ChannelId>,
}

impl Default for CommunitySettings {
	fn default() -> Self {
		Self {
			toggle: true,
			mention: false,
			typing_delay: true,
			solo: false,
			learn_channels: BTreeSet::new(),
			speak_channels: BTreeSet::new(),
		}
	}
}

/// A setting value addressed by name.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum SettingValue {
	Flag(bool),
	Size(u64),
	Channels(BTreeSet<ChannelId>),
}

impl From<bool> for SettingValue {
	fn from(flag: bool) -> Self {
		Self::Flag(flag)
	}
}

impl From<u64> for SettingValue {
	fn from(bytes: u64) -> Self {
		Self::Size(bytes)
	}
}

/// Which channel allow-list an operation targets.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelList {
	Learn,
	Speak,
}

impl CommunitySettings {
	pub fn get(&self, name: &str) -> Result<SettingValue, MarkovError> {
		Ok(match name {
			TOGGLE => SettingValue::Flag(self.toggle),
			MENTION => SettingValue::Flag(self.mention),
			TYPING_DELAY => SettingValue::Flag(self.typing_delay),
			SOLO => SettingValue::Flag(self.solo),
			LEARN_CHANNELS => SettingValue::Channels(self.learn_channels.clone()),
			SPEAK_CHANNELS => SettingValue::Channels(self.speak_channels.clone()),
			_ => return Err(MarkovError::UnknownSetting(name.to_owned())),
		})
	}

	pub fn set(&mut self, name: &str, value: SettingValue) -> Result<(), MarkovError> {
		match (name, value) {
			(TOGGLE, SettingValue::Flag(v)) => self.toggle = v,
			(MENTION, SettingValue::Flag(v)) => self.mention = v,
			(TYPING_DELAY, SettingValue::Flag(v)) => self.typing_delay = v,
			(SOLO, SettingValue::Flag(v)) => self.solo = v,
			(LEARN_CHANNELS, SettingValue::Channels(v)) => self.learn_channels = v,
			(SPEAK_CHANNELS, SettingValue::Channels(v)) => self.speak_channels = v,
			(TOGGLE | MENTION | TYPING_DELAY | SOLO, _) => return Err(invalid(name, "expected a boolean")),
			(LEARN_CHANNELS | SPEAK_CHANNELS, _) => return Err(invalid(name, "expected a list of channels")),
			_ => return Err(MarkovError::UnknownSetting(name.to_owned())),
		}
		Ok(())
	}

	fn flag_mut(&mut self, name: &str) -> Result<&mut bool, MarkovError> {
		match name {
			TOGGLE => Ok(&mut self.toggle),
			MENTION => Ok(&mut self.mention),
			TYPING_DELAY => Ok(&mut self.typing_delay),
			SOLO => Ok(&mut self.solo),
			LEARN_CHANNELS | SPEAK_CHANNELS => Err(invalid(name, "not a boolean option")),
			_ => Err(MarkovError::UnknownSetting(name.to_owned())),
		}
	}

	pub fn channels(&self, list: ChannelList) -> &BTreeSet<ChannelId> {
		match list {
			ChannelList::Learn => &self.learn_channels,
			ChannelList::Speak => &self.speak_channels,
		}
	}

	fn channels_mut(&mut self, list: ChannelList) -> &mut BTreeSet<ChannelId> {
		match list {
			ChannelList::Learn => &mut self.learn_channels,
			ChannelList::Speak => &mut self.speak_channels,
		}
	}
}

fn invalid(name: &str, reason: &str) -> MarkovError {
	MarkovError::InvalidSetting { name: name.to_owned(), reason: reason.to_owned() }
}

/// Get/set access to global and per-community settings.
///
/// `max_corpus` is read on every append, so implementations keep it in
/// memory and never block on reading it.
pub trait SettingsStore: Send + Sync {
	fn max_corpus(&self) -> u64;

	fn set_max_corpus(&self, bytes: u64) -> Result<(), MarkovError>;

	/// Settings of a community, defaults if it never changed any.
	fn community(&self, id: &CommunityId) -> Result<CommunitySettings, MarkovError>;

	/// Applies `update` and persists the result. Nothing is stored if it fails.
	fn update_community(
		&self,
		id: &CommunityId,
		update: &mut dyn FnMut(&mut CommunitySettings) -> Result<(), MarkovError>,
	) -> Result<CommunitySettings, MarkovError>;

	/// Reads a setting by name. Global settings take no community.
	fn get_setting(&self, name: &str, community: Option<&CommunityId>) -> Result<SettingValue, MarkovError> {
		match community {
			None if name == MAX_CORPUS => Ok(SettingValue::Size(self.max_corpus())),
			None => Err(MarkovError::UnknownSetting(name.to_owned())),
			Some(id) => self.community(id)?.get(name),
		}
	}

	/// Writes a setting by name. Global settings take no community.
	fn set_setting(
		&self,
		name: &str,
		value: SettingValue,
		community: Option<&CommunityId>,
	) -> Result<(), MarkovError> {
		match (community, value) {
			(None, SettingValue::Size(bytes)) if name == MAX_CORPUS => self.set_max_corpus(bytes),
			(None, _) if name == MAX_CORPUS => Err(invalid(name, "expected a size in bytes")),
			(None, _) => Err(MarkovError::UnknownSetting(name.to_owned())),
			(Some(id), value) => {
				let mut value = Some(value);
				self.update_community(id, &mut |settings| match value.take() {
					Some(value) => settings.set(name, value),
					None => Ok(()),
				})?;
				Ok(())
			}
		}
	}

	/// Flips a boolean option and returns its new value.
	fn toggle(&self, id: &CommunityId, name: &str) -> Result<bool, MarkovError> {
		let mut flipped = false;
		self.update_community(id, &mut |settings| {
			let flag = settings.flag_mut(name)?;
			*flag = !*flag;
			flipped = *flag;
			Ok(())
		})?;
		Ok(flipped)
	}

	/// Adds a channel to an allow-list. Returns `false` if it was already listed.
	fn add_channel(&self, id: &CommunityId, list: ChannelList, channel: &ChannelId) -> Result<bool, MarkovError> {
		if self.community(id)?.channels(list).contains(channel) {
			return Ok(false);
		}
		self.update_community(id, &mut |settings| {
			settings.channels_mut(list).insert(channel.clone());
			Ok(())
		})?;
		Ok(true)
	}

	/// Removes a channel from an allow-list. Returns `false` if it was not listed.
	fn remove_channel(&self, id: &CommunityId, list: ChannelList, channel: &ChannelId) -> Result<bool, MarkovError> {
		if !self.community(id)?.channels(list).contains(channel) {
			return Ok(false);
		}
		self.update_community(id, &mut |settings| {
			settings.channels_mut(list).remove(channel);
			Ok(())
		})?;
		Ok(true)
	}
}

/// Settings kept in memory only.
#[derive(Debug)]
pub struct MemorySettingsStore {
	max_corpus: AtomicU64,
	communities: DashMap<CommunityId, CommunitySettings>,
}

impl MemorySettingsStore {
	pub fn new(max_corpus: u64) -> Self {
		Self { max_corpus: AtomicU64::new(max_corpus), communities: DashMap::new() }
	}
}

impl Default for MemorySettingsStore {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_CORPUS)
	}
}

impl SettingsStore for MemorySettingsStore {
	fn max_corpus(&self) -> u64 {
		self.max_corpus.load(Ordering::Relaxed)
	}

	fn set_max_corpus(&self, bytes: u64) -> Result<(), MarkovError> {
		self.max_corpus.store(bytes, Ordering::Relaxed);
		Ok(())
	}

	fn community(&self, id: &CommunityId) -> Result<CommunitySettings, MarkovError> {
		Ok(self.communities.get(id).map(|s| s.value().clone()).unwrap_or_default())
	}

	fn update_community(
		&self,
		id: &CommunityId,
		update: &mut dyn FnMut(&mut CommunitySettings) -> Result<(), MarkovError>,
	) -> Result<CommunitySettings, MarkovError> {
		let mut entry = self.communities.entry(id.clone()).or_default();
		let mut next = entry.value().clone();
		update(&mut next)?;
		*entry.value_mut() = next.clone();
		Ok(next)
	}
}

/// Settings persisted as JSON under a data directory.
///
/// - `settings.json` holds the global settings
/// - `communities/<hex id>.json` holds each community's settings
///
/// Files are read once and cached; every change is written through.
#[derive(Debug)]
pub struct JsonSettingsStore {
	dir: PathBuf,
	max_corpus: AtomicU64,
	communities: DashMap<CommunityId, CommunitySettings>,
}

impl JsonSettingsStore {
	/// Opens the store, seeding `max_corpus` with `default_max_corpus` when
	/// no global settings file exists yet.
	pub fn open<P: AsRef<Path>>(dir: P, default_max_corpus: u64) -> Result<Self, MarkovError> {
		let dir = dir.as_ref().to_path_buf();
		let global = match read_optional(dir.join("settings.json"))? {
			Some(bytes) => serde_json::from_slice::<GlobalSettings>(&bytes)?,
			None => GlobalSettings { max_corpus: default_max_corpus },
		};
		Ok(Self { dir, max_corpus: AtomicU64::new(global.max_corpus), communities: DashMap::new() })
	}

	fn community_path(&self, id: &CommunityId) -> PathBuf {
		keyed_path(self.dir.join("communities"), id.as_str(), "json")
	}

	fn read_community(&self, id: &CommunityId) -> Result<CommunitySettings, MarkovError> {
		Ok(match read_optional(self.community_path(id))? {
			Some(bytes) => serde_json::from_slice(&bytes)?,
			None => CommunitySettings::default(),
		})
	}
}

impl SettingsStore for JsonSettingsStore {
	fn max_corpus(&self) -> u64 {
		self.max_corpus.load(Ordering::Relaxed)
	}

	fn set_max_corpus(&self, bytes: u64) -> Result<(), MarkovError> {
		let json = serde_json::to_vec_pretty(&GlobalSettings { max_corpus: bytes })?;
		write_atomic(self.dir.join("settings.json"), &json)?;
		self.max_corpus.store(bytes, Ordering::Relaxed);
		Ok(())
	}

	fn community(&self, id: &CommunityId) -> Result<CommunitySettings, MarkovError> {
		if let Some(settings) = self.communities.get(id) {
			return Ok(settings.value().clone());
		}
		let settings = self.read_community(id)?;
		// A concurrent update may have landed meanwhile; it wins
		Ok(self.communities.entry(id.clone()).or_insert(settings).value().clone())
	}

	fn update_community(
		&self,
		id: &CommunityId,
		update: &mut dyn FnMut(&mut CommunitySettings) -> Result<(), MarkovError>,
	) -> Result<CommunitySettings, MarkovError> {
		let mut entry = self.communities.entry(id.clone()).or_try_insert_with(|| self.read_community(id))?;
		let mut next = entry.value().clone();
		update(&mut next)?;
		write_atomic(self.community_path(id), &serde_json::to_vec_pretty(&next)?)?;
		*entry.value_mut() = next.clone();
		Ok(next)
	}
}
