//! Process-wide configuration loaded with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `./markov.toml`
//! 3. `MARKOV_*` environment variables

use std::path::PathBuf;
use std::time::Duration;

use figment::{
	Figment,
	providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::MarkovError;

/// Default corpus allowance per community, in serialized bytes.
pub const DEFAULT_MAX_CORPUS: u64 = 10_000_000;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct MarkovConfig {
	/// Root directory for settings files and the `corpus/` folder.
	pub data_dir: PathBuf,
	/// Initial value of the global `max_corpus` setting.
	pub max_corpus_bytes: u64,
	/// Messages starting with any of these characters are commands, never corpus.
	pub command_prefixes: Vec<String>,
	/// Upper bound on generated response length, in characters.
	pub response_max_chars: usize,
	/// Probability that an unmentioned message triggers a reply in solo mode.
	pub solo_chance: f64,
	/// Seconds of simulated typing per response character.
	pub typing_delay_per_char: f64,
	/// Number of words forming a chain state.
	pub state_size: usize,
	/// Prefix used when mentioning the author back. `{user_id}` is substituted.
	pub mention_template: String,
	pub bind_address: String,
	pub port: u16,
}

impl Default for MarkovConfig {
	fn default() -> Self {
		Self {
			data_dir: PathBuf::from("data/markov"),
			max_corpus_bytes: DEFAULT_MAX_CORPUS,
			command_prefixes: vec!["!".to_owned()],
			response_max_chars: 140,
			solo_chance: 0.10,
			typing_delay_per_char: 0.05,
			state_size: 2,
			mention_template: "<@{user_id}> ".to_owned(),
			bind_address: "127.0.0.1".to_owned(),
			port: 5000,
		}
	}
}

impl MarkovConfig {
	/// Rejects values the rest of the crate cannot work with.
	pub fn validate(&self) -> Result<(), MarkovError> {
		if self.state_size == 0 {
			return Err(MarkovError::Config("state_size must be >= 1".to_owned()));
		}
		if !(0.0..=1.0).contains(&self.solo_chance) {
			return Err(MarkovError::Config(format!(
				"solo_chance must be between 0.0 and 1.0, got {}",
				self.solo_chance
			)));
		}
		if !self.typing_delay_per_char.is_finite() || self.typing_delay_per_char < 0.0 {
			return Err(MarkovError::Config(format!(
				"typing_delay_per_char must be a finite number >= 0, got {}",
				self.typing_delay_per_char
			)));
		}
		Ok(())
	}

	/// Suggested pre-send delay for a response of `chars` characters.
	///
	/// Saturates at `Duration::MAX` when the product does not fit.
	pub fn typing_delay(&self, chars: usize) -> Duration {
		Duration::try_from_secs_f64(self.typing_delay_per_char * chars as f64).unwrap_or(Duration::MAX)
	}
}

/// Loads the configuration from `./markov.toml` and `MARKOV_*` variables.
pub fn load_config() -> Result<MarkovConfig, MarkovError> {
	let config: MarkovConfig = Figment::new()
		.merge(Serialized::defaults(MarkovConfig::default()))
		.merge(Toml::file("markov.toml"))
		.merge(Env::prefixed("MARKOV_"))
		.extract()?;
	config.validate()?;
	Ok(config)
}

/// Loads the configuration from a TOML string only. Used by tests.
pub fn load_config_from_str(toml_content: &str) -> Result<MarkovConfig, MarkovError> {
	let config: MarkovConfig = Figment::new()
		.merge(Serialized::defaults(MarkovConfig::default()))
		.merge(Toml::string(toml_content))
		.extract()?;
	config.validate()?;
	Ok(config)
}
