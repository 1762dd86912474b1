use std::collections::{BTreeSet, HashSet};
use std::sync::mpsc;
use std::thread;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::chain::Chain;
use super::state::Token;
use crate::error::MarkovError;

/// Training text of the placeholder model served before a community has a corpus.
pub const BOOTSTRAP_CORPUS: &str = "empty\nchain";

/// Walks attempted per start state before giving up on it.
const TRIES: usize = 10;

/// Walks attempted by unconstrained generation.
const SHORT_TRIES: usize = 50;

/// Start states sampled for seeded generation. A common seed can match
/// thousands of states in a large corpus.
const MAX_START_STATES: usize = 64;

/// Inputs with at least this many lines are trained in parallel chunks.
const PARALLEL_THRESHOLD: usize = 4096;

/// Statistical text model over newline-delimited training lines.
///
/// A model is immutable once built; [`MarkovModel::merge`] produces a new
/// model that behaves as if trained on the lines of both inputs.
///
/// The model also keeps the set of training lines, so generation can
/// prefer output that is not a verbatim copy of something already said.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MarkovModel {
	chain: Chain,
	lines: HashSet<String>,
	placeholder: bool,
}

impl MarkovModel {
	/// Builds a model from newline-delimited text.
	///
	/// Lines are trimmed and split on whitespace; blank lines are skipped.
	///
	/// # Errors
	/// - `EmptyCorpus` if no line contains a word
	/// - `Config` if `state_size` is 0
	pub fn build(text: &str, state_size: usize) -> Result<Self, MarkovError> {
		let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
		if lines.is_empty() {
			return Err(MarkovError::EmptyCorpus);
		}

		if lines.len() >= PARALLEL_THRESHOLD {
			Self::build_parallel(&lines, state_size)
		} else {
			Self::build_lines(&lines, state_size)
		}
	}

	/// The deterministic model returned for communities without a corpus.
	///
	/// It is trained on [`BOOTSTRAP_CORPUS`] but never generates, and merging
	/// it with a real model yields that model unchanged.
	pub fn placeholder(state_size: usize) -> Result<Self, MarkovError> {
		let mut model = Self::build_lines(&BOOTSTRAP_CORPUS.lines().collect::<Vec<_>>(), state_size)?;
		model.placeholder = true;
		Ok(model)
	}

	pub fn is_placeholder(&self) -> bool {
		self.placeholder
	}

	pub fn state_size(&self) -> usize {
		self.chain.state_size()
	}

	/// Number of distinct training lines.
	pub fn line_count(&self) -> usize {
		self.lines.len()
	}

	/// Every word this model can emit.
	pub fn vocabulary(&self) -> BTreeSet<&str> {
		if self.placeholder {
			return BTreeSet::new();
		}
		self.chain.words().collect()
	}

	fn build_lines(lines: &[&str], state_size: usize) -> Result<Self, MarkovError> {
		let mut model = Self { chain: Chain::new(state_size)?, lines: HashSet::new(), placeholder: false };
		for line in lines {
			let words: Vec<&str> = line.split_whitespace().collect();
			if words.is_empty() {
				continue;
			}
			model.chain.add_line(&words);
			model.lines.insert(words.join(" "));
		}

		if model.lines.is_empty() {
			return Err(MarkovError::EmptyCorpus);
		}
		Ok(model)
	}

	/// Splits the lines into chunks, trains partial models on scoped threads
	/// and merges them into one.
	fn build_parallel(lines: &[&str], state_size: usize) -> Result<Self, MarkovError> {
		let chunks = num_cpus::get() * 2;
		let chunk_size = lines.len().div_ceil(chunks);

		let (tx, rx) = mpsc::channel();
		thread::scope(|scope| {
			for chunk in lines.chunks(chunk_size) {
				let tx = tx.clone();
				scope.spawn(move || {
					// The receiver outlives the scope, so sending cannot fail
					let _ = tx.send(Self::build_lines(chunk, state_size));
				});
			}
			drop(tx);

			let mut merged: Option<Self> = None;
			for partial in rx.iter() {
				let partial = partial?;
				merged = Some(match merged.take() {
					Some(mut model) => {
						model.absorb(&partial)?;
						model
					}
					None => partial,
				});
			}
			merged.ok_or(MarkovError::EmptyCorpus)
		})
	}

	/// Combines the statistics of two models into a new one.
	///
	/// Transition counts are summed and training lines united, so the result
	/// can generate from either vocabulary. A placeholder contributes nothing.
	///
	/// # Errors
	/// Returns an error if the state sizes differ.
	pub fn merge(&self, other: &Self) -> Result<Self, MarkovError> {
		if other.placeholder {
			return Ok(self.clone());
		}
		if self.placeholder {
			return Ok(other.clone());
		}
		let mut merged = self.clone();
		merged.absorb(other)?;
		Ok(merged)
	}

	fn absorb(&mut self, other: &Self) -> Result<(), MarkovError> {
		self.chain.merge(&other.chain)?;
		self.lines.extend(other.lines.iter().cloned());
		Ok(())
	}

	/// Serializes the model with `postcard`.
	pub fn to_bytes(&self) -> Result<Vec<u8>, MarkovError> {
		Ok(postcard::to_stdvec(self)?)
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, MarkovError> {
		Ok(postcard::from_bytes(bytes)?)
	}

	/// Generates a line beginning with `seed`, at most `max_len` characters long.
	///
	/// Returns `None` when the seed is not in the vocabulary, when it has
	/// more words than the state size, or when no walk fits in `max_len`.
	pub fn generate_from(&self, seed: &str, max_len: usize) -> Option<String> {
		let seed: Vec<&str> = seed.split_whitespace().collect();
		let mut starts = self.chain.start_states(&seed);
		starts.shuffle(&mut rand::rng());
		starts.truncate(MAX_START_STATES);
		self.generate(&starts, TRIES, max_len)
	}

	/// Generates any line of at most `max_len` characters.
	///
	/// Returns `None` for a placeholder model or if nothing short enough
	/// comes out within the retry budget.
	pub fn generate_short(&self, max_len: usize) -> Option<String> {
		self.generate(&[self.chain.begin_state()], SHORT_TRIES, max_len)
	}

	/// Walks from each start state up to `tries` times.
	///
	/// The first line that fits and is not a training line wins. If every
	/// fitting line was verbatim, the first of those is returned instead.
	fn generate(&self, starts: &[Vec<Token>], tries: usize, max_len: usize) -> Option<String> {
		if self.placeholder || self.chain.is_empty() {
			return None;
		}

		let mut rng = rand::rng();
		let mut verbatim = None;
		for start in starts {
			let prefix: Vec<&str> = start.iter().filter_map(Token::word).collect();
			for _ in 0..tries {
				let Some(words) = self.chain.walk(start, &mut rng) else {
					continue;
				};
				let sentence = prefix
					.iter()
					.copied()
					.chain(words.iter().map(String::as_str))
					.collect::<Vec<_>>()
					.join(" ");
				if sentence.is_empty() || sentence.chars().count() > max_len {
					continue;
				}
				if self.lines.contains(&sentence) {
					verbatim.get_or_insert(sentence);
					continue;
				}
				return Some(sentence);
			}
		}
		verbatim
	}
}
