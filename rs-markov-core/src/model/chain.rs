use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::{State, Token};
use crate::error::MarkovError;

/// Upper bound on words produced by one walk. Walks end at `End` with
/// probability 1, this only bounds pathological cycles.
const MAX_WALK_WORDS: usize = 512;

/// Word-level Markov chain of a fixed state size.
///
/// # Invariants
/// - `state_size` is always >= 1
/// - Every key of `states` has exactly `state_size` tokens
/// - `End` is reachable from every state, since each one was produced
///   by a line that ended
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Chain {
	state_size: usize,
	states: HashMap<Vec<Token>, State>,
}

impl Chain {
	pub fn new(state_size: usize) -> Result<Self, MarkovError> {
		if state_size == 0 {
			return Err(MarkovError::Config("state_size must be >= 1".to_owned()));
		}
		Ok(Self { state_size, states: HashMap::new() })
	}

	pub fn state_size(&self) -> usize {
		self.state_size
	}

	pub fn is_empty(&self) -> bool {
		self.states.is_empty()
	}

	/// The state every line starts from.
	pub fn begin_state(&self) -> Vec<Token> {
		vec![Token::Begin; self.state_size]
	}

	/// Records the transitions of one line of words.
	///
	/// The line is padded with `state_size` `Begin` tokens and a final `End`.
	pub fn add_line(&mut self, words: &[&str]) {
		if words.is_empty() {
			return;
		}

		let mut tokens = self.begin_state();
		tokens.extend(words.iter().map(|w| Token::Word((*w).to_owned())));
		tokens.push(Token::End);

		for window in tokens.windows(self.state_size + 1) {
			let (key, next) = window.split_at(self.state_size);
			self.states.entry(key.to_vec()).or_default().add_transition(next[0].clone());
		}
	}

	/// States whose leading words equal `seed`, ignoring `Begin` padding.
	///
	/// `[Begin, "hello"]` and `["hello", "world"]` both match the seed
	/// `["hello"]`, so seeds found in the middle of a line are usable too.
	pub fn start_states(&self, seed: &[&str]) -> Vec<Vec<Token>> {
		if seed.is_empty() || seed.len() > self.state_size {
			return Vec::new();
		}

		self.states
			.keys()
			.filter(|key| {
				let mut words = key.iter().filter_map(Token::word);
				seed.iter().all(|s| words.next() == Some(*s))
			})
			.cloned()
			.collect()
	}

	/// Walks the chain from `init` until `End`, returning the words produced
	/// after the initial state.
	///
	/// Returns `None` if the walk hits an unknown state or runs too long.
	pub fn walk<R: Rng + ?Sized>(&self, init: &[Token], rng: &mut R) -> Option<Vec<String>> {
		let mut state = init.to_vec();
		let mut words = Vec::new();

		loop {
			match self.states.get(&state)?.predict(rng)? {
				Token::End => return Some(words),
				Token::Begin => return None,
				Token::Word(word) => {
					if words.len() >= MAX_WALK_WORDS {
						return None;
					}
					words.push(word.clone());
					state.remove(0);
					state.push(Token::Word(word.clone()));
				}
			}
		}
	}

	/// Every word the chain can emit.
	pub fn words(&self) -> impl Iterator<Item = &str> {
		self.states.values().flat_map(State::tokens).filter_map(Token::word)
	}

	/// Merges another chain into this one.
	///
	/// Occurrence counts for matching states and transitions are summed.
	///
	/// # Errors
	/// Returns an error if the state sizes do not match.
	pub fn merge(&mut self, other: &Self) -> Result<(), MarkovError> {
		if self.state_size != other.state_size {
			return Err(MarkovError::Config(format!(
				"state size mismatch: {} vs {}",
				self.state_size, other.state_size
			)));
		}

		for (key, state) in &other.states {
			if let Some(existing) = self.states.get_mut(key) {
				existing.merge(state);
			} else {
				self.states.insert(key.clone(), state.clone());
			}
		}

		Ok(())
	}
}
