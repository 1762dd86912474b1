use std::collections::HashMap;

use rand::Rng;

use serde::{Deserialize, Serialize};

/// A unit of a chain state or transition.
///
/// `Begin` pads the state at the start of a line and `End` marks its last
/// transition, so every line is a walk from the all-`Begin` state to `End`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
	Begin,
	Word(String),
	End,
}

impl Token {
	pub fn word(&self) -> Option<&str> {
		match self {
			Token::Word(word) => Some(word),
			_ => None,
		}
	}
}

/// Outgoing transitions of one chain state.
///
/// Conceptually, this is a node in a Markov chain where outgoing edges
/// are weighted by their number of observations.
///
/// ## Invariants
/// - Each transition occurrence count is strictly positive
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct State {
	/// Example: { Word("world") => 42, End => 3 }
	transitions: HashMap<Token, usize>,
}

impl State {
	/// Records an occurrence of a transition toward `next`.
	pub fn add_transition(&mut self, next: Token) {
		*self.transitions.entry(next).or_insert(0) += 1;
	}

	/// Picks the next token using weighted random sampling.
	///
	/// The probability of selecting a token is proportional to its
	/// occurrence count. Returns `None` if the state has no transitions.
	pub fn predict<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Token> {
		let total: usize = self.transitions.values().sum();
		if total == 0 {
			return None;
		}

		let mut r = rng.random_range(0..total);
		let mut fallback = None;
		for (next, occurrence) in &self.transitions {
			if r < *occurrence {
				return Some(next);
			}
			r -= occurrence;
			fallback = Some(next);
		}

		// Unreachable while the counts sum to `total`
		fallback
	}

	/// Adds the counts of `other` to this state.
	pub fn merge(&mut self, other: &Self) {
		for (next, occurrence) in &other.transitions {
			*self.transitions.entry(next.clone()).or_insert(0) += *occurrence;
		}
	}

	pub fn tokens(&self) -> impl Iterator<Item = &Token> {
		self.transitions.keys()
	}

	#[cfg(test)]
	pub fn count(&self, next: &Token) -> usize {
		self.transitions.get(next).copied().unwrap_or(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn word(w: &str) -> Token {
		Token::Word(w.to_owned())
	}

	#[test]
	fn empty_state_predicts_nothing() {
		assert!(State::default().predict(&mut rand::rng()).is_none());
	}

	#[test]
	fn single_transition_is_always_chosen() {
		let mut state = State::default();
		state.add_transition(word("world"));
		for _ in 0..20 {
			assert_eq!(state.predict(&mut rand::rng()), Some(&word("world")));
		}
	}

	#[test]
	fn merge_sums_counts() {
		let mut left = State::default();
		left.add_transition(word("a"));
		left.add_transition(Token::End);
		let mut right = State::default();
		right.add_transition(word("a"));
		right.add_transition(word("b"));

		left.merge(&right);
		assert_eq!(left.count(&word("a")), 2);
		assert_eq!(left.count(&word("b")), 1);
		assert_eq!(left.count(&Token::End), 1);
	}
}
