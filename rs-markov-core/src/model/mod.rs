//! Word-level Markov text model.
//!
//! - Chain states and weighted transitions (`State`, `Token`)
//! - Fixed state-size chain with merging (`Chain`)
//! - The corpus model with training, merging, serialization and
//!   two-tier generation (`MarkovModel`)

/// Corpus model built over newline-delimited training lines.
///
/// Supports parallel construction, merging, `postcard` serialization,
/// seeded generation and length-bounded fallback generation.
pub mod markov_model;

/// Word chain of a fixed state size.
mod chain;

/// A single chain state and its weighted outgoing transitions.
mod state;

pub use markov_model::{BOOTSTRAP_CORPUS, MarkovModel};
