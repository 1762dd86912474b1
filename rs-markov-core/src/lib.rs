//! Per-community Markov text generation.
//!
//! This crate keeps a bounded text corpus for each community and uses it
//! to generate plausible new text on demand:
//! - Input sanitizing into corpus lines
//! - Word-level Markov models with merging and compact serialization
//! - A size-bounded corpus store with an in-memory model cache
//! - Channel policy deciding whether to learn, speak or ignore
//! - A response engine tying it together, plus bulk ingestion sessions
//!
//! Transport, command dispatch and remote fetching stay outside; they hand
//! over plain strings and identifiers.

/// Process-wide configuration (Figment: defaults, `markov.toml`, `MARKOV_*`).
pub mod config;

/// Corpus persistence, caching and the overflow policy.
pub mod corpus;

/// Message handling: classification, learning and reply generation.
pub mod engine;

/// Crate error type.
pub mod error;

/// Feed and history ingestion sessions committing in a single append.
pub mod ingest;

/// Markov chain text model.
pub mod model;

/// Learn/speak/ignore decisions.
pub mod policy;

/// Raw text normalization.
pub mod sanitize;

/// Global and per-community settings stores.
pub mod settings;

/// Identifiers and message types exchanged with the transport.
pub mod types;

/// File helpers (atomic writes, keyed paths).
///
/// Not exposed
pub(crate) mod io;

pub use error::MarkovError;
