//! Per-community corpus persistence.
//!
//! - Record storage behind a trait (`CorpusBackend`)
//! - In-memory model cache (`ModelCache`)
//! - The bounded store with the overflow policy (`CorpusStore`)

use serde::Serialize;

pub mod backend;
pub mod cache;
pub mod store;

pub use backend::{CorpusBackend, FsCorpusBackend, MemoryCorpusBackend};
pub use cache::ModelCache;
pub use store::CorpusStore;

/// How much of its allowance a community's corpus uses.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorpusUsage {
	pub used: u64,
	pub max: u64,
	/// Whole percent of `max` in use.
	pub percent: u64,
}

impl CorpusUsage {
	pub fn new(used: u64, max: u64) -> Self {
		let percent = if max == 0 { 100 } else { used.saturating_mul(100) / max };
		Self { used, max, percent }
	}

	pub fn summary(&self) -> String {
		format!(
			"You have used `{}` of your `{}` allowance (`{}%`)",
			format_size(self.used),
			format_size(self.max),
			self.percent
		)
	}
}

/// Formats a byte count with binary units, e.g. `"9.5MiB"`.
pub fn format_size(bytes: u64) -> String {
	const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

	let mut value = bytes as f64;
	for unit in UNITS {
		if value < 1024.0 {
			return format!("{value:.1}{unit}B");
		}
		value /= 1024.0;
	}
	format!("{value:.1}YiB")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sizes_use_binary_units() {
		assert_eq!(format_size(0), "0.0B");
		assert_eq!(format_size(512), "512.0B");
		assert_eq!(format_size(1536), "1.5KiB");
		assert_eq!(format_size(10_000_000), "9.5MiB");
	}

	#[test]
	fn usage_percent_is_truncated() {
		let usage = CorpusUsage::new(2_500_000, 10_000_000);
		assert_eq!(usage.percent, 25);
		assert_eq!(usage.summary(), "You have used `2.4MiB` of your `9.5MiB` allowance (`25%`)");
		assert_eq!(CorpusUsage::new(0, 0).percent, 100);
	}
}
