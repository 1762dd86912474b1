//! Normalization of raw text into corpus-ready lines.
//!
//! Sentence splitting is a heuristic: every ". " becomes a line break, so
//! abbreviations such as "Dr. Who" are split too. This is lossy on purpose.

use std::sync::LazyLock;

use regex::Regex;

/// Inline tags (`<b>`, `<a href=..>`) and character references (`&amp;`, `&#39;`).
static MARKUP: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"<[^<]+?>|&(#\d+|\w+);").expect("markup pattern is valid"));

/// Two or more consecutive blank (or whitespace-only) lines.
static BLANK_RUNS: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("blank line pattern is valid"));

/// Anything from a double whitespace to the end of the line. Feed bodies put
/// captions, bylines and link lists after such a gap.
static FEED_TAIL: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\s{2}.+").expect("feed tail pattern is valid"));

/// Normalizes raw text into newline-delimited corpus lines.
///
/// - Strips markup tags and character references
/// - Turns each ". " into a line break
/// - Collapses runs of blank lines into a single blank line
///
/// Pure and idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> String {
	let text = strip_markup(&raw.replace("\r\n", "\n").replace('\r', "\n"));
	let text = text.replace(". ", "\n");
	BLANK_RUNS.replace_all(&text, "\n\n").into_owned()
}

/// Cleans one feed item body before it is sanitized.
///
/// Markup goes first so the whitespace gaps left by removed tags count.
pub fn clean_feed_item(raw: &str) -> String {
	let text = strip_markup(raw);
	let text = FEED_TAIL.replace_all(&text, "");
	sanitize(&text)
}

/// Removes markup until none is left; stripping `<<a>b>` uncovers `<b>`.
fn strip_markup(text: &str) -> String {
	let mut current = text.to_owned();
	loop {
		let stripped = MARKUP.replace_all(&current, "");
		if stripped == current {
			return current;
		}
		current = stripped.into_owned();
	}
}
