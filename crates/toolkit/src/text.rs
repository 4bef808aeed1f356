// Shared text helpers for output parsers

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

/// Compile a pattern literal on first use
pub(crate) fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("pattern literal compiles"))
}

fn ansi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    cached(&PATTERN, r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])")
}

/// Remove ANSI escape sequences (colors, cursor movement)
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ansi_pattern().replace_all(text, "")
}

/// Trimmed, non-empty lines
pub fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}
