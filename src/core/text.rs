//! Small helpers for the loosely formatted text the feeds return

use regex::Regex;
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("number regex")
});

/// Removes markup tags and surrounding whitespace.
pub fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, "").trim().to_string()
}

/// Parses the numeric prefix of `text`, ignoring leading whitespace and any
/// trailing garbage (`"1.23%"` gives `1.23`).
pub fn leading_f64(text: &str) -> Option<f64> {
    LEADING_NUMBER
        .find(text.trim_start())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// First `n` characters of `text`.
pub fn prefix_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}
