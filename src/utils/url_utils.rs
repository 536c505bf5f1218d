//! Sequence helpers for chain traversal.
//!
//! Backs the navigator's fallback rule when a "next" link cannot be read.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Last run of digits, followed only by non-digits
static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(\D*)$").expect("trailing number pattern is valid"));

/// Increment the last number in a string, keeping zero padding
fn increment_last_number(s: &str) -> Option<String> {
    let caps = TRAILING_NUMBER.captures(s)?;
    let digits = caps.get(1)?;
    let value: u64 = digits.as_str().parse().ok()?;
    let next = value.checked_add(1)?;
    let width = digits.as_str().len();
    let replacement = format!("{next:0width$}");

    let mut out = String::with_capacity(s.len() + 1);
    out.push_str(&s[..digits.start()]);
    out.push_str(&replacement);
    out.push_str(&s[digits.end()..]);
    Some(out)
}

/// Derive the next identifier in a numbered chain
///
/// The last number in the URL path is incremented
/// (`/book/7/chapter-12.html` → `/book/7/chapter-13.html`). When the path has
/// no number the query string is tried instead (`?ch=12` → `?ch=13`). Inputs
/// that are not URLs are treated as plain identifiers (`"12"` → `"13"`).
#[must_use]
pub fn increment_sequence(identifier: &str) -> Option<String> {
    let Ok(mut url) = Url::parse(identifier) else {
        return increment_last_number(identifier);
    };

    if let Some(path) = increment_last_number(url.path()) {
        url.set_path(&path);
        return Some(url.to_string());
    }

    let query = url.query().map(str::to_string)?;
    let next_query = increment_last_number(&query)?;
    url.set_query(Some(&next_query));
    Some(url.to_string())
}
