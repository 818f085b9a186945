//! Membership reference detection.
//!
//! Members pay by bank transfer quoting a reference of the form `HS` followed
//! by their membership number, e.g. `HS01234`. Banks and payers mangle it in
//! predictable ways: `5` for `S`, `O` for `0`, a stray space, lower case.

use regex::Regex;
use std::sync::OnceLock;

fn membership_pattern() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)H[S5] ?([O0-9]{4,})").expect("invalid regex"))
}

/// Extracts the membership identifier embedded in `text`.
///
/// Returns the id characters exactly as written (an `O` stays an `O`).
/// Never fails: anything that does not contain a reference yields `None`.
pub fn parse_reference(text: &str) -> Option<String> {
    membership_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
