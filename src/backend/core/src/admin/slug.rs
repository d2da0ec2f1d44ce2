//! Organization slug derivation and validation.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Lowercase letters and digits in hyphen-separated runs.
static SLUG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("Invalid slug regex"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static HYPHEN_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-+").expect("Invalid hyphen regex"));

/// Maximum slug length accepted for an organization.
pub const MAX_SLUG_LEN: usize = 64;

/// Derive a URL slug from an organization name.
///
/// `"Ação Social  Brasil!"` becomes `"acao-social-brasil"`.
pub fn slugify(name: &str) -> String {
    let folded: String = name
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();

    let hyphenated = WHITESPACE_RUN.replace_all(folded.trim(), "-");
    HYPHEN_RUN
        .replace_all(&hyphenated, "-")
        .trim_matches('-')
        .to_string()
}

/// Whether `slug` is a well-formed organization slug.
pub fn is_valid_slug(slug: &str) -> bool {
    slug.len() <= MAX_SLUG_LEN && SLUG_REGEX.is_match(slug)
}

/// Combining diacritical marks left behind by canonical decomposition.
fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036f}')
}
