//! Name sanitisation for object keys.
//!
//! Three independent rules feed the generated object name
//! `{user}_{timestamp}_{file}`:
//!
//! 1. [`sanitize_filename`] — the uploaded file's display name. Always folds
//!    accents and drops anything outside Latin-1; the HTML format additionally
//!    applies the object-key whitelist below because the HTML pipeline hands
//!    the key to a service with strict S3-URI rules.
//! 2. [`sanitize_user`] — the email claim, reduced to ASCII alphanumerics.
//! 3. [`sanitize_object_key`] — the whitelist pass on its own, used when the
//!    processing session derives the HTML result key from an object name.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::format::OutputFormat;

/// Fallback used when sanitisation leaves nothing behind.
pub const DEFAULT_FILENAME: &str = "default.pdf";

/// Fallback used when the ID token carries no email claim.
pub const DEFAULT_USER: &str = "user";

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s").unwrap());

// Control characters, DEL, and the symbols rejected in S3 URIs downstream.
static RE_DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\x00-\x1F\x7F{}^%`\[\]"<>~#|&\\*?/$!':@+=]"#).unwrap());

static RE_UNDERSCORE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// Sanitise an uploaded file name for the given output format.
///
/// Returns [`DEFAULT_FILENAME`] when nothing printable survives.
pub fn sanitize_filename(filename: &str, format: OutputFormat) -> String {
    let latin1: String = filename
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036F}').contains(c))
        .filter(|c| (*c as u32) <= 0xFF)
        .collect();

    let sanitized = match format {
        OutputFormat::Html => sanitize_object_key(&latin1),
        OutputFormat::Pdf => latin1,
    };

    if sanitized.trim().is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Apply the object-key whitelist: whitespace and disallowed symbols become
/// `_`, runs of `_` collapse to one, and leading/trailing `_` are removed.
pub fn sanitize_object_key(name: &str) -> String {
    let s = RE_WHITESPACE.replace_all(name, "_");
    let s = RE_DISALLOWED.replace_all(&s, "_");
    let s = RE_UNDERSCORE_RUN.replace_all(&s, "_");
    s.trim_matches('_').to_string()
}

/// Reduce a user identifier (normally the email claim) to `[A-Za-z0-9_]`.
pub fn sanitize_user(user: Option<&str>) -> String {
    user.filter(|u| !u.is_empty())
        .unwrap_or(DEFAULT_USER)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
