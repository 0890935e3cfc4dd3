//! Name and predicate normalization.
//!
//! The normalization key is the merge key for entities: two candidates
//! with the same key and type are the same entity. Keys are produced by
//! NFKD decomposition, combining-mark (diacritic) removal, case
//! folding, punctuation stripping, and whitespace collapsing.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Compute the normalization key for an entity name.
///
/// ```
/// use graphloom_core::resolver::normalization_key;
///
/// assert_eq!(normalization_key("  Café Crème  "), "cafe creme");
/// assert_eq!(normalization_key("Acme, Inc."), "acme inc");
/// assert_eq!(normalization_key("ACME inc"), "acme inc");
/// ```
pub fn normalization_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;

    for c in name.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            // Whitespace and punctuation both act as separators.
            pending_space = true;
        }
    }

    out
}

/// Normalize a relation predicate to `UPPER_SNAKE` form.
///
/// Oracle output varies ("works for", "Works-For", "WORKS_FOR"); all
/// collapse to one predicate so duplicate edges are keyed identically.
pub fn normalize_predicate(predicate: &str) -> String {
    let mut out = String::with_capacity(predicate.len());
    let mut pending_sep = false;

    for c in predicate.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_uppercase());
        } else {
            pending_sep = true;
        }
    }

    out
}
