//! Name normalization helpers shared by the resolver and the db layer.

/// Collapse internal whitespace runs to single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a name fragment for identity comparison: trim, collapse
/// whitespace, case-fold. "  Franco   FIORELLINO " → "franco fiorellino".
pub fn normalize_name(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

/// Split a normalized full name into (first, last). The first token is the
/// first name; everything after it is the last name (which may be empty for
/// single-token fragments, or multi-word for names like "De Luca").
pub fn split_first_last(norm: &str) -> (String, String) {
    match norm.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.to_string()),
        None => (norm.to_string(), String::new()),
    }
}

/// True if the fragment is purely numeric once separators are stripped
/// (ticket numbers, IDs — never a person).
pub fn is_numeric_token(s: &str) -> bool {
    let stripped: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.' && *c != '#')
        .collect();
    !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
}
