//! Classification and decomposition of canonical term strings

/// Check whether a canonical term string is an IRI (`<...>`).
pub fn is_iri(term: &str) -> bool {
    term.len() >= 2 && term.starts_with('<') && term.ends_with('>')
}

/// Check whether a canonical term string is a blank node (`_:label`).
pub fn is_blank(term: &str) -> bool {
    term.starts_with("_:")
}

/// Position of the closing quote of a quoted literal, honoring `\` escapes.
///
/// Returns `None` when the string does not start with a quote or the quote
/// is never closed.
pub fn closing_quote(term: &str) -> Option<usize> {
    let bytes = term.as_bytes();
    if bytes.first() != Some(&b'"') {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Lexical form of a canonical term string.
///
/// IRIs lose their angle brackets, quoted literals lose their quotes and
/// any `@tag` / `^^<dt>` suffix, everything else is returned verbatim.
pub fn lexical_form(term: &str) -> &str {
    if is_iri(term) {
        return &term[1..term.len() - 1];
    }
    if let Some(close) = closing_quote(term) {
        return &term[1..close];
    }
    term
}

/// The `@tag` or `^^<dt>` suffix of a quoted literal, or `""`.
pub fn suffix(term: &str) -> &str {
    match closing_quote(term) {
        Some(close) => &term[close + 1..],
        None => "",
    }
}

/// Language tag of a language-tagged literal (`"lex"@tag` -> `tag`).
pub fn language_tag(term: &str) -> Option<&str> {
    let s = suffix(term);
    s.strip_prefix('@')
}

/// Datatype IRI of a typed literal, without angle brackets.
pub fn datatype_iri(term: &str) -> Option<&str> {
    let s = suffix(term);
    s.strip_prefix("^^<")?.strip_suffix('>')
}

/// Strip the angle brackets of an IRI, if present.
pub fn strip_brackets(iri: &str) -> &str {
    if is_iri(iri) {
        &iri[1..iri.len() - 1]
    } else {
        iri
    }
}

/// Compose a typed literal: `"lex"^^<datatype>`.
pub fn format_typed(lexical: &str, datatype: &str) -> String {
    format!("\"{}\"^^<{}>", lexical, datatype)
}

/// Compose a language-tagged literal: `"lex"@tag`.
pub fn format_lang(lexical: &str, tag: &str) -> String {
    format!("\"{}\"@{}", lexical, tag)
}

/// Whether a lexical form is a pure integer (optional sign, digits only).
pub fn is_integer_lexical(s: &str) -> bool {
    let body = s.strip_prefix('-').or_else(|| s.strip_prefix('+')).unwrap_or(s);
    !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit())
}

/// Whether a lexical form reads as a number (integer, decimal, or double).
pub fn is_numeric_lexical(s: &str) -> bool {
    if is_integer_lexical(s) {
        return true;
    }
    let body = s.strip_prefix('-').or_else(|| s.strip_prefix('+')).unwrap_or(s);
    if body.is_empty() {
        return false;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => {
                seen_exp = true;
                if matches!(bytes.get(i + 1), Some(b'+') | Some(b'-')) {
                    i += 1;
                }
                if !matches!(bytes.get(i + 1), Some(b'0'..=b'9')) {
                    return false;
                }
            }
            _ => return false,
        }
        i += 1;
    }
    seen_digit
}
