//! Boolean filter evaluation
//!
//! Three-valued logic over expression results: an evaluation error (the
//! `Unbound` value) behaves as the SPARQL `error` truth value, so
//! `error && false = false`, `error || true = true`, and an `error`
//! reaching a FILTER boundary rejects the row.

use crate::bindings::BindingTable;
use crate::expr::Evaluator;
use crate::value::Value;
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Compile budget for filter regexes. The engine has no wall-clock
/// compile timeout, so the budget is expressed as a compiled-size limit.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Effective boolean value; `None` is the error truth value.
pub fn effective_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Integer(i) => Some(*i != 0),
        Value::Double(d) => Some(*d != 0.0 && !d.is_nan()),
        Value::Str(s) => Some(!rdf_model::lexical_form(s).is_empty()),
        Value::Uri(_) | Value::Unbound => None,
    }
}

/// Whether a FILTER expression accepts the current row.
///
/// Errors reject: only a definite `true` passes.
pub fn holds(evaluator: &Evaluator<'_>, expr: &str, bindings: &BindingTable) -> bool {
    matches!(
        effective_boolean(&evaluator.evaluate(expr, bindings)),
        Some(true)
    )
}

pub(crate) fn three_or(left: &Value, right: &Value) -> Value {
    match (effective_boolean(left), effective_boolean(right)) {
        (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
        (Some(false), Some(false)) => Value::Boolean(false),
        _ => Value::Unbound,
    }
}

pub(crate) fn three_and(left: &Value, right: &Value) -> Value {
    match (effective_boolean(left), effective_boolean(right)) {
        (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
        (Some(true), Some(true)) => Value::Boolean(true),
        _ => Value::Unbound,
    }
}

pub(crate) fn three_not(value: &Value) -> Value {
    match effective_boolean(value) {
        Some(b) => Value::Boolean(!b),
        None => Value::Unbound,
    }
}

/// Build a regex with SPARQL flags (`i`, `m`, `s`, `x`) under the compile
/// budget. Invalid patterns and unknown flags yield `None`.
pub(crate) fn build_regex(pattern: &str, flags: &str) -> Option<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    builder.size_limit(REGEX_SIZE_LIMIT);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            _ => return None,
        }
    }
    match builder.build() {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(pattern, %err, "regex rejected");
            None
        }
    }
}

/// RFC 4647 basic language-range match.
pub(crate) fn lang_matches(lang: &str, range: &str) -> bool {
    if range == "*" {
        return !lang.is_empty();
    }
    lang.eq_ignore_ascii_case(range)
        || lang
            .to_lowercase()
            .starts_with(&format!("{}-", range.to_lowercase()))
}
