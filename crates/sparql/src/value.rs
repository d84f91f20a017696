//! Evaluator datum
//!
//! The tagged value produced by expression evaluation. String values keep
//! their full RDF lexical representation (quotes and `@tag` / `^^<dt>`
//! suffix included when the source had them) so that functions which must
//! preserve the suffix can re-emit it verbatim.

use rdf_model::{lexical_form, suffix, Vocabulary};
use std::borrow::Cow;

/// A tagged evaluation datum.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value; also the local form of every evaluation error.
    Unbound,
    /// Integer
    Integer(i64),
    /// Double
    Double(f64),
    /// Boolean
    Boolean(bool),
    /// Literal in canonical binding form (plain literals bare, quoted
    /// literals with their suffix).
    Str(String),
    /// IRI with angle brackets included.
    Uri(String),
}

impl Value {
    /// Decode an incoming binding string into its typed variant.
    pub fn parse_binding(text: &str) -> Value {
        if text.starts_with('<') {
            return Value::Uri(text.to_owned());
        }
        if text.starts_with('"') {
            if let Some(datatype) = rdf_model::datatype_iri(text) {
                let lexical = lexical_form(text);
                if Vocabulary::is_integer_type(datatype) {
                    if let Ok(v) = lexical.parse::<i64>() {
                        return Value::Integer(v);
                    }
                }
                if datatype == Vocabulary::XSD_DOUBLE
                    || datatype == Vocabulary::XSD_FLOAT
                    || datatype == Vocabulary::XSD_DECIMAL
                {
                    if let Some(v) = parse_double_lexical(lexical) {
                        return Value::Double(v);
                    }
                }
                if datatype == Vocabulary::XSD_BOOLEAN {
                    match lexical {
                        "true" | "1" => return Value::Boolean(true),
                        "false" | "0" => return Value::Boolean(false),
                        _ => {}
                    }
                }
            }
            return Value::Str(text.to_owned());
        }
        match text {
            "true" => return Value::Boolean(true),
            "false" => return Value::Boolean(false),
            _ => {}
        }
        if rdf_model::is_integer_lexical(text) {
            if let Ok(v) = text.parse::<i64>() {
                return Value::Integer(v);
            }
        }
        if rdf_model::is_numeric_lexical(text) {
            if let Ok(v) = text.parse::<f64>() {
                return Value::Double(v);
            }
        }
        Value::Str(text.to_owned())
    }

    /// Lexical form: typed values print canonically, strings lose quotes
    /// and suffix, IRIs lose their brackets.
    pub fn lexical(&self) -> Cow<'_, str> {
        match self {
            Value::Unbound => Cow::Borrowed(""),
            Value::Integer(i) => Cow::Owned(i.to_string()),
            Value::Double(d) => Cow::Owned(format_double(*d)),
            Value::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Str(s) => Cow::Borrowed(lexical_form(s)),
            Value::Uri(u) => Cow::Borrowed(rdf_model::strip_brackets(u)),
        }
    }

    /// The `@tag` / `^^<dt>` suffix of a string value, or `""`.
    pub fn suffix(&self) -> &str {
        match self {
            Value::Str(s) => suffix(s),
            _ => "",
        }
    }

    /// Canonical binding string for re-binding this value into a table.
    pub fn binding_string(&self) -> Option<(String, Option<crate::bindings::TypedValue>)> {
        use crate::bindings::TypedValue;
        match self {
            Value::Unbound => None,
            Value::Integer(i) => Some((
                rdf_model::format_typed(&i.to_string(), Vocabulary::XSD_INTEGER),
                Some(TypedValue::Integer(*i)),
            )),
            Value::Double(d) => Some((
                rdf_model::format_typed(&format_double(*d), Vocabulary::XSD_DOUBLE),
                Some(TypedValue::Double(*d)),
            )),
            Value::Boolean(b) => Some((
                rdf_model::format_typed(if *b { "true" } else { "false" }, Vocabulary::XSD_BOOLEAN),
                Some(TypedValue::Boolean(*b)),
            )),
            Value::Str(s) => Some((s.clone(), None)),
            Value::Uri(u) => Some((u.clone(), None)),
        }
    }

    /// Whether this value carries a numeric datum.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Double(_))
    }

    /// Coerce to a double; non-numeric values yield NaN.
    ///
    /// Strings coerce through their lexical form, which covers both plain
    /// numeric text and the lexical of an embedded typed literal.
    pub fn coerce_number(&self) -> f64 {
        match self {
            Value::Integer(i) => *i as f64,
            Value::Double(d) => *d,
            Value::Str(s) => {
                let lex = lexical_form(s);
                match lex {
                    "INF" => f64::INFINITY,
                    "-INF" => f64::NEG_INFINITY,
                    _ => lex.parse::<f64>().unwrap_or(f64::NAN),
                }
            }
            _ => f64::NAN,
        }
    }
}

/// Parse a double lexical, accepting the XSD spellings of the specials.
pub fn parse_double_lexical(lexical: &str) -> Option<f64> {
    if lexical.eq_ignore_ascii_case("inf") || lexical.eq_ignore_ascii_case("+inf") {
        return Some(f64::INFINITY);
    }
    if lexical.eq_ignore_ascii_case("-inf") {
        return Some(f64::NEG_INFINITY);
    }
    if lexical.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    lexical.parse::<f64>().ok()
}

/// Invariant print of a double: `NaN` / `INF` / `-INF` for the specials,
/// shortest round-trip decimal otherwise.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        if value > 0.0 { "INF".to_owned() } else { "-INF".to_owned() }
    } else {
        value.to_string()
    }
}

/// Trim a decimal lexical to its no-trailing-zero form.
pub fn trim_decimal(lexical: &str) -> &str {
    if !lexical.contains('.') {
        return lexical;
    }
    let trimmed = lexical.trim_end_matches('0');
    trimmed.strip_suffix('.').unwrap_or(trimmed)
}

/// Numeric classification of a binding string, used by the aggregation
/// accumulators to keep their decimal and double tracks apart.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericClass {
    /// Integer-family input
    Int(i64),
    /// Decimal input with its lexical form
    Dec(String),
    /// Double/float/scientific input
    Dbl(f64),
}

/// Classify a binding string as a numeric input, or `None`.
pub fn classify_numeric(text: &str) -> Option<NumericClass> {
    if text.starts_with('"') {
        let datatype = rdf_model::datatype_iri(text)?;
        let lexical = lexical_form(text);
        if Vocabulary::is_integer_type(datatype) {
            return lexical.parse::<i64>().ok().map(NumericClass::Int);
        }
        if datatype == Vocabulary::XSD_DECIMAL {
            if rdf_model::is_numeric_lexical(lexical) && !lexical.contains(['e', 'E']) {
                return Some(NumericClass::Dec(lexical.to_owned()));
            }
            return None;
        }
        if datatype == Vocabulary::XSD_DOUBLE || datatype == Vocabulary::XSD_FLOAT {
            return parse_double_lexical(lexical).map(NumericClass::Dbl);
        }
        return None;
    }
    if rdf_model::is_integer_lexical(text) {
        return text.parse::<i64>().ok().map(NumericClass::Int);
    }
    if rdf_model::is_numeric_lexical(text) {
        if text.contains(['e', 'E']) {
            return text.parse::<f64>().ok().map(NumericClass::Dbl);
        }
        return Some(NumericClass::Dec(text.to_owned()));
    }
    None
}
