//! Expression evaluator
//!
//! Recursive-descent evaluation of SPARQL value expressions directly over
//! their source text. Expressions are stored as spans into the query
//! buffer, so the evaluator is the only component that needs to understand
//! expression syntax. Evaluation errors localize into [`Value::Unbound`];
//! the boolean operators apply three-valued logic on top (see
//! [`crate::filter`]).

use crate::bindings::{BindingTable, TypedValue};
use crate::filter;
use crate::query::{var_name, QueryBuffer};
use crate::value::{parse_double_lexical, Value};
use chrono::{DateTime, SecondsFormat, Utc};
use rdf_model::Vocabulary;

/// Expression evaluator bound to one query execution.
///
/// Owns the per-query clock sample used by `NOW()`.
pub struct Evaluator<'q> {
    query: &'q QueryBuffer,
    now: DateTime<Utc>,
}

impl<'q> Evaluator<'q> {
    /// Create an evaluator for a query; `NOW()` is fixed at this point.
    pub fn new(query: &'q QueryBuffer) -> Self {
        Self {
            query,
            now: Utc::now(),
        }
    }

    /// Evaluate an expression against the current bindings.
    pub fn evaluate(&self, expr: &str, bindings: &BindingTable) -> Value {
        let mut cursor = Cursor::new(expr);
        let value = self.parse_or(&mut cursor, bindings);
        cursor.skip_ws();
        if cursor.at_end() {
            value
        } else {
            Value::Unbound
        }
    }

    fn parse_or(&self, c: &mut Cursor<'_>, b: &BindingTable) -> Value {
        let mut left = self.parse_and(c, b);
        while c.eat("||") {
            let right = self.parse_and(c, b);
            left = filter::three_or(&left, &right);
        }
        left
    }

    fn parse_and(&self, c: &mut Cursor<'_>, b: &BindingTable) -> Value {
        let mut left = self.parse_not(c, b);
        while c.eat("&&") {
            let right = self.parse_not(c, b);
            left = filter::three_and(&left, &right);
        }
        left
    }

    fn parse_not(&self, c: &mut Cursor<'_>, b: &BindingTable) -> Value {
        c.skip_ws();
        if c.peek() == Some(b'!') && c.peek_at(1) != Some(b'=') {
            c.bump(1);
            let value = self.parse_not(c, b);
            return filter::three_not(&value);
        }
        self.parse_relational(c, b)
    }

    fn parse_relational(&self, c: &mut Cursor<'_>, b: &BindingTable) -> Value {
        let left = self.parse_additive(c, b);
        c.skip_ws();

        if c.eat("!=") {
            let right = self.parse_additive(c, b);
            return match eq_values(&left, &right) {
                Value::Boolean(v) => Value::Boolean(!v),
                other => other,
            };
        }
        if c.eat("<=") {
            let right = self.parse_additive(c, b);
            return cmp_to_bool(&left, &right, |o| o != std::cmp::Ordering::Greater);
        }
        if c.eat(">=") {
            let right = self.parse_additive(c, b);
            return cmp_to_bool(&left, &right, |o| o != std::cmp::Ordering::Less);
        }
        if c.eat("=") {
            let right = self.parse_additive(c, b);
            return eq_values(&left, &right);
        }
        if c.eat("<") {
            let right = self.parse_additive(c, b);
            return cmp_to_bool(&left, &right, |o| o == std::cmp::Ordering::Less);
        }
        if c.eat(">") {
            let right = self.parse_additive(c, b);
            return cmp_to_bool(&left, &right, |o| o == std::cmp::Ordering::Greater);
        }
        if c.eat_keyword("NOT") {
            if c.eat_keyword("IN") {
                return match self.parse_in_list(c, b, &left) {
                    Value::Boolean(v) => Value::Boolean(!v),
                    other => other,
                };
            }
            return Value::Unbound;
        }
        if c.eat_keyword("IN") {
            return self.parse_in_list(c, b, &left);
        }
        left
    }

    fn parse_in_list(&self, c: &mut Cursor<'_>, b: &BindingTable, needle: &Value) -> Value {
        c.skip_ws();
        if !c.eat("(") {
            return Value::Unbound;
        }
        let mut matched = false;
        let mut errored = false;
        loop {
            c.skip_ws();
            if c.eat(")") {
                break;
            }
            let item = self.parse_additive(c, b);
            match eq_values(needle, &item) {
                Value::Boolean(true) => matched = true,
                Value::Boolean(false) => {}
                _ => errored = true,
            }
            c.skip_ws();
            if !c.eat(",") && c.peek() != Some(b')') {
                return Value::Unbound;
            }
        }
        if matched {
            Value::Boolean(true)
        } else if errored {
            Value::Unbound
        } else {
            Value::Boolean(false)
        }
    }

    fn parse_additive(&self, c: &mut Cursor<'_>, b: &BindingTable) -> Value {
        let mut left = self.parse_multiplicative(c, b);
        loop {
            c.skip_ws();
            if c.eat("+") {
                let right = self.parse_multiplicative(c, b);
                left = numeric_add(&left, &right);
            } else if c.peek() == Some(b'-') {
                c.bump(1);
                let right = self.parse_multiplicative(c, b);
                left = numeric_subtract(&left, &right);
            } else {
                return left;
            }
        }
    }

    fn parse_multiplicative(&self, c: &mut Cursor<'_>, b: &BindingTable) -> Value {
        let mut left = self.parse_unary(c, b);
        loop {
            c.skip_ws();
            if c.eat("*") {
                let right = self.parse_unary(c, b);
                left = numeric_multiply(&left, &right);
            } else if c.eat("/") {
                let right = self.parse_unary(c, b);
                left = numeric_divide(&left, &right);
            } else {
                return left;
            }
        }
    }

    fn parse_unary(&self, c: &mut Cursor<'_>, b: &BindingTable) -> Value {
        c.skip_ws();
        if c.peek() == Some(b'-') {
            c.bump(1);
            let value = self.parse_unary(c, b);
            return numeric_negate(&value);
        }
        if c.peek() == Some(b'+') {
            c.bump(1);
            return self.parse_unary(c, b);
        }
        self.parse_primary(c, b)
    }

    fn parse_primary(&self, c: &mut Cursor<'_>, b: &BindingTable) -> Value {
        c.skip_ws();
        match c.peek() {
            Some(b'(') => {
                c.bump(1);
                let value = self.parse_or(c, b);
                c.skip_ws();
                if c.eat(")") {
                    value
                } else {
                    Value::Unbound
                }
            }
            Some(b'?') | Some(b'$') => {
                c.bump(1);
                let name = c.read_while(|ch| ch.is_ascii_alphanumeric() || ch == b'_');
                self.lookup(name, b)
            }
            Some(b'"') | Some(b'\'') => self.parse_string_literal(c),
            Some(b'<') => {
                c.bump(1);
                let iri = c.read_while(|ch| ch != b'>');
                if c.eat(">") {
                    Value::Uri(format!("<{}>", iri))
                } else {
                    Value::Unbound
                }
            }
            Some(b':') => {
                c.bump(1);
                let local = c.read_while(is_local_char);
                self.expand_prefixed("", local)
            }
            Some(d) if d.is_ascii_digit() || d == b'.' => self.parse_number(c),
            Some(a) if a.is_ascii_alphabetic() || a == b'_' => {
                let ident = c.read_while(|ch| ch.is_ascii_alphanumeric() || ch == b'_');
                if c.peek() == Some(b':') {
                    c.bump(1);
                    let local = c.read_while(is_local_char);
                    c.skip_ws();
                    if c.peek() == Some(b'(') {
                        c.bump(1);
                        let name = format!("{}:{}", ident, local);
                        return match c.capture_args() {
                            Some(args) => self.call(&name, &args, b),
                            None => Value::Unbound,
                        };
                    }
                    return self.expand_prefixed(ident, local);
                }
                match ident {
                    "true" => return Value::Boolean(true),
                    "false" => return Value::Boolean(false),
                    _ => {}
                }
                c.skip_ws();
                if c.peek() == Some(b'(') {
                    c.bump(1);
                    return match c.capture_args() {
                        Some(args) => self.call(ident, &args, b),
                        None => Value::Unbound,
                    };
                }
                Value::Unbound
            }
            _ => Value::Unbound,
        }
    }

    fn parse_string_literal(&self, c: &mut Cursor<'_>) -> Value {
        let quote = c.peek().unwrap_or(b'"');
        c.bump(1);
        let mut lexical = String::new();
        loop {
            match c.peek() {
                None => return Value::Unbound,
                Some(ch) if ch == quote => {
                    c.bump(1);
                    break;
                }
                Some(b'\\') => {
                    lexical.push('\\');
                    c.bump(1);
                    if let Some(escaped) = c.peek() {
                        lexical.push(escaped as char);
                        c.bump(1);
                    }
                }
                Some(_) => {
                    let ch = c.next_char();
                    lexical.push(ch);
                }
            }
        }
        if c.peek() == Some(b'@') {
            c.bump(1);
            let tag = c.read_while(|ch| ch.is_ascii_alphanumeric() || ch == b'-');
            return Value::Str(rdf_model::format_lang(&lexical, tag));
        }
        if c.peek() == Some(b'^') && c.peek_at(1) == Some(b'^') {
            c.bump(2);
            let datatype = if c.peek() == Some(b'<') {
                c.bump(1);
                let iri = c.read_while(|ch| ch != b'>').to_owned();
                if !c.eat(">") {
                    return Value::Unbound;
                }
                iri
            } else {
                let prefix = c.read_while(|ch| ch.is_ascii_alphanumeric() || ch == b'_');
                if !c.eat(":") {
                    return Value::Unbound;
                }
                let prefix = prefix.to_owned();
                let local = c.read_while(is_local_char);
                match self.query.namespace_for(&prefix) {
                    Some(ns) => format!("{}{}", ns, local),
                    None => return Value::Unbound,
                }
            };
            return Value::parse_binding(&rdf_model::format_typed(&lexical, &datatype));
        }
        Value::Str(lexical)
    }

    fn parse_number(&self, c: &mut Cursor<'_>) -> Value {
        let start = c.pos;
        c.read_while(|ch| ch.is_ascii_digit());
        if c.peek() == Some(b'.') {
            c.bump(1);
            c.read_while(|ch| ch.is_ascii_digit());
        }
        if matches!(c.peek(), Some(b'e') | Some(b'E')) {
            c.bump(1);
            if matches!(c.peek(), Some(b'+') | Some(b'-')) {
                c.bump(1);
            }
            c.read_while(|ch| ch.is_ascii_digit());
        }
        let text = &c.text[start..c.pos];
        if rdf_model::is_integer_lexical(text) {
            text.parse::<i64>().map(Value::Integer).unwrap_or(Value::Unbound)
        } else {
            text.parse::<f64>().map(Value::Double).unwrap_or(Value::Unbound)
        }
    }

    fn expand_prefixed(&self, prefix: &str, local: &str) -> Value {
        match self.query.namespace_for(prefix) {
            Some(ns) => Value::Uri(format!("<{}{}>", ns, local)),
            None => Value::Unbound,
        }
    }

    fn lookup(&self, name: &str, bindings: &BindingTable) -> Value {
        match bindings.find(name) {
            None => Value::Unbound,
            Some(i) => match bindings.typed(i) {
                Some(TypedValue::Integer(v)) => Value::Integer(v),
                Some(TypedValue::Double(v)) => Value::Double(v),
                Some(TypedValue::Boolean(v)) => Value::Boolean(v),
                None => Value::parse_binding(bindings.get(i)),
            },
        }
    }

    /// Effective boolean value of a condition expression.
    pub fn condition_holds(&self, expr: &str, bindings: &BindingTable) -> Option<bool> {
        filter::effective_boolean(&self.evaluate(expr, bindings))
    }

    fn call(&self, name: &str, args: &[&str], b: &BindingTable) -> Value {
        if let Some(local) = strip_xsd_prefix(name) {
            if args.len() != 1 {
                return Value::Unbound;
            }
            return self.cast(local, self.evaluate(args[0], b));
        }

        match name.to_ascii_uppercase().as_str() {
            "BOUND" => {
                let arg = args.first().map(|a| a.trim()).unwrap_or("");
                if !arg.starts_with(['?', '$']) {
                    return Value::Unbound;
                }
                Value::Boolean(b.find(var_name(arg)).is_some())
            }

            "STR" => match self.eval_arg(args, 0, b) {
                Value::Unbound => Value::Unbound,
                v => Value::Str(v.lexical().into_owned()),
            },

            "STRLEN" => match self.eval_arg(args, 0, b) {
                Value::Unbound => Value::Unbound,
                v => Value::Integer(v.lexical().chars().count() as i64),
            },

            "UCASE" | "LCASE" => {
                let v = self.eval_arg(args, 0, b);
                if v == Value::Unbound {
                    return Value::Unbound;
                }
                let lex = v.lexical();
                let transformed = if name.eq_ignore_ascii_case("UCASE") {
                    lex.to_uppercase()
                } else {
                    lex.to_lowercase()
                };
                with_suffix(&v, transformed)
            }

            "ENCODE_FOR_URI" => match self.eval_arg(args, 0, b) {
                Value::Unbound => Value::Unbound,
                v => Value::Str(urlencoding::encode(&v.lexical()).into_owned()),
            },

            "CONCAT" => {
                let mut out = String::new();
                for arg in args {
                    match self.evaluate(arg, b) {
                        Value::Unbound => return Value::Unbound,
                        v => out.push_str(&v.lexical()),
                    }
                }
                Value::Str(out)
            }

            "SUBSTR" => self.substr(args, b),

            "STRBEFORE" | "STRAFTER" => {
                let s = self.eval_arg(args, 0, b);
                let d = self.eval_arg(args, 1, b);
                if s == Value::Unbound || d == Value::Unbound {
                    return Value::Unbound;
                }
                let s_lex = s.lexical().into_owned();
                let d_lex = d.lexical().into_owned();
                let before = name.eq_ignore_ascii_case("STRBEFORE");
                if d_lex.is_empty() {
                    return if before {
                        with_suffix(&s, String::new())
                    } else {
                        with_suffix(&s, s_lex)
                    };
                }
                match s_lex.find(&d_lex) {
                    Some(pos) if before => with_suffix(&s, s_lex[..pos].to_owned()),
                    Some(pos) => with_suffix(&s, s_lex[pos + d_lex.len()..].to_owned()),
                    None => Value::Str(String::new()),
                }
            }

            "REPLACE" => {
                let s = self.eval_arg(args, 0, b);
                let pat = self.eval_arg(args, 1, b);
                let repl = self.eval_arg(args, 2, b);
                if s == Value::Unbound || pat == Value::Unbound || repl == Value::Unbound {
                    return Value::Unbound;
                }
                let flags = match args.get(3) {
                    Some(f) => self.evaluate(f, b).lexical().into_owned(),
                    None => String::new(),
                };
                match filter::build_regex(&pat.lexical(), &flags) {
                    Some(re) => {
                        let replaced = re.replace_all(&s.lexical(), repl.lexical().as_ref()).into_owned();
                        with_suffix(&s, replaced)
                    }
                    None => Value::Unbound,
                }
            }

            "CONTAINS" | "STRSTARTS" | "STRENDS" => {
                let s = self.eval_arg(args, 0, b);
                let t = self.eval_arg(args, 1, b);
                if s == Value::Unbound || t == Value::Unbound {
                    return Value::Unbound;
                }
                let s_lex = s.lexical();
                let t_lex = t.lexical();
                let result = match name.to_ascii_uppercase().as_str() {
                    "CONTAINS" => s_lex.contains(t_lex.as_ref()),
                    "STRSTARTS" => s_lex.starts_with(t_lex.as_ref()),
                    _ => s_lex.ends_with(t_lex.as_ref()),
                };
                Value::Boolean(result)
            }

            "STRDT" => {
                let lex = self.eval_arg(args, 0, b);
                let dt = self.eval_arg(args, 1, b);
                let plain = match &lex {
                    Value::Str(s) if rdf_model::suffix(s).is_empty() => rdf_model::lexical_form(s),
                    _ => return Value::Unbound,
                };
                let datatype = match &dt {
                    Value::Uri(u) => rdf_model::strip_brackets(u),
                    _ => return Value::Unbound,
                };
                if datatype == Vocabulary::XSD_STRING {
                    Value::Str(plain.to_owned())
                } else {
                    Value::parse_binding(&rdf_model::format_typed(plain, datatype))
                }
            }

            "STRLANG" => {
                let lex = self.eval_arg(args, 0, b);
                let tag = self.eval_arg(args, 1, b);
                let plain = match &lex {
                    Value::Str(s) if rdf_model::suffix(s).is_empty() && !s.is_empty() => {
                        rdf_model::lexical_form(s)
                    }
                    _ => return Value::Unbound,
                };
                match &tag {
                    Value::Str(t) => Value::Str(rdf_model::format_lang(plain, &tag_lexical(t))),
                    _ => Value::Unbound,
                }
            }

            "UUID" => Value::Uri(format!("<urn:uuid:{}>", uuid::Uuid::now_v7())),
            "STRUUID" => Value::Str(uuid::Uuid::now_v7().to_string()),

            "NOW" => Value::Str(rdf_model::format_typed(
                &self.now.to_rfc3339_opts(SecondsFormat::Secs, true),
                Vocabulary::XSD_DATETIME,
            )),

            "RAND" => {
                use rand::Rng;
                Value::Double(rand::thread_rng().gen::<f64>())
            }

            "ABS" => match self.eval_arg(args, 0, b) {
                Value::Integer(i) => i.checked_abs().map(Value::Integer).unwrap_or(Value::Unbound),
                Value::Double(d) => Value::Double(d.abs()),
                _ => Value::Unbound,
            },
            "CEIL" => match self.eval_arg(args, 0, b) {
                Value::Integer(i) => Value::Integer(i),
                Value::Double(d) => Value::Double(d.ceil()),
                _ => Value::Unbound,
            },
            "FLOOR" => match self.eval_arg(args, 0, b) {
                Value::Integer(i) => Value::Integer(i),
                Value::Double(d) => Value::Double(d.floor()),
                _ => Value::Unbound,
            },
            "ROUND" => match self.eval_arg(args, 0, b) {
                Value::Integer(i) => Value::Integer(i),
                // f64::round is half-away-from-zero, which is the rule here
                Value::Double(d) => Value::Double(d.round()),
                _ => Value::Unbound,
            },

            "MD5" => {
                use md5::{Digest, Md5};
                match self.eval_arg(args, 0, b) {
                    Value::Unbound => Value::Unbound,
                    v => Value::Str(format!("{:x}", Md5::digest(v.lexical().as_bytes()))),
                }
            }
            "SHA1" => {
                use sha1::{Digest, Sha1};
                match self.eval_arg(args, 0, b) {
                    Value::Unbound => Value::Unbound,
                    v => Value::Str(format!("{:x}", Sha1::digest(v.lexical().as_bytes()))),
                }
            }
            "SHA256" => {
                use sha2::{Digest, Sha256};
                match self.eval_arg(args, 0, b) {
                    Value::Unbound => Value::Unbound,
                    v => Value::Str(format!("{:x}", Sha256::digest(v.lexical().as_bytes()))),
                }
            }
            "SHA384" => {
                use sha2::{Digest, Sha384};
                match self.eval_arg(args, 0, b) {
                    Value::Unbound => Value::Unbound,
                    v => Value::Str(format!("{:x}", Sha384::digest(v.lexical().as_bytes()))),
                }
            }
            "SHA512" => {
                use sha2::{Digest, Sha512};
                match self.eval_arg(args, 0, b) {
                    Value::Unbound => Value::Unbound,
                    v => Value::Str(format!("{:x}", Sha512::digest(v.lexical().as_bytes()))),
                }
            }

            "YEAR" | "MONTH" | "DAY" | "HOURS" | "MINUTES" | "SECONDS" => {
                let v = self.eval_arg(args, 0, b);
                if v == Value::Unbound {
                    return Value::Unbound;
                }
                date_component(&v.lexical(), &name.to_ascii_uppercase())
            }

            "IF" => {
                if args.len() != 3 {
                    return Value::Unbound;
                }
                match self.condition_holds(args[0], b) {
                    Some(true) => self.evaluate(args[1], b),
                    Some(false) => self.evaluate(args[2], b),
                    None => Value::Unbound,
                }
            }

            "COALESCE" => {
                for arg in args {
                    match self.evaluate(arg, b) {
                        Value::Unbound => continue,
                        v => return v,
                    }
                }
                Value::Unbound
            }

            "IRI" | "URI" => match self.eval_arg(args, 0, b) {
                Value::Uri(u) => Value::Uri(u),
                Value::Str(s) if rdf_model::suffix(&s).is_empty() => {
                    Value::Uri(format!("<{}>", rdf_model::lexical_form(&s)))
                }
                _ => Value::Unbound,
            },

            "ISIRI" | "ISURI" => match self.eval_arg(args, 0, b) {
                Value::Unbound => Value::Unbound,
                v => Value::Boolean(matches!(v, Value::Uri(_))),
            },
            "ISBLANK" => match self.eval_arg(args, 0, b) {
                Value::Unbound => Value::Unbound,
                Value::Str(s) => Value::Boolean(s.starts_with("_:")),
                _ => Value::Boolean(false),
            },
            "ISLITERAL" => match self.eval_arg(args, 0, b) {
                Value::Unbound => Value::Unbound,
                Value::Str(s) => Value::Boolean(!s.starts_with("_:")),
                Value::Integer(_) | Value::Double(_) | Value::Boolean(_) => Value::Boolean(true),
                _ => Value::Boolean(false),
            },
            "ISNUMERIC" => match self.eval_arg(args, 0, b) {
                Value::Unbound => Value::Unbound,
                v => Value::Boolean(v.is_numeric()),
            },

            "SAMETERM" => {
                let l = self.eval_arg(args, 0, b);
                let r = self.eval_arg(args, 1, b);
                if l == Value::Unbound || r == Value::Unbound {
                    return Value::Unbound;
                }
                Value::Boolean(l == r)
            }

            "LANG" => match self.eval_arg(args, 0, b) {
                Value::Unbound | Value::Uri(_) => Value::Unbound,
                Value::Str(s) => {
                    Value::Str(rdf_model::language_tag(&s).unwrap_or("").to_owned())
                }
                _ => Value::Str(String::new()),
            },

            "LANGMATCHES" => {
                let lang = self.eval_arg(args, 0, b);
                let range = self.eval_arg(args, 1, b);
                if lang == Value::Unbound || range == Value::Unbound {
                    return Value::Unbound;
                }
                Value::Boolean(filter::lang_matches(&lang.lexical(), &range.lexical()))
            }

            "DATATYPE" => match self.eval_arg(args, 0, b) {
                Value::Unbound | Value::Uri(_) => Value::Unbound,
                Value::Integer(_) => Value::Uri(format!("<{}>", Vocabulary::XSD_INTEGER)),
                Value::Double(_) => Value::Uri(format!("<{}>", Vocabulary::XSD_DOUBLE)),
                Value::Boolean(_) => Value::Uri(format!("<{}>", Vocabulary::XSD_BOOLEAN)),
                Value::Str(s) => {
                    if let Some(dt) = rdf_model::datatype_iri(&s) {
                        Value::Uri(format!("<{}>", dt))
                    } else if rdf_model::language_tag(&s).is_some() {
                        Value::Uri(format!("<{}>", Vocabulary::RDF_LANG_STRING))
                    } else {
                        Value::Uri(format!("<{}>", Vocabulary::XSD_STRING))
                    }
                }
            },

            "REGEX" => {
                let s = self.eval_arg(args, 0, b);
                let pat = self.eval_arg(args, 1, b);
                if s == Value::Unbound || pat == Value::Unbound {
                    return Value::Unbound;
                }
                let flags = match args.get(2) {
                    Some(f) => self.evaluate(f, b).lexical().into_owned(),
                    None => String::new(),
                };
                match filter::build_regex(&pat.lexical(), &flags) {
                    Some(re) => Value::Boolean(re.is_match(&s.lexical())),
                    None => Value::Unbound,
                }
            }

            _ => Value::Unbound,
        }
    }

    fn eval_arg(&self, args: &[&str], index: usize, b: &BindingTable) -> Value {
        match args.get(index) {
            Some(text) => self.evaluate(text, b),
            None => Value::Unbound,
        }
    }

    fn substr(&self, args: &[&str], b: &BindingTable) -> Value {
        let s = self.eval_arg(args, 0, b);
        if s == Value::Unbound {
            return Value::Unbound;
        }
        let start = match self.eval_arg(args, 1, b) {
            Value::Integer(i) => i,
            Value::Double(d) if d.is_finite() => d as i64,
            _ => return Value::Unbound,
        };
        let skip = (start - 1).max(0) as usize;
        let lex = s.lexical().into_owned();
        let result: String = if args.len() > 2 {
            let len = match self.eval_arg(args, 2, b) {
                Value::Integer(i) => i,
                Value::Double(d) if d.is_finite() => d as i64,
                _ => return Value::Unbound,
            };
            lex.chars().skip(skip).take(len.max(0) as usize).collect()
        } else {
            lex.chars().skip(skip).collect()
        };
        with_suffix(&s, result)
    }

    fn cast(&self, target: &str, v: Value) -> Value {
        if v == Value::Unbound {
            return Value::Unbound;
        }
        match target {
            "integer" => match v {
                Value::Boolean(b) => Value::Integer(i64::from(b)),
                Value::Integer(i) => Value::Integer(i),
                Value::Double(d) => {
                    if d.is_finite() && d >= i64::MIN as f64 && d <= i64::MAX as f64 {
                        Value::Integer(d.trunc() as i64)
                    } else {
                        Value::Unbound
                    }
                }
                Value::Str(s) => {
                    let lex = rdf_model::lexical_form(&s);
                    if rdf_model::is_integer_lexical(lex) {
                        lex.parse::<i64>().map(Value::Integer).unwrap_or(Value::Unbound)
                    } else {
                        Value::Unbound
                    }
                }
                _ => Value::Unbound,
            },
            "decimal" | "double" | "float" => match v {
                Value::Boolean(b) => Value::Double(if b { 1.0 } else { 0.0 }),
                Value::Integer(i) => Value::Double(i as f64),
                Value::Double(d) => Value::Double(d),
                Value::Str(s) => parse_double_lexical(rdf_model::lexical_form(&s))
                    .map(Value::Double)
                    .unwrap_or(Value::Unbound),
                _ => Value::Unbound,
            },
            "boolean" => match v {
                Value::Boolean(b) => Value::Boolean(b),
                Value::Integer(i) => Value::Boolean(i != 0),
                Value::Double(d) => Value::Boolean(d != 0.0 && !d.is_nan()),
                Value::Str(s) => match rdf_model::lexical_form(&s) {
                    "true" | "1" => Value::Boolean(true),
                    "false" | "0" => Value::Boolean(false),
                    _ => Value::Unbound,
                },
                _ => Value::Unbound,
            },
            "string" => Value::Str(v.lexical().into_owned()),
            _ => Value::Unbound,
        }
    }
}

/// Reassemble a transformed lexical form with the original value's
/// language tag or datatype suffix.
fn with_suffix(original: &Value, lexical: String) -> Value {
    let suffix = original.suffix();
    if suffix.is_empty() {
        Value::Str(lexical)
    } else {
        Value::Str(format!("\"{}\"{}", lexical, suffix))
    }
}

fn tag_lexical(value: &str) -> String {
    rdf_model::lexical_form(value).to_owned()
}

fn strip_xsd_prefix(name: &str) -> Option<&str> {
    let rest = name.strip_prefix("xsd:").or_else(|| name.strip_prefix("XSD:"))?;
    Some(rest)
}

/// Extract one component of an `xsd:dateTime` lexical, without timezone
/// normalization.
fn date_component(datetime: &str, component: &str) -> Value {
    let date_part = datetime.split('T').next().unwrap_or("");
    let time_part = datetime.split('T').nth(1).unwrap_or("");
    match component {
        "YEAR" | "MONTH" | "DAY" => {
            let index = match component {
                "YEAR" => 0,
                "MONTH" => 1,
                _ => 2,
            };
            date_part
                .splitn(3, '-')
                .nth(index)
                .and_then(|p| p.parse::<i64>().ok())
                .map(Value::Integer)
                .unwrap_or(Value::Unbound)
        }
        "HOURS" | "MINUTES" => {
            let index = if component == "HOURS" { 0 } else { 1 };
            time_part
                .split(':')
                .nth(index)
                .and_then(|p| p.parse::<i64>().ok())
                .map(Value::Integer)
                .unwrap_or(Value::Unbound)
        }
        _ => {
            let seconds = time_part
                .split(':')
                .nth(2)
                .map(|p| {
                    p.trim_end_matches('Z')
                        .split(['+', '-'])
                        .next()
                        .unwrap_or("")
                })
                .and_then(|p| p.parse::<f64>().ok());
            seconds.map(Value::Double).unwrap_or(Value::Unbound)
        }
    }
}

fn cmp_to_bool(
    left: &Value,
    right: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Value {
    match cmp_values(left, right) {
        Some(ordering) => Value::Boolean(accept(ordering)),
        None => Value::Unbound,
    }
}

/// RDF value equality: numeric across numeric types, text within a
/// category, error across categories.
pub(crate) fn eq_values(left: &Value, right: &Value) -> Value {
    use Value::*;
    match (left, right) {
        (Unbound, _) | (_, Unbound) => Unbound,
        (Integer(a), Integer(b)) => Boolean(a == b),
        (Boolean(a), Boolean(b)) => Boolean(a == b),
        (Uri(a), Uri(b)) => Boolean(a == b),
        (Str(a), Str(b)) => Boolean(a == b),
        (l, r) if l.is_numeric() && r.is_numeric() => {
            Boolean(l.coerce_number() == r.coerce_number())
        }
        _ => Unbound,
    }
}

/// RDF value ordering for comparisons.
pub(crate) fn cmp_values(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    use Value::*;
    match (left, right) {
        (l, r) if l.is_numeric() && r.is_numeric() => {
            l.coerce_number().partial_cmp(&r.coerce_number())
        }
        (Str(a), Str(b)) => Some(rdf_model::lexical_form(a).cmp(rdf_model::lexical_form(b))),
        (Uri(a), Uri(b)) => Some(a.cmp(b)),
        (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn numeric_pair(left: &Value, right: &Value) -> Option<(f64, f64)> {
    let l = left.coerce_number();
    let r = right.coerce_number();
    if l.is_nan() || r.is_nan() {
        None
    } else {
        Some((l, r))
    }
}

fn promote(result: f64) -> Value {
    if result.is_finite()
        && result.fract() == 0.0
        && result >= i64::MIN as f64
        && result <= i64::MAX as f64
    {
        Value::Integer(result as i64)
    } else {
        Value::Double(result)
    }
}

pub(crate) fn numeric_add(left: &Value, right: &Value) -> Value {
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        return a.checked_add(*b).map(Value::Integer).unwrap_or(Value::Unbound);
    }
    match numeric_pair(left, right) {
        Some((l, r)) => promote(l + r),
        None => Value::Unbound,
    }
}

pub(crate) fn numeric_subtract(left: &Value, right: &Value) -> Value {
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        return a.checked_sub(*b).map(Value::Integer).unwrap_or(Value::Unbound);
    }
    match numeric_pair(left, right) {
        Some((l, r)) => promote(l - r),
        None => Value::Unbound,
    }
}

pub(crate) fn numeric_multiply(left: &Value, right: &Value) -> Value {
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        return a.checked_mul(*b).map(Value::Integer).unwrap_or(Value::Unbound);
    }
    match numeric_pair(left, right) {
        Some((l, r)) => promote(l * r),
        None => Value::Unbound,
    }
}

/// Division always yields a double; division by zero is an error.
pub(crate) fn numeric_divide(left: &Value, right: &Value) -> Value {
    match numeric_pair(left, right) {
        Some((_, r)) if r == 0.0 => Value::Unbound,
        Some((l, r)) => Value::Double(l / r),
        None => Value::Unbound,
    }
}

pub(crate) fn numeric_negate(value: &Value) -> Value {
    match value {
        Value::Integer(i) => i.checked_neg().map(Value::Integer).unwrap_or(Value::Unbound),
        Value::Double(d) => Value::Double(-d),
        _ => Value::Unbound,
    }
}

fn is_local_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'-' || ch == b'.'
}

struct Cursor<'e> {
    text: &'e str,
    pos: usize,
}

impl<'e> Cursor<'e> {
    fn new(text: &'e str) -> Self {
        Self { text, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.text.as_bytes().get(self.pos + ahead).copied()
    }

    fn bump(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.text.len());
    }

    fn next_char(&mut self) -> char {
        let ch = self.text[self.pos..].chars().next().unwrap_or('\u{0}');
        self.pos += ch.len_utf8();
        ch
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.text[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        if rest.len() < keyword.len() {
            return false;
        }
        let (head, tail) = rest.split_at(keyword.len());
        if !head.eq_ignore_ascii_case(keyword) {
            return false;
        }
        if tail
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return false;
        }
        self.pos += keyword.len();
        true
    }

    fn read_while(&mut self, pred: impl Fn(u8) -> bool) -> &'e str {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if pred(b) {
                self.pos += 1;
            } else {
                break;
            }
        }
        &self.text[start..self.pos]
    }

    /// Capture balanced call arguments; the opening `(` is already
    /// consumed. Returns the argument texts split at top-level commas.
    fn capture_args(&mut self) -> Option<Vec<&'e str>> {
        let start = self.pos;
        let bytes = self.text.as_bytes();
        let mut depth = 1u32;
        let mut in_string: Option<u8> = None;
        let mut args = Vec::new();
        let mut arg_start = start;
        let mut i = start;
        while i < bytes.len() {
            let b = bytes[i];
            if let Some(quote) = in_string {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == quote {
                    in_string = None;
                }
                i += 1;
                continue;
            }
            match b {
                b'"' | b'\'' => in_string = Some(b),
                // A '<' opens an IRI only when a '>' closes it before any
                // whitespace or delimiter; a comparison operator falls
                // through as a plain character.
                b'<' => {
                    let mut j = i + 1;
                    while j < bytes.len()
                        && !bytes[j].is_ascii_whitespace()
                        && !matches!(bytes[j], b'>' | b',' | b'(' | b')')
                    {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j] == b'>' {
                        i = j + 1;
                        continue;
                    }
                }
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let last = self.text[arg_start..i].trim();
                        if !last.is_empty() || !args.is_empty() {
                            args.push(last);
                        }
                        self.pos = i + 1;
                        return Some(args);
                    }
                }
                b',' if depth == 1 => {
                    args.push(self.text[arg_start..i].trim());
                    arg_start = i + 1;
                }
                _ => {}
            }
            i += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;

    fn eval(expr: &str) -> Value {
        let query = QueryBuilder::new().prefix("", "http://example.org/").build();
        let evaluator = Evaluator::new(&query);
        let bindings = BindingTable::new();
        evaluator.evaluate(expr, &bindings)
    }

    fn eval_with(expr: &str, bind: &[(&str, &str)]) -> Value {
        let query = QueryBuilder::new().prefix("", "http://example.org/").build();
        let evaluator = Evaluator::new(&query);
        let mut bindings = BindingTable::new();
        for (name, value) in bind {
            bindings.bind(name, value).unwrap();
        }
        evaluator.evaluate(expr, &bindings)
    }

    #[test]
    fn test_arithmetic_promotion() {
        assert_eq!(eval("1 + 2"), Value::Integer(3));
        assert_eq!(eval("2 * 3 + 4"), Value::Integer(10));
        assert_eq!(eval("2 + 3 * 4"), Value::Integer(14));
        assert_eq!(eval("(2 + 3) * 4"), Value::Integer(20));
        assert_eq!(eval("1.5 + 1.5"), Value::Integer(3));
        assert_eq!(eval("1.5 + 1"), Value::Double(2.5));
        assert_eq!(eval("4 / 2"), Value::Double(2.0));
        assert_eq!(eval("1 / 0"), Value::Unbound);
        assert_eq!(eval("-3"), Value::Integer(-3));
        assert_eq!(eval("- (1 + 2)"), Value::Integer(-3));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("1 < 2"), Value::Boolean(true));
        assert_eq!(eval("2 <= 2"), Value::Boolean(true));
        assert_eq!(eval("3 > 2.5"), Value::Boolean(true));
        assert_eq!(eval("1 = 1.0"), Value::Boolean(true));
        assert_eq!(eval("1 != 2"), Value::Boolean(true));
        assert_eq!(eval("\"abc\" = \"abc\""), Value::Boolean(true));
        assert_eq!(eval("\"abc\" < \"abd\""), Value::Boolean(true));
        assert_eq!(eval("1 = \"abc\""), Value::Unbound);
    }

    #[test]
    fn test_boolean_logic_three_valued() {
        assert_eq!(eval("true && false"), Value::Boolean(false));
        assert_eq!(eval("true || false"), Value::Boolean(true));
        assert_eq!(eval("!true"), Value::Boolean(false));
        // error && false = false; error || true = true; otherwise error
        assert_eq!(eval_with("?x > 1 && false", &[]), Value::Boolean(false));
        assert_eq!(eval_with("?x > 1 || true", &[]), Value::Boolean(true));
        assert_eq!(eval_with("?x > 1 || false", &[]), Value::Unbound);
        assert_eq!(eval_with("?x > 1 && true", &[]), Value::Unbound);
    }

    #[test]
    fn test_in_lists() {
        assert_eq!(eval("2 IN (1, 2, 3)"), Value::Boolean(true));
        assert_eq!(eval("5 IN (1, 2, 3)"), Value::Boolean(false));
        assert_eq!(eval("5 NOT IN (1, 2, 3)"), Value::Boolean(true));
        assert_eq!(eval("2 not in (2)"), Value::Boolean(false));
    }

    #[test]
    fn test_variable_lookup() {
        assert_eq!(
            eval_with("?o + 1", &[("o", "\"2\"^^<http://www.w3.org/2001/XMLSchema#integer>")]),
            Value::Integer(3)
        );
        assert_eq!(eval_with("?o > 1", &[("o", "2")]), Value::Boolean(true));
        assert_eq!(eval("?missing"), Value::Unbound);
        assert_eq!(eval("BOUND(?missing)"), Value::Boolean(false));
        assert_eq!(eval_with("BOUND(?x)", &[("x", "1")]), Value::Boolean(true));
    }

    #[test]
    fn test_str_and_strlen() {
        assert_eq!(eval("STR(42)"), Value::Str("42".into()));
        assert_eq!(eval("STR(<urn:a>)"), Value::Str("urn:a".into()));
        assert_eq!(eval("STR(\"chat\"@fr)"), Value::Str("chat".into()));
        assert_eq!(eval("STRLEN(\"abc\")"), Value::Integer(3));
        // Astral characters count as one code point.
        assert_eq!(eval("STRLEN(\"\u{1F642}ab\")"), Value::Integer(3));
    }

    #[test]
    fn test_case_preserves_suffix() {
        assert_eq!(eval("UCASE(\"chat\"@fr)"), Value::Str("\"CHAT\"@fr".into()));
        assert_eq!(eval("LCASE(\"ABC\")"), Value::Str("abc".into()));
        assert_eq!(
            eval("UCASE(LCASE(\"MiXeD\"))"),
            Value::Str("MIXED".into())
        );
    }

    #[test]
    fn test_substr_boundaries() {
        assert_eq!(eval("SUBSTR(\"abc\", 0, 2)"), Value::Str("ab".into()));
        assert_eq!(eval("SUBSTR(\"abc\", 2)"), Value::Str("bc".into()));
        assert_eq!(eval("SUBSTR(\"abc\", 1)"), Value::Str("abc".into()));
        assert_eq!(eval("SUBSTR(\"abc\", 2, -1)"), Value::Str("".into()));
        assert_eq!(eval("SUBSTR(\"\u{1F642}ab\", 2, 1)"), Value::Str("a".into()));
        assert_eq!(eval("SUBSTR(\"chat\"@fr, 1, 2)"), Value::Str("\"ch\"@fr".into()));
    }

    #[test]
    fn test_strbefore_strafter() {
        assert_eq!(eval("STRBEFORE(\"abc\", \"b\")"), Value::Str("a".into()));
        assert_eq!(eval("STRAFTER(\"abc\", \"b\")"), Value::Str("c".into()));
        assert_eq!(eval("STRBEFORE(\"abc\", \"\")"), Value::Str("".into()));
        assert_eq!(eval("STRAFTER(\"abc\", \"\")"), Value::Str("abc".into()));
        assert_eq!(eval("STRBEFORE(\"abc\", \"z\")"), Value::Str("".into()));
        assert_eq!(
            eval("STRAFTER(\"chat\"@fr, \"h\")"),
            Value::Str("\"at\"@fr".into())
        );
    }

    #[test]
    fn test_concat_unbound_propagates() {
        assert_eq!(eval("CONCAT(\"a\", \"b\", \"c\")"), Value::Str("abc".into()));
        assert_eq!(eval("CONCAT(\"a\", ?missing)"), Value::Unbound);
    }

    #[test]
    fn test_contains_family() {
        assert_eq!(eval("CONTAINS(\"abcdef\", \"cd\")"), Value::Boolean(true));
        assert_eq!(eval("STRSTARTS(\"abc\", \"ab\")"), Value::Boolean(true));
        assert_eq!(eval("STRENDS(\"abc\", \"bc\")"), Value::Boolean(true));
        assert_eq!(eval("STRENDS(\"abc\", \"ab\")"), Value::Boolean(false));
    }

    #[test]
    fn test_replace_and_regex() {
        assert_eq!(eval("REPLACE(\"banana\", \"a\", \"o\")"), Value::Str("bonono".into()));
        assert_eq!(
            eval("REPLACE(\"Banana\", \"b\", \"X\", \"i\")"),
            Value::Str("Xanana".into())
        );
        assert_eq!(eval("REPLACE(\"x\", \"(\", \"y\")"), Value::Unbound);
        assert_eq!(eval("REGEX(\"abc\", \"^a\")"), Value::Boolean(true));
        assert_eq!(eval("REGEX(\"ABC\", \"^a\", \"i\")"), Value::Boolean(true));
        assert_eq!(eval("REGEX(\"abc\", \"(\")"), Value::Unbound);
    }

    #[test]
    fn test_strdt_strlang() {
        assert_eq!(
            eval("STRDT(\"5\", xsd:integer)"),
            Value::Integer(5)
        );
        assert_eq!(eval("STRDT(\"x\", xsd:string)"), Value::Str("x".into()));
        assert_eq!(eval("STRDT(\"x\"@en, xsd:string)"), Value::Unbound);
        assert_eq!(eval("STRLANG(\"chat\", \"fr\")"), Value::Str("\"chat\"@fr".into()));
        assert_eq!(eval("STRLANG(\"\", \"fr\")"), Value::Unbound);
        assert_eq!(eval("STRLANG(\"x\"@en, \"fr\")"), Value::Unbound);
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(eval("ABS(-5)"), Value::Integer(5));
        assert_eq!(eval("ABS(-1.5)"), Value::Double(1.5));
        assert_eq!(eval("CEIL(1.2)"), Value::Double(2.0));
        assert_eq!(eval("FLOOR(1.8)"), Value::Double(1.0));
        assert_eq!(eval("ROUND(0.5)"), Value::Double(1.0));
        assert_eq!(eval("ROUND(-0.5)"), Value::Double(-1.0));
        assert_eq!(eval("ROUND(7)"), Value::Integer(7));
    }

    #[test]
    fn test_hash_functions() {
        assert_eq!(
            eval("MD5(\"abc\")"),
            Value::Str("900150983cd24fb0d6963f7d28e17f72".into())
        );
        assert_eq!(
            eval("SHA1(\"abc\")"),
            Value::Str("a9993e364706816aba3e25717850c26c9cd0d89d".into())
        );
        assert_eq!(
            eval("SHA256(\"abc\")"),
            Value::Str("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".into())
        );
    }

    #[test]
    fn test_date_components() {
        let dt = "\"2023-11-25T10:30:45Z\"^^<http://www.w3.org/2001/XMLSchema#dateTime>";
        assert_eq!(eval_with("YEAR(?d)", &[("d", dt)]), Value::Integer(2023));
        assert_eq!(eval_with("MONTH(?d)", &[("d", dt)]), Value::Integer(11));
        assert_eq!(eval_with("DAY(?d)", &[("d", dt)]), Value::Integer(25));
        assert_eq!(eval_with("HOURS(?d)", &[("d", dt)]), Value::Integer(10));
        assert_eq!(eval_with("MINUTES(?d)", &[("d", dt)]), Value::Integer(30));
        assert_eq!(eval_with("SECONDS(?d)", &[("d", dt)]), Value::Double(45.0));
    }

    #[test]
    fn test_if_and_coalesce() {
        assert_eq!(eval("IF(1 < 2, \"yes\", \"no\")"), Value::Str("yes".into()));
        assert_eq!(eval("IF(1 > 2, \"yes\", \"no\")"), Value::Str("no".into()));
        assert_eq!(eval("IF(?missing, \"yes\", \"no\")"), Value::Unbound);
        // The untaken branch is never evaluated.
        assert_eq!(eval("IF(true, 1, 1 / 0)"), Value::Integer(1));
        assert_eq!(eval("COALESCE(?missing, 2, 3)"), Value::Integer(2));
        assert_eq!(eval("COALESCE(?missing)"), Value::Unbound);
    }

    #[test]
    fn test_casts() {
        assert_eq!(eval("xsd:integer(true)"), Value::Integer(1));
        assert_eq!(eval("xsd:integer(3.9)"), Value::Integer(3));
        assert_eq!(eval("xsd:integer(\"17\")"), Value::Integer(17));
        assert_eq!(eval("xsd:integer(\"1.5\")"), Value::Unbound);
        assert_eq!(eval("xsd:integer(xsd:string(42))"), Value::Integer(42));
        assert_eq!(eval("xsd:double(\"INF\")"), Value::Double(f64::INFINITY));
        assert_eq!(eval("xsd:double(\"-inf\")"), Value::Double(f64::NEG_INFINITY));
        assert_eq!(eval("xsd:boolean(0)"), Value::Boolean(false));
        assert_eq!(eval("xsd:boolean(\"1\")"), Value::Boolean(true));
        assert_eq!(eval("xsd:boolean(\"maybe\")"), Value::Unbound);
        assert_eq!(eval("xsd:string(1.5)"), Value::Str("1.5".into()));
        assert_eq!(eval("xsd:string(<urn:a>)"), Value::Str("urn:a".into()));
    }

    #[test]
    fn test_term_tests() {
        assert_eq!(eval("isIRI(<urn:a>)"), Value::Boolean(true));
        assert_eq!(eval("isIRI(\"a\")"), Value::Boolean(false));
        assert_eq!(eval("isLITERAL(\"a\")"), Value::Boolean(true));
        assert_eq!(eval("isLITERAL(<urn:a>)"), Value::Boolean(false));
        assert_eq!(eval("isNUMERIC(4)"), Value::Boolean(true));
        assert_eq!(eval("isNUMERIC(\"a\")"), Value::Boolean(false));
        assert_eq!(eval_with("isBLANK(?b)", &[("b", "_:b1")]), Value::Boolean(true));
        assert_eq!(eval("sameTerm(1, 1)"), Value::Boolean(true));
        assert_eq!(eval("sameTerm(1, 2)"), Value::Boolean(false));
    }

    #[test]
    fn test_lang_and_datatype() {
        assert_eq!(eval("LANG(\"chat\"@fr)"), Value::Str("fr".into()));
        assert_eq!(eval("LANG(\"chat\")"), Value::Str("".into()));
        assert_eq!(eval("LANGMATCHES(\"fr-CA\", \"fr\")"), Value::Boolean(true));
        assert_eq!(eval("LANGMATCHES(\"fr\", \"*\")"), Value::Boolean(true));
        assert_eq!(eval("LANGMATCHES(\"\", \"*\")"), Value::Boolean(false));
        assert_eq!(
            eval("DATATYPE(4)"),
            Value::Uri("<http://www.w3.org/2001/XMLSchema#integer>".into())
        );
        assert_eq!(
            eval("DATATYPE(\"x\")"),
            Value::Uri("<http://www.w3.org/2001/XMLSchema#string>".into())
        );
        assert_eq!(
            eval("DATATYPE(\"x\"@en)"),
            Value::Uri("<http://www.w3.org/1999/02/22-rdf-syntax-ns#langString>".into())
        );
    }

    #[test]
    fn test_uuid_and_iri() {
        match eval("UUID()") {
            Value::Uri(u) => assert!(u.starts_with("<urn:uuid:")),
            other => panic!("expected uri, got {:?}", other),
        }
        match eval("STRUUID()") {
            Value::Str(s) => assert_eq!(s.len(), 36),
            other => panic!("expected string, got {:?}", other),
        }
        assert_eq!(eval("IRI(\"urn:a\")"), Value::Uri("<urn:a>".into()));
    }

    #[test]
    fn test_now_and_rand() {
        match eval("NOW()") {
            Value::Str(s) => {
                assert!(s.ends_with("^^<http://www.w3.org/2001/XMLSchema#dateTime>"));
                assert!(s.contains('T'));
            }
            other => panic!("expected dateTime literal, got {:?}", other),
        }
        match eval("RAND()") {
            Value::Double(d) => assert!((0.0..1.0).contains(&d)),
            other => panic!("expected double, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_for_uri() {
        assert_eq!(
            eval("ENCODE_FOR_URI(\"a b/c\")"),
            Value::Str("a%20b%2Fc".into())
        );
    }

    #[test]
    fn test_prefixed_iri_outside_call() {
        assert_eq!(
            eval(":p = :p"),
            Value::Boolean(true)
        );
        assert_eq!(
            eval("xsd:integer = <http://www.w3.org/2001/XMLSchema#integer>"),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_malformed_expressions_are_errors() {
        assert_eq!(eval("1 +"), Value::Unbound);
        assert_eq!(eval("(1"), Value::Unbound);
        assert_eq!(eval("NOSUCHFUNC(1)"), Value::Unbound);
        assert_eq!(eval("1 2"), Value::Unbound);
    }
}
