//! Aggregation engine
//!
//! Groups are keyed by the `\0`-joined values of the GROUP BY
//! expressions; each group carries one accumulator per aggregate
//! descriptor. Numeric accumulators keep parallel decimal and double
//! tracks: `use_decimal` starts true and latches false on the first
//! double/float/scientific input (or on decimal overflow), after which
//! all arithmetic stays on the double track.
//!
//! Aggregate calls inside HAVING or inside projection expressions are not
//! substituted textually: each call is rewritten once per query into a
//! reference to an alias variable bound from the group's accumulator,
//! then the rewritten expression is evaluated against a per-group
//! snapshot.

use crate::bindings::{hash_name, BindingTable, MaterializedRow};
use crate::expr::Evaluator;
use crate::filter;
use crate::query::{var_name, AggregateFunction, QueryBuffer};
use crate::value::{classify_numeric, format_double, trim_decimal, NumericClass};
use crate::EngineError;
use oxsdatatypes::Decimal;
use rdf_model::Vocabulary;
use rustc_hash::{FxHashMap, FxHashSet};
use std::str::FromStr;

/// One aggregate resolved for execution.
#[derive(Debug, Clone)]
struct RuntimeAgg {
    function: AggregateFunction,
    distinct: bool,
    source: String,
    alias: String,
    separator: String,
    /// Synthetic aggregates exist only to feed rewritten expressions and
    /// never appear in output rows.
    hidden: bool,
}

/// One projection expression evaluated per group (aggregate calls
/// already rewritten to alias references).
#[derive(Debug, Clone)]
struct GroupExpr {
    rewritten: String,
    alias: String,
}

#[derive(Debug, Default)]
struct Extreme {
    number: f64,
    decimal: Option<Decimal>,
    literal: String,
    numeric: bool,
}

#[derive(Debug)]
struct Accumulator {
    count: u64,
    sum_double: f64,
    sum_decimal: Decimal,
    use_decimal: bool,
    all_integer: bool,
    min: Option<Extreme>,
    max: Option<Extreme>,
    sample: Option<String>,
    concat: Vec<String>,
    seen: Option<FxHashSet<String>>,
}

impl Accumulator {
    fn new(distinct: bool) -> Self {
        Self {
            count: 0,
            sum_double: 0.0,
            sum_decimal: Decimal::from(0),
            use_decimal: true,
            all_integer: true,
            min: None,
            max: None,
            sample: None,
            concat: Vec::new(),
            seen: distinct.then(FxHashSet::default),
        }
    }

    fn update(&mut self, function: AggregateFunction, value: &str) {
        if let Some(seen) = &mut self.seen {
            if !seen.insert(value.to_owned()) {
                return;
            }
        }
        match function {
            AggregateFunction::Count => self.count += 1,
            AggregateFunction::Sum | AggregateFunction::Avg => self.add_numeric(value),
            AggregateFunction::Min => Self::track_extreme(&mut self.min, value, true),
            AggregateFunction::Max => Self::track_extreme(&mut self.max, value, false),
            AggregateFunction::Sample => {
                if self.sample.is_none() {
                    self.sample = Some(value.to_owned());
                }
            }
            AggregateFunction::GroupConcat => {
                self.concat.push(rdf_model::lexical_form(value).to_owned());
            }
            AggregateFunction::None => {}
        }
    }

    fn add_numeric(&mut self, value: &str) {
        // Non-numeric inputs degrade to being skipped.
        let Some(class) = classify_numeric(value) else {
            return;
        };
        self.count += 1;
        match class {
            NumericClass::Int(i) => {
                self.sum_double += i as f64;
                if self.use_decimal {
                    match self.sum_decimal.checked_add(Decimal::from(i)) {
                        Some(sum) => self.sum_decimal = sum,
                        None => self.use_decimal = false,
                    }
                }
            }
            NumericClass::Dec(lexical) => {
                self.all_integer = false;
                self.sum_double += lexical.parse::<f64>().unwrap_or(f64::NAN);
                if self.use_decimal {
                    match Decimal::from_str(&lexical)
                        .ok()
                        .and_then(|d| self.sum_decimal.checked_add(d))
                    {
                        Some(sum) => self.sum_decimal = sum,
                        None => self.use_decimal = false,
                    }
                }
            }
            NumericClass::Dbl(f) => {
                self.all_integer = false;
                self.use_decimal = false;
                self.sum_double += f;
            }
        }
    }

    fn track_extreme(slot: &mut Option<Extreme>, value: &str, is_min: bool) {
        let candidate = match classify_numeric(value) {
            Some(NumericClass::Int(i)) => Extreme {
                number: i as f64,
                decimal: Some(Decimal::from(i)),
                literal: value.to_owned(),
                numeric: true,
            },
            Some(NumericClass::Dec(lexical)) => Extreme {
                number: lexical.parse::<f64>().unwrap_or(f64::NAN),
                decimal: Decimal::from_str(&lexical).ok(),
                literal: value.to_owned(),
                numeric: true,
            },
            Some(NumericClass::Dbl(f)) => Extreme {
                number: f,
                decimal: None,
                literal: value.to_owned(),
                numeric: true,
            },
            None => Extreme {
                number: f64::NAN,
                decimal: None,
                literal: value.to_owned(),
                numeric: false,
            },
        };
        let replace = match slot {
            None => true,
            Some(current) => {
                let ordering = match (current.numeric, candidate.numeric) {
                    (true, true) => match (&current.decimal, &candidate.decimal) {
                        (Some(a), Some(b)) => b.partial_cmp(a),
                        _ => candidate.number.partial_cmp(&current.number),
                    },
                    (false, false) => Some(candidate.literal.cmp(&current.literal)),
                    // Numeric sorts below non-numeric.
                    (true, false) => Some(std::cmp::Ordering::Greater),
                    (false, true) => Some(std::cmp::Ordering::Less),
                };
                match ordering {
                    Some(std::cmp::Ordering::Less) => is_min,
                    Some(std::cmp::Ordering::Greater) => !is_min,
                    _ => false,
                }
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    fn finalize(&self, function: AggregateFunction, separator: &str) -> Option<String> {
        match function {
            AggregateFunction::Count => Some(rdf_model::format_typed(
                &self.count.to_string(),
                Vocabulary::XSD_INTEGER,
            )),
            AggregateFunction::Sum => Some(self.format_sum()),
            AggregateFunction::Avg => self.format_avg(),
            AggregateFunction::Min => self.min.as_ref().map(|e| e.literal.clone()),
            AggregateFunction::Max => self.max.as_ref().map(|e| e.literal.clone()),
            AggregateFunction::Sample => self.sample.clone(),
            AggregateFunction::GroupConcat => Some(self.concat.join(separator)),
            AggregateFunction::None => None,
        }
    }

    fn format_sum(&self) -> String {
        if self.count == 0 {
            return rdf_model::format_typed("0", Vocabulary::XSD_INTEGER);
        }
        if self.use_decimal {
            let lexical = self.sum_decimal.to_string();
            let lexical = trim_decimal(&lexical).to_owned();
            let datatype = if self.all_integer && !lexical.contains('.') {
                Vocabulary::XSD_INTEGER
            } else {
                Vocabulary::XSD_DECIMAL
            };
            rdf_model::format_typed(&lexical, datatype)
        } else {
            rdf_model::format_typed(&format_double(self.sum_double), Vocabulary::XSD_DOUBLE)
        }
    }

    fn format_avg(&self) -> Option<String> {
        if self.count == 0 {
            return None;
        }
        if self.use_decimal {
            if let Some(quotient) = self
                .sum_decimal
                .checked_div(Decimal::from(self.count as i64))
            {
                let lexical = quotient.to_string();
                let lexical = trim_decimal(&lexical).to_owned();
                let datatype = if self.all_integer && !lexical.contains('.') {
                    Vocabulary::XSD_INTEGER
                } else {
                    Vocabulary::XSD_DECIMAL
                };
                return Some(rdf_model::format_typed(&lexical, datatype));
            }
        }
        Some(rdf_model::format_typed(
            &format_double(self.sum_double / self.count as f64),
            Vocabulary::XSD_DOUBLE,
        ))
    }
}

struct GroupState {
    /// `(name, value)` pairs for the group-key bindings.
    key_bindings: Vec<(String, String)>,
    accumulators: Vec<Accumulator>,
}

/// Grouping and accumulation driver for one query execution.
pub(crate) struct Aggregation<'q> {
    query: &'q QueryBuffer,
    aggs: Vec<RuntimeAgg>,
    group_exprs: Vec<GroupExpr>,
    having: Vec<String>,
    groups: FxHashMap<String, usize>,
    states: Vec<GroupState>,
}

impl<'q> Aggregation<'q> {
    pub(crate) fn new(query: &'q QueryBuffer) -> Self {
        let mut aggs: Vec<RuntimeAgg> = Vec::new();
        let mut group_exprs = Vec::new();

        for spec in &query.aggregates {
            if spec.function == AggregateFunction::None {
                continue;
            }
            aggs.push(RuntimeAgg {
                function: spec.function,
                distinct: spec.distinct,
                source: query.source.resolve(spec.source_var).trim().to_owned(),
                alias: var_name(query.source.resolve(spec.alias)).to_owned(),
                separator: spec
                    .separator
                    .map(|s| query.source.resolve(s).to_owned())
                    .unwrap_or_else(|| " ".to_owned()),
                hidden: false,
            });
        }

        for spec in &query.aggregates {
            if spec.function != AggregateFunction::None {
                continue;
            }
            let text = spec
                .expr
                .map(|e| query.source.resolve(e))
                .unwrap_or_default();
            group_exprs.push(GroupExpr {
                rewritten: rewrite_aggregate_calls(text, &mut aggs),
                alias: var_name(query.source.resolve(spec.alias)).to_owned(),
            });
        }

        let having = match query.having {
            Some(span) => having_conjuncts(query.source.resolve(span))
                .into_iter()
                .map(|conjunct| rewrite_aggregate_calls(&conjunct, &mut aggs))
                .collect(),
            None => Vec::new(),
        };

        Self {
            query,
            aggs,
            group_exprs,
            having,
            groups: FxHashMap::default(),
            states: Vec::new(),
        }
    }

    /// Fold one solution row into its group.
    pub(crate) fn update(
        &mut self,
        evaluator: &Evaluator<'_>,
        bindings: &BindingTable,
    ) -> Result<(), EngineError> {
        let mut key = String::new();
        let mut key_bindings = Vec::new();
        for group_key in &self.query.group_by {
            let expr = self.query.source.resolve(group_key.expr);
            let value = evaluator.evaluate(expr, bindings);
            let text = value
                .binding_string()
                .map(|(s, _)| s)
                .unwrap_or_default();
            if !key.is_empty() {
                key.push('\u{0}');
            }
            key.push_str(&text);

            let name = match group_key.alias {
                Some(alias) => Some(var_name(self.query.source.resolve(alias)).to_owned()),
                None => {
                    let trimmed = expr.trim();
                    trimmed
                        .starts_with(['?', '$'])
                        .then(|| var_name(trimmed).to_owned())
                }
            };
            if let Some(name) = name {
                key_bindings.push((name, text));
            }
        }

        let index = match self.groups.get(&key) {
            Some(&i) => i,
            None => {
                let accumulators = self
                    .aggs
                    .iter()
                    .map(|a| Accumulator::new(a.distinct))
                    .collect();
                self.states.push(GroupState {
                    key_bindings,
                    accumulators,
                });
                self.groups.insert(key, self.states.len() - 1);
                self.states.len() - 1
            }
        };

        let state = &mut self.states[index];
        for (agg, acc) in self.aggs.iter().zip(&mut state.accumulators) {
            if agg.source == "*" {
                let row_key = row_key(bindings);
                acc.update(agg.function, &row_key);
            } else if let Some(value) = bindings.value_of(var_name(&agg.source)) {
                acc.update(agg.function, value);
            }
        }
        Ok(())
    }

    /// Finalize every group into result rows, applying HAVING.
    pub(crate) fn finish(
        mut self,
        evaluator: &Evaluator<'_>,
    ) -> Result<Vec<MaterializedRow>, EngineError> {
        // Implicit aggregation: aggregates without GROUP BY over zero
        // rows still emit one group of defaults.
        if self.states.is_empty() && self.query.group_by.is_empty() && !self.aggs.is_empty() {
            self.states.push(GroupState {
                key_bindings: Vec::new(),
                accumulators: self
                    .aggs
                    .iter()
                    .map(|a| Accumulator::new(a.distinct))
                    .collect(),
            });
        }

        let mut rows = Vec::new();
        for state in &self.states {
            let mut snapshot = BindingTable::new();
            for (name, value) in &state.key_bindings {
                snapshot.bind(name, value)?;
            }
            for (agg, acc) in self.aggs.iter().zip(&state.accumulators) {
                if let Some(value) = acc.finalize(agg.function, &agg.separator) {
                    snapshot.bind(&agg.alias, &value)?;
                }
            }
            for group_expr in &self.group_exprs {
                let value = evaluator.evaluate(&group_expr.rewritten, &snapshot);
                if let Some((text, typed)) = value.binding_string() {
                    snapshot.bind_decoded(&group_expr.alias, &text, typed)?;
                }
            }

            let keep = self
                .having
                .iter()
                .all(|conjunct| filter::holds(evaluator, conjunct, &snapshot));
            if !keep {
                continue;
            }

            // Output rows carry the key bindings, the visible aggregate
            // aliases, and the projection-expression aliases; synthetic
            // aggregates stay internal.
            let mut hashes = Vec::new();
            let mut values = Vec::new();
            for (name, value) in &state.key_bindings {
                hashes.push(hash_name(name));
                values.push(value.clone());
            }
            for agg in self.aggs.iter().filter(|a| !a.hidden) {
                if let Some(i) = snapshot.find(&agg.alias) {
                    hashes.push(hash_name(&agg.alias));
                    values.push(snapshot.get(i).to_owned());
                }
            }
            for group_expr in &self.group_exprs {
                if let Some(i) = snapshot.find(&group_expr.alias) {
                    hashes.push(hash_name(&group_expr.alias));
                    values.push(snapshot.get(i).to_owned());
                }
            }
            rows.push(MaterializedRow { hashes, values });
        }
        Ok(rows)
    }
}

/// Composite key of every bound value, for `COUNT(*)` style row inputs.
fn row_key(bindings: &BindingTable) -> String {
    let mut key = String::new();
    for (_, value) in bindings.iter() {
        if !key.is_empty() {
            key.push('\u{1}');
        }
        key.push_str(value);
    }
    key
}

/// Split a multi-parenthesized HAVING (`(c1) (c2) ...`) into conjuncts.
fn having_conjuncts(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if !trimmed.starts_with('(') {
        return vec![trimmed.to_owned()];
    }
    let bytes = trimmed.as_bytes();
    let mut groups = Vec::new();
    let mut depth = 0u32;
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => {
                if depth == 0 {
                    start = i + 1;
                }
                depth += 1;
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    groups.push(trimmed[start..i].trim().to_owned());
                }
            }
            _ if depth == 0 && !b.is_ascii_whitespace() => {
                // Anything outside parens means this is one expression.
                return vec![trimmed.to_owned()];
            }
            _ => {}
        }
    }
    if depth != 0 || groups.is_empty() {
        vec![trimmed.to_owned()]
    } else {
        groups
    }
}

/// Rewrite aggregate calls into alias-variable references, registering
/// synthetic aggregates for calls the SELECT list does not carry.
fn rewrite_aggregate_calls(text: &str, aggs: &mut Vec<RuntimeAgg>) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let word = &text[start..i];
            let function = match word.to_ascii_uppercase().as_str() {
                "COUNT" => Some(AggregateFunction::Count),
                "SUM" => Some(AggregateFunction::Sum),
                "AVG" => Some(AggregateFunction::Avg),
                "MIN" => Some(AggregateFunction::Min),
                "MAX" => Some(AggregateFunction::Max),
                "SAMPLE" => Some(AggregateFunction::Sample),
                "GROUP_CONCAT" => Some(AggregateFunction::GroupConcat),
                _ => None,
            };
            let open = i;
            if let Some(function) = function {
                if bytes.get(open) == Some(&b'(') {
                    if let Some(close) = matching_paren(text, open) {
                        let inner = text[open + 1..close].trim();
                        let (distinct, source) = split_distinct(inner);
                        let alias = resolve_alias(aggs, function, distinct, source);
                        out.push('?');
                        out.push_str(&alias);
                        i = close + 1;
                        continue;
                    }
                }
            }
            out.push_str(word);
            continue;
        }
        let ch = text[i..].chars().next().unwrap_or('\u{0}');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0u32;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_distinct(inner: &str) -> (bool, &str) {
    if inner.len() > 8 && inner[..8].eq_ignore_ascii_case("DISTINCT") {
        let rest = &inner[8..];
        if rest.starts_with(char::is_whitespace) {
            return (true, rest.trim());
        }
    }
    (false, inner)
}

fn resolve_alias(
    aggs: &mut Vec<RuntimeAgg>,
    function: AggregateFunction,
    distinct: bool,
    source: &str,
) -> String {
    if let Some(existing) = aggs.iter().find(|a| {
        a.function == function && a.distinct == distinct && a.source == source
    }) {
        return existing.alias.clone();
    }
    let alias = format!("__agg{}", aggs.len());
    aggs.push(RuntimeAgg {
        function,
        distinct,
        source: source.to_owned(),
        alias: alias.clone(),
        separator: " ".to_owned(),
        hidden: true,
    });
    alias
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_having_conjuncts() {
        assert_eq!(having_conjuncts("?x > 1"), vec!["?x > 1".to_owned()]);
        assert_eq!(
            having_conjuncts("(?x > 1) (?y < 2)"),
            vec!["?x > 1".to_owned(), "?y < 2".to_owned()]
        );
        // A leading paren that is part of one expression stays whole.
        assert_eq!(
            having_conjuncts("(?x + 1) > 2"),
            vec!["(?x + 1) > 2".to_owned()]
        );
    }

    #[test]
    fn test_rewrite_matches_existing_alias() {
        let mut aggs = vec![RuntimeAgg {
            function: AggregateFunction::Sum,
            distinct: false,
            source: "?o".to_owned(),
            alias: "t".to_owned(),
            separator: " ".to_owned(),
            hidden: false,
        }];
        let rewritten = rewrite_aggregate_calls("SUM(?o) > 2", &mut aggs);
        assert_eq!(rewritten, "?t > 2");
        assert_eq!(aggs.len(), 1);
    }

    #[test]
    fn test_rewrite_registers_synthetic_aggregates() {
        let mut aggs = Vec::new();
        let rewritten = rewrite_aggregate_calls("(MIN(?p) + MAX(?p)) / 2", &mut aggs);
        assert_eq!(rewritten, "(?__agg0 + ?__agg1) / 2");
        assert_eq!(aggs.len(), 2);
        assert!(aggs.iter().all(|a| a.hidden));
        assert_eq!(aggs[0].function, AggregateFunction::Min);
        assert_eq!(aggs[1].function, AggregateFunction::Max);
    }

    #[test]
    fn test_rewrite_distinct_normalization() {
        let mut aggs = Vec::new();
        rewrite_aggregate_calls("COUNT(DISTINCT ?s)", &mut aggs);
        assert!(aggs[0].distinct);
        assert_eq!(aggs[0].source, "?s");
    }

    #[test]
    fn test_sum_accumulator_integer_track() {
        let mut acc = Accumulator::new(false);
        acc.update(
            AggregateFunction::Sum,
            "\"1\"^^<http://www.w3.org/2001/XMLSchema#integer>",
        );
        acc.update(
            AggregateFunction::Sum,
            "\"2\"^^<http://www.w3.org/2001/XMLSchema#integer>",
        );
        assert_eq!(
            acc.finalize(AggregateFunction::Sum, " "),
            Some("\"3\"^^<http://www.w3.org/2001/XMLSchema#integer>".to_owned())
        );
    }

    #[test]
    fn test_sum_accumulator_decimal_track() {
        let mut acc = Accumulator::new(false);
        acc.update(AggregateFunction::Sum, "1.5");
        acc.update(AggregateFunction::Sum, "1");
        assert_eq!(
            acc.finalize(AggregateFunction::Sum, " "),
            Some("\"2.5\"^^<http://www.w3.org/2001/XMLSchema#decimal>".to_owned())
        );
    }

    #[test]
    fn test_sum_latches_double_on_float_input() {
        let mut acc = Accumulator::new(false);
        acc.update(AggregateFunction::Sum, "1");
        acc.update(
            AggregateFunction::Sum,
            "\"2.5\"^^<http://www.w3.org/2001/XMLSchema#double>",
        );
        assert!(!acc.use_decimal);
        assert_eq!(
            acc.finalize(AggregateFunction::Sum, " "),
            Some("\"3.5\"^^<http://www.w3.org/2001/XMLSchema#double>".to_owned())
        );
    }

    #[test]
    fn test_sum_skips_non_numeric() {
        let mut acc = Accumulator::new(false);
        acc.update(AggregateFunction::Sum, "1");
        acc.update(AggregateFunction::Sum, "not a number");
        acc.update(AggregateFunction::Sum, "2");
        assert_eq!(
            acc.finalize(AggregateFunction::Sum, " "),
            Some("\"3\"^^<http://www.w3.org/2001/XMLSchema#integer>".to_owned())
        );
    }

    #[test]
    fn test_empty_sum_and_count_defaults() {
        let acc = Accumulator::new(false);
        assert_eq!(
            acc.finalize(AggregateFunction::Sum, " "),
            Some("\"0\"^^<http://www.w3.org/2001/XMLSchema#integer>".to_owned())
        );
        assert_eq!(
            acc.finalize(AggregateFunction::Count, " "),
            Some("\"0\"^^<http://www.w3.org/2001/XMLSchema#integer>".to_owned())
        );
        assert_eq!(acc.finalize(AggregateFunction::Avg, " "), None);
        assert_eq!(acc.finalize(AggregateFunction::Min, " "), None);
    }

    #[test]
    fn test_avg_precision() {
        let mut acc = Accumulator::new(false);
        acc.update(AggregateFunction::Avg, "1");
        acc.update(AggregateFunction::Avg, "2");
        assert_eq!(
            acc.finalize(AggregateFunction::Avg, " "),
            Some("\"1.5\"^^<http://www.w3.org/2001/XMLSchema#decimal>".to_owned())
        );
    }

    #[test]
    fn test_min_max_preserve_original_literal() {
        let mut acc = Accumulator::new(false);
        let one = "\"1\"^^<http://www.w3.org/2001/XMLSchema#integer>";
        let three = "\"3.0\"^^<http://www.w3.org/2001/XMLSchema#decimal>";
        acc.update(AggregateFunction::Min, three);
        acc.update(AggregateFunction::Min, one);
        acc.update(AggregateFunction::Max, three);
        acc.update(AggregateFunction::Max, one);
        assert_eq!(acc.finalize(AggregateFunction::Min, " "), Some(one.to_owned()));
        assert_eq!(acc.finalize(AggregateFunction::Max, " "), Some(three.to_owned()));
    }

    #[test]
    fn test_distinct_accumulator() {
        let mut acc = Accumulator::new(true);
        acc.update(AggregateFunction::Count, "a");
        acc.update(AggregateFunction::Count, "a");
        acc.update(AggregateFunction::Count, "b");
        assert_eq!(
            acc.finalize(AggregateFunction::Count, " "),
            Some("\"2\"^^<http://www.w3.org/2001/XMLSchema#integer>".to_owned())
        );
    }

    #[test]
    fn test_group_concat() {
        let mut acc = Accumulator::new(false);
        acc.update(AggregateFunction::GroupConcat, "a");
        acc.update(AggregateFunction::GroupConcat, "\"b\"@en");
        assert_eq!(
            acc.finalize(AggregateFunction::GroupConcat, ", "),
            Some("a, b".to_owned())
        );
    }
}
