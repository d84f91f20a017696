//! Query pattern representation
//!
//! One flat array of fixed-shape slots replaces a nested pattern tree.
//! Nested constructs (GRAPH, EXISTS, VALUES) occupy a header slot plus a
//! contiguous run of child slots addressed by `(child_start, child_count)`,
//! which keeps every scan operator a fixed-size structure and iteration
//! free of recursion. The [`QueryBuilder`] is the interface the query
//! parser drives; test suites use it directly.

use crate::source::{SourceBuffer, Span};
use rdf_model::Vocabulary;

/// Term category inside a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    /// `?name` / `$name`
    Variable,
    /// `<iri>` or prefixed name
    Iri,
    /// Literal constant
    Literal,
    /// `_:label` (typed value) or `[]` (wildcard)
    BlankNode,
}

/// One pattern term: a kind plus a span into the source buffer.
#[derive(Debug, Clone, Copy)]
pub struct Term {
    /// Term category.
    pub kind: TermKind,
    /// Source range of the term text.
    pub span: Span,
}

impl Term {
    /// Whether this term is a variable.
    pub fn is_variable(&self) -> bool {
        self.kind == TermKind::Variable
    }
}

/// Property-path operator attached to a predicate position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Plain predicate
    None,
    /// `^p`
    Inverse,
    /// `p?`
    ZeroOrOne,
    /// `p*`
    ZeroOrMore,
    /// `p+`
    OneOrMore,
    /// `a/b`
    Sequence,
    /// `a|b`
    Alternative,
    /// `!(a|^b)`
    NegatedSet,
    /// `(a/b)?`
    GroupedZeroOrOne,
    /// `(a/b)*`
    GroupedZeroOrMore,
    /// `(a/b)+`
    GroupedOneOrMore,
    /// `^(a/b)`
    InverseGroup,
}

/// A property path: a kind plus one or two sub-ranges into the source.
#[derive(Debug, Clone, Copy)]
pub struct PropertyPath {
    /// Path operator.
    pub kind: PathKind,
    /// First sub-range (the whole operand list for alternatives and
    /// negated sets).
    pub first: Span,
    /// Second sub-range (sequence tail), or empty.
    pub second: Span,
}

impl PropertyPath {
    /// A plain predicate (no path operator).
    pub const NONE: PropertyPath = PropertyPath {
        kind: PathKind::None,
        first: Span::EMPTY,
        second: Span::EMPTY,
    };
}

/// One triple pattern.
#[derive(Debug, Clone, Copy)]
pub struct TriplePattern {
    /// Subject term.
    pub subject: Term,
    /// Predicate term (the full path text when `path` is not `None`).
    pub predicate: Term,
    /// Object term.
    pub object: Term,
    /// Property path attached to the predicate.
    pub path: PropertyPath,
}

/// One slot of the flat pattern array.
#[derive(Debug, Clone)]
pub enum PatternSlot {
    /// A (possibly optional) triple pattern.
    Triple {
        /// The pattern.
        pattern: TriplePattern,
        /// OPTIONAL clause membership.
        optional: bool,
    },
    /// A FILTER expression.
    Filter {
        /// Expression text range.
        expr: Span,
    },
    /// A BIND assignment.
    Bind {
        /// Target variable.
        var: Span,
        /// Expression text range.
        expr: Span,
        /// UNION branch the BIND belongs to (0 = first).
        branch: u8,
    },
    /// A MINUS pattern.
    MinusTriple {
        /// The pattern.
        pattern: TriplePattern,
    },
    /// EXISTS header; children follow contiguously.
    ExistsHeader {
        /// Index of the first child slot.
        child_start: usize,
        /// Number of child slots.
        child_count: usize,
    },
    /// NOT EXISTS header; children follow contiguously.
    NotExistsHeader {
        /// Index of the first child slot.
        child_start: usize,
        /// Number of child slots.
        child_count: usize,
    },
    /// GRAPH clause header; children follow contiguously.
    GraphClause {
        /// Graph term (IRI constant or variable).
        graph: Term,
        /// Index of the first child slot.
        child_start: usize,
        /// Number of child slots.
        child_count: usize,
    },
    /// Inline VALUES header; entry slots follow contiguously.
    ValuesHeader {
        /// Constrained variable.
        var: Term,
        /// Index of the first entry slot.
        entry_start: usize,
        /// Number of entry slots.
        entry_count: usize,
    },
    /// One inline VALUES entry.
    ValuesEntry {
        /// Entry text range.
        value: Span,
    },
    /// A sub-select; the inner buffer's slot array is the child run.
    SubSelect {
        /// The inner query.
        query: Box<QueryBuffer>,
    },
}

/// Flag bits and layout indexes derived while building a query.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryFlags {
    /// Any FILTER slots present.
    pub has_filters: bool,
    /// Any optional triple slots present.
    pub has_optional: bool,
    /// A UNION branch is present.
    pub has_union: bool,
    /// Any BIND slots present.
    pub has_binds: bool,
    /// Any MINUS slots present.
    pub has_minus: bool,
    /// Any inline VALUES present.
    pub has_values: bool,
    /// A post-query VALUES grid is present.
    pub has_post_values: bool,
    /// Any EXISTS / NOT EXISTS present.
    pub has_exists: bool,
    /// Number of BIND slots belonging to the first UNION branch.
    pub first_branch_bind_count: usize,
    /// Slot index where the second UNION branch begins.
    pub union_start_index: usize,
    /// Number of required triple slots in the second UNION branch.
    pub union_branch_triple_count: usize,
}

/// Aggregate function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// Projection expression embedding aggregate calls.
    None,
    /// COUNT
    Count,
    /// SUM
    Sum,
    /// AVG
    Avg,
    /// MIN
    Min,
    /// MAX
    Max,
    /// SAMPLE
    Sample,
    /// GROUP_CONCAT
    GroupConcat,
}

/// One aggregate descriptor from the SELECT clause.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    /// Aggregate function (`None` for an embedding expression).
    pub function: AggregateFunction,
    /// DISTINCT modifier.
    pub distinct: bool,
    /// Source variable text (`?v` or `*`).
    pub source_var: Span,
    /// Result alias variable text.
    pub alias: Span,
    /// GROUP_CONCAT separator, when given.
    pub separator: Option<Span>,
    /// Embedding expression text (function `None` only).
    pub expr: Option<Span>,
}

/// One projected column of the SELECT clause.
#[derive(Debug, Clone)]
pub enum SelectItem {
    /// A plain variable.
    Variable(Span),
    /// `(expr AS ?alias)` without aggregates.
    Expression {
        /// Expression text.
        expr: Span,
        /// Alias variable text.
        alias: Span,
    },
    /// Reference into the aggregate descriptor array.
    Aggregate(usize),
}

/// One GROUP BY key.
#[derive(Debug, Clone)]
pub struct GroupKey {
    /// Key expression text (usually a variable).
    pub expr: Span,
    /// Alias for non-variable key expressions.
    pub alias: Option<Span>,
}

/// One ORDER BY condition.
#[derive(Debug, Clone)]
pub struct OrderCondition {
    /// Sort key expression text.
    pub expr: Span,
    /// Direction.
    pub ascending: bool,
}

/// Post-query VALUES grid (inner-join semantics).
#[derive(Debug, Clone)]
pub struct ValuesGrid {
    /// Variable texts, one per column.
    pub vars: Vec<Span>,
    /// Rows; `None` is UNDEF.
    pub rows: Vec<Vec<Option<Span>>>,
}

/// One SERVICE clause.
#[derive(Debug, Clone)]
pub struct ServiceClause {
    /// Endpoint term (IRI constant or variable).
    pub endpoint: Term,
    /// Raw group-pattern text forwarded to the endpoint.
    pub pattern: Span,
    /// SILENT modifier.
    pub silent: bool,
}

/// An owned, parsed query: the slot array plus auxiliary arrays.
///
/// Created by the parser (or the [`QueryBuilder`]), consumed once by an
/// execution, then released.
#[derive(Debug, Default, Clone)]
pub struct QueryBuffer {
    pub(crate) source: SourceBuffer,
    pub(crate) slots: Vec<PatternSlot>,
    pub(crate) prefixes: Vec<(Span, Span)>,
    pub(crate) select: Vec<SelectItem>,
    pub(crate) aggregates: Vec<AggregateSpec>,
    pub(crate) group_by: Vec<GroupKey>,
    pub(crate) having: Option<Span>,
    pub(crate) order_by: Vec<OrderCondition>,
    pub(crate) post_values: Option<ValuesGrid>,
    pub(crate) services: Vec<ServiceClause>,
    pub(crate) from_graphs: Vec<Span>,
    pub(crate) distinct: bool,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: usize,
    pub(crate) flags: QueryFlags,
    pub(crate) child_mask: Vec<bool>,
}

impl QueryBuffer {
    /// The source buffer.
    pub fn source(&self) -> &SourceBuffer {
        &self.source
    }

    /// The slot array.
    pub fn slots(&self) -> &[PatternSlot] {
        &self.slots
    }

    /// The derived flag set.
    pub fn flags(&self) -> QueryFlags {
        self.flags
    }

    /// Resolve a term's text.
    pub fn term_text(&self, term: &Term) -> &str {
        self.source.resolve(term.span)
    }

    /// Namespace for a prefix: `xsd` / `rdf` / `rdfs` expand canonically,
    /// everything else through the query's prefix map.
    pub fn namespace_for(&self, prefix: &str) -> Option<&str> {
        match prefix {
            "xsd" => return Some(Vocabulary::XSD_NS),
            "rdf" => return Some(Vocabulary::RDF_NS),
            "rdfs" => return Some(Vocabulary::RDFS_NS),
            _ => {}
        }
        self.prefixes
            .iter()
            .find(|(p, _)| self.source.resolve(*p) == prefix)
            .map(|(_, ns)| self.source.resolve(*ns))
    }

    /// Expand a term text into its canonical store form.
    ///
    /// Prefixed names become bracketed IRIs, quoted plain literals lose
    /// their quotes, prefixed datatype suffixes are expanded. Text that
    /// cannot be expanded is returned unchanged.
    pub fn expand(&self, text: &str) -> String {
        match text.as_bytes().first() {
            Some(b'<') | Some(b'?') | Some(b'$') | Some(b'_') => return text.to_owned(),
            Some(b'"') => {
                let suffix = rdf_model::suffix(text);
                if suffix.is_empty() {
                    return rdf_model::lexical_form(text).to_owned();
                }
                if let Some(dt) = suffix.strip_prefix("^^") {
                    if !dt.starts_with('<') {
                        if let Some((prefix, local)) = dt.split_once(':') {
                            if let Some(ns) = self.namespace_for(prefix) {
                                return rdf_model::format_typed(
                                    rdf_model::lexical_form(text),
                                    &format!("{}{}", ns, local),
                                );
                            }
                        }
                    }
                }
                return text.to_owned();
            }
            _ => {}
        }
        if text == "true" || text == "false" || rdf_model::is_numeric_lexical(text) {
            return text.to_owned();
        }
        if let Some((prefix, local)) = text.split_once(':') {
            if let Some(ns) = self.namespace_for(prefix) {
                return format!("<{}{}>", ns, local);
            }
        }
        text.to_owned()
    }

    /// Whether the slot at `index` sits inside a header's child run.
    pub(crate) fn is_child_slot(&self, index: usize) -> bool {
        self.child_mask.get(index).copied().unwrap_or(false)
    }

    /// Indices of the top-level slots of a UNION branch (both branches
    /// when the query has no UNION).
    pub(crate) fn branch_slots(&self, branch: u8) -> std::ops::Range<usize> {
        if !self.flags.has_union {
            return 0..self.slots.len();
        }
        if branch == 0 {
            0..self.flags.union_start_index
        } else {
            self.flags.union_start_index..self.slots.len()
        }
    }
}

/// Variable name without its `?` / `$` sigil.
pub fn var_name(text: &str) -> &str {
    text.strip_prefix(['?', '$']).unwrap_or(text)
}

/// Index of the first top-level occurrence of `needle`, skipping over
/// `(...)` groups and `<...>` IRIs.
fn find_top_level(text: &str, needle: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0u32;
    let mut in_iri = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'<' => in_iri = true,
            b'>' if in_iri => in_iri = false,
            b'(' if !in_iri => depth += 1,
            b')' if !in_iri => depth = depth.saturating_sub(1),
            _ if b == needle && depth == 0 && !in_iri => return Some(i),
            _ => {}
        }
    }
    None
}

/// Byte index of the `)` matching an opening `(` at `open`.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0u32;
    let mut in_iri = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'<' => in_iri = true,
            b'>' if in_iri => in_iri = false,
            b'(' if !in_iri => depth += 1,
            b')' if !in_iri => {
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

/// Classify a predicate text into a path kind and its operand ranges.
pub(crate) fn classify_path(text: &str) -> (PathKind, &str, &str) {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('!') {
        let inner = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest);
        return (PathKind::NegatedSet, inner, "");
    }
    if let Some(rest) = text.strip_prefix("^(") {
        if let Some(inner) = rest.strip_suffix(')') {
            return (PathKind::InverseGroup, inner, "");
        }
    }
    if text.starts_with('(') {
        if let Some(close) = matching_close(text, 0) {
            if close == text.len() - 2 {
                let inner = &text[1..close];
                match text.as_bytes()[text.len() - 1] {
                    b'?' => return (PathKind::GroupedZeroOrOne, inner, ""),
                    b'*' => return (PathKind::GroupedZeroOrMore, inner, ""),
                    b'+' => return (PathKind::GroupedOneOrMore, inner, ""),
                    _ => {}
                }
            }
        }
    }
    if find_top_level(text, b'|').is_some() {
        return (PathKind::Alternative, text, "");
    }
    if let Some(slash) = find_top_level(text, b'/') {
        return (PathKind::Sequence, &text[..slash], &text[slash + 1..]);
    }
    if let Some(rest) = text.strip_suffix('?') {
        return (PathKind::ZeroOrOne, rest, "");
    }
    if let Some(rest) = text.strip_suffix('*') {
        return (PathKind::ZeroOrMore, rest, "");
    }
    if let Some(rest) = text.strip_suffix('+') {
        return (PathKind::OneOrMore, rest, "");
    }
    if let Some(rest) = text.strip_prefix('^') {
        return (PathKind::Inverse, rest, "");
    }
    (PathKind::None, text, "")
}

/// Classify a term text.
pub(crate) fn classify_term(text: &str) -> TermKind {
    match text.as_bytes().first() {
        Some(b'?') | Some(b'$') => TermKind::Variable,
        Some(b'<') => TermKind::Iri,
        Some(b'[') => TermKind::BlankNode,
        Some(b'"') | Some(b'\'') => TermKind::Literal,
        Some(b'_') if text.starts_with("_:") => TermKind::BlankNode,
        Some(b) if b.is_ascii_digit() || *b == b'+' || *b == b'-' => TermKind::Literal,
        _ => {
            if text == "true" || text == "false" {
                TermKind::Literal
            } else if text.contains(':') {
                TermKind::Iri
            } else {
                TermKind::Literal
            }
        }
    }
}

/// Builder assembling a [`QueryBuffer`] slot by slot.
///
/// This is the surface the query parser targets; tests drive it directly.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    buf: QueryBuffer,
    in_union_branch: bool,
    pending_children: Vec<TriplePattern>,
}

impl QueryBuilder {
    /// Start an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    fn push_term(&mut self, text: &str) -> Term {
        let kind = classify_term(text);
        let span = self.buf.source.push(text);
        Term { kind, span }
    }

    fn push_pattern(&mut self, s: &str, p: &str, o: &str) -> TriplePattern {
        let subject = self.push_term(s);
        let (kind, first_text, second_text) = classify_path(p);
        let predicate = Term {
            kind: if kind == PathKind::None {
                classify_term(p)
            } else {
                TermKind::Iri
            },
            span: self.buf.source.push(p),
        };
        let path = if kind == PathKind::None {
            PropertyPath::NONE
        } else {
            let first = self.buf.source.push(first_text);
            let second = if second_text.is_empty() {
                Span::EMPTY
            } else {
                self.buf.source.push(second_text)
            };
            PropertyPath { kind, first, second }
        };
        let object = self.push_term(o);
        TriplePattern {
            subject,
            predicate,
            object,
            path,
        }
    }

    /// Register a prefix mapping.
    pub fn prefix(mut self, prefix: &str, namespace: &str) -> Self {
        let p = self.buf.source.push(prefix);
        let ns = self.buf.source.push(namespace);
        self.buf.prefixes.push((p, ns));
        self
    }

    /// Add a FROM graph (default-graph union member).
    pub fn from_graph(mut self, graph: &str) -> Self {
        let span = self.buf.source.push(graph);
        self.buf.from_graphs.push(span);
        self
    }

    /// Add a required triple pattern.
    pub fn triple(mut self, s: &str, p: &str, o: &str) -> Self {
        let pattern = self.push_pattern(s, p, o);
        self.buf.slots.push(PatternSlot::Triple {
            pattern,
            optional: false,
        });
        if self.in_union_branch {
            self.buf.flags.union_branch_triple_count += 1;
        }
        self
    }

    /// Add an OPTIONAL triple pattern.
    pub fn optional(mut self, s: &str, p: &str, o: &str) -> Self {
        let pattern = self.push_pattern(s, p, o);
        self.buf.slots.push(PatternSlot::Triple {
            pattern,
            optional: true,
        });
        self.buf.flags.has_optional = true;
        self
    }

    /// Add a FILTER expression.
    pub fn filter(mut self, expr: &str) -> Self {
        let span = self.buf.source.push(expr);
        self.buf.slots.push(PatternSlot::Filter { expr: span });
        self.buf.flags.has_filters = true;
        self
    }

    /// Add a BIND assignment.
    pub fn bind(mut self, expr: &str, var: &str) -> Self {
        let expr = self.buf.source.push(expr);
        let var = self.buf.source.push(var);
        let branch = u8::from(self.in_union_branch);
        self.buf.slots.push(PatternSlot::Bind { var, expr, branch });
        self.buf.flags.has_binds = true;
        if branch == 0 {
            self.buf.flags.first_branch_bind_count += 1;
        }
        self
    }

    /// Add a MINUS triple pattern.
    pub fn minus(mut self, s: &str, p: &str, o: &str) -> Self {
        let pattern = self.push_pattern(s, p, o);
        self.buf.slots.push(PatternSlot::MinusTriple { pattern });
        self.buf.flags.has_minus = true;
        self
    }

    fn push_header_children(&mut self, triples: &[(&str, &str, &str)]) -> (usize, usize) {
        let child_start = self.buf.slots.len() + 1;
        let child_count = triples.len();
        self.pending_children = triples
            .iter()
            .map(|(s, p, o)| self.push_pattern(s, p, o))
            .collect();
        (child_start, child_count)
    }

    /// Add an EXISTS constraint over the given triple patterns.
    pub fn exists(mut self, triples: &[(&str, &str, &str)]) -> Self {
        let (child_start, child_count) = self.push_header_children(triples);
        self.buf.slots.push(PatternSlot::ExistsHeader {
            child_start,
            child_count,
        });
        self.flush_children();
        self.buf.flags.has_exists = true;
        self
    }

    /// Add a NOT EXISTS constraint over the given triple patterns.
    pub fn not_exists(mut self, triples: &[(&str, &str, &str)]) -> Self {
        let (child_start, child_count) = self.push_header_children(triples);
        self.buf.slots.push(PatternSlot::NotExistsHeader {
            child_start,
            child_count,
        });
        self.flush_children();
        self.buf.flags.has_exists = true;
        self
    }

    /// Add a GRAPH clause over the given triple patterns.
    pub fn graph(mut self, graph: &str, triples: &[(&str, &str, &str)]) -> Self {
        let graph_term = self.push_term(graph);
        let (child_start, child_count) = self.push_header_children(triples);
        self.buf.slots.push(PatternSlot::GraphClause {
            graph: graph_term,
            child_start,
            child_count,
        });
        self.flush_children();
        self
    }

    fn flush_children(&mut self) {
        for pattern in std::mem::take(&mut self.pending_children) {
            self.buf.slots.push(PatternSlot::Triple {
                pattern,
                optional: false,
            });
        }
    }

    /// Add an inline VALUES constraint on one variable.
    pub fn values(mut self, var: &str, entries: &[&str]) -> Self {
        let var_term = self.push_term(var);
        let entry_start = self.buf.slots.len() + 1;
        let spans: Vec<Span> = entries.iter().map(|e| self.buf.source.push(e)).collect();
        self.buf.slots.push(PatternSlot::ValuesHeader {
            var: var_term,
            entry_start,
            entry_count: spans.len(),
        });
        for value in spans {
            self.buf.slots.push(PatternSlot::ValuesEntry { value });
        }
        self.buf.flags.has_values = true;
        self
    }

    /// Add a post-query VALUES grid (inner-join semantics).
    pub fn post_values(mut self, vars: &[&str], rows: &[&[Option<&str>]]) -> Self {
        let var_spans: Vec<Span> = vars.iter().map(|v| self.buf.source.push(v)).collect();
        let row_spans: Vec<Vec<Option<Span>>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map(|text| self.buf.source.push(text)))
                    .collect()
            })
            .collect();
        self.buf.post_values = Some(ValuesGrid {
            vars: var_spans,
            rows: row_spans,
        });
        self.buf.flags.has_post_values = true;
        self
    }

    /// Start the second UNION branch.
    pub fn union(mut self) -> Self {
        self.buf.flags.has_union = true;
        self.buf.flags.union_start_index = self.buf.slots.len();
        self.in_union_branch = true;
        self
    }

    /// Add a sub-select.
    pub fn sub_select(mut self, inner: QueryBuffer) -> Self {
        self.buf.slots.push(PatternSlot::SubSelect {
            query: Box::new(inner),
        });
        self
    }

    /// Add a SERVICE clause.
    pub fn service(mut self, endpoint: &str, pattern: &str, silent: bool) -> Self {
        let endpoint = self.push_term(endpoint);
        let pattern = self.buf.source.push(pattern);
        self.buf.services.push(ServiceClause {
            endpoint,
            pattern,
            silent,
        });
        self
    }

    /// Project a plain variable.
    pub fn select(mut self, var: &str) -> Self {
        let span = self.buf.source.push(var);
        self.buf.select.push(SelectItem::Variable(span));
        self
    }

    /// Project `(expr AS ?alias)` without aggregates.
    pub fn select_expr(mut self, expr: &str, alias: &str) -> Self {
        let expr = self.buf.source.push(expr);
        let alias = self.buf.source.push(alias);
        self.buf.select.push(SelectItem::Expression { expr, alias });
        self
    }

    /// Project an aggregate column.
    pub fn select_agg(
        mut self,
        function: AggregateFunction,
        distinct: bool,
        source: &str,
        alias: &str,
    ) -> Self {
        let source_var = self.buf.source.push(source);
        let alias = self.buf.source.push(alias);
        self.buf.aggregates.push(AggregateSpec {
            function,
            distinct,
            source_var,
            alias,
            separator: None,
            expr: None,
        });
        self.buf
            .select
            .push(SelectItem::Aggregate(self.buf.aggregates.len() - 1));
        self
    }

    /// Project a GROUP_CONCAT column with an explicit separator.
    pub fn select_group_concat(
        mut self,
        distinct: bool,
        source: &str,
        separator: &str,
        alias: &str,
    ) -> Self {
        let source_var = self.buf.source.push(source);
        let alias = self.buf.source.push(alias);
        let separator = Some(self.buf.source.push(separator));
        self.buf.aggregates.push(AggregateSpec {
            function: AggregateFunction::GroupConcat,
            distinct,
            source_var,
            alias,
            separator,
            expr: None,
        });
        self.buf
            .select
            .push(SelectItem::Aggregate(self.buf.aggregates.len() - 1));
        self
    }

    /// Project an expression that embeds aggregate calls.
    pub fn select_agg_expr(mut self, expr: &str, alias: &str) -> Self {
        let expr_span = self.buf.source.push(expr);
        let alias = self.buf.source.push(alias);
        self.buf.aggregates.push(AggregateSpec {
            function: AggregateFunction::None,
            distinct: false,
            source_var: Span::EMPTY,
            alias,
            separator: None,
            expr: Some(expr_span),
        });
        self.buf
            .select
            .push(SelectItem::Aggregate(self.buf.aggregates.len() - 1));
        self
    }

    /// Add a GROUP BY key.
    pub fn group_by(mut self, expr: &str) -> Self {
        let span = self.buf.source.push(expr);
        self.buf.group_by.push(GroupKey {
            expr: span,
            alias: None,
        });
        self
    }

    /// Add a GROUP BY key with an alias (`GROUP BY (expr AS ?alias)`).
    pub fn group_by_as(mut self, expr: &str, alias: &str) -> Self {
        let span = self.buf.source.push(expr);
        let alias = Some(self.buf.source.push(alias));
        self.buf.group_by.push(GroupKey { expr: span, alias });
        self
    }

    /// Set the HAVING constraint.
    pub fn having(mut self, expr: &str) -> Self {
        self.buf.having = Some(self.buf.source.push(expr));
        self
    }

    /// Add an ascending ORDER BY condition.
    pub fn order_by(mut self, expr: &str) -> Self {
        let span = self.buf.source.push(expr);
        self.buf.order_by.push(OrderCondition {
            expr: span,
            ascending: true,
        });
        self
    }

    /// Add a descending ORDER BY condition.
    pub fn order_by_desc(mut self, expr: &str) -> Self {
        let span = self.buf.source.push(expr);
        self.buf.order_by.push(OrderCondition {
            expr: span,
            ascending: false,
        });
        self
    }

    /// Request DISTINCT results.
    pub fn distinct(mut self) -> Self {
        self.buf.distinct = true;
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: usize) -> Self {
        self.buf.limit = Some(n);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: usize) -> Self {
        self.buf.offset = n;
        self
    }

    /// Finish building.
    pub fn build(mut self) -> QueryBuffer {
        let mut mask = vec![false; self.buf.slots.len()];
        for slot in &self.buf.slots {
            let (start, count) = match slot {
                PatternSlot::ExistsHeader {
                    child_start,
                    child_count,
                }
                | PatternSlot::NotExistsHeader {
                    child_start,
                    child_count,
                } => (*child_start, *child_count),
                PatternSlot::GraphClause {
                    child_start,
                    child_count,
                    ..
                } => (*child_start, *child_count),
                PatternSlot::ValuesHeader {
                    entry_start,
                    entry_count,
                    ..
                } => (*entry_start, *entry_count),
                _ => continue,
            };
            for flag in mask.iter_mut().skip(start).take(count) {
                *flag = true;
            }
        }
        self.buf.child_mask = mask;
        self.buf
    }
}
