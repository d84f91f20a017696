//! Pattern scan operators
//!
//! Lazy, pull-based iterators over triple patterns. Every scan follows
//! one contract: `move_next(&mut bindings)` extends the table with at
//! most one value per variable in the pattern and returns `true`, or
//! rolls back everything it added since construction and returns `false`.
//! Backtracking is exclusively via `truncate_to`; scans never `clear` the
//! table.

mod multi;
mod path;
mod single;
mod variants;

pub(crate) use multi::{MultiScan, PlannedPattern};
pub(crate) use single::SingleScan;
pub(crate) use variants::{apply_service_row, ServicePatternScan, SubqueryScan};

use crate::bindings::{hash_name, BindingTable};
use crate::query::{var_name, QueryBuffer, Term, TermKind};
use crate::EngineError;

/// One pattern position after resolving variables and prefixes against
/// the current bindings.
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    /// Exact-match constraint pushed into the store query.
    Constraint(String),
    /// Unbound variable to bind from each matching quad.
    Bind {
        /// Variable name without its sigil.
        name: String,
        /// Precomputed name hash.
        hash: u32,
    },
    /// Anonymous blank node: matches anything, binds nothing.
    Wildcard,
}

impl Resolved {
    /// The constraint to pass to the store (`""` = wildcard).
    pub(crate) fn store_key(&self) -> &str {
        match self {
            Resolved::Constraint(c) => c,
            _ => "",
        }
    }

    /// The exact constraint, when this position carries one.
    pub(crate) fn constraint(&self) -> Option<&str> {
        match self {
            Resolved::Constraint(c) => Some(c),
            _ => None,
        }
    }
}

/// Resolve a term: bound variables become their value, unbound variables
/// become bind targets, constants become canonical store text.
pub(crate) fn resolve_term(
    query: &QueryBuffer,
    term: &Term,
    bindings: &BindingTable,
) -> Resolved {
    let text = query.term_text(term);
    match term.kind {
        TermKind::Variable => {
            let name = var_name(text);
            match bindings.find(name) {
                Some(i) => Resolved::Constraint(bindings.get(i).to_owned()),
                None => Resolved::Bind {
                    name: name.to_owned(),
                    hash: hash_name(name),
                },
            }
        }
        TermKind::BlankNode => {
            if text == "[]" {
                Resolved::Wildcard
            } else {
                Resolved::Constraint(text.to_owned())
            }
        }
        _ => Resolved::Constraint(query.expand(text)),
    }
}

/// Graph constraint for one scan.
#[derive(Debug, Clone)]
pub(crate) enum GraphSel {
    /// Any graph.
    Any,
    /// One exact graph, pushed into the store query.
    Exact(String),
    /// A FROM set iterated as though one graph.
    OneOf(Vec<String>),
    /// Unbound graph variable, bound per matching quad.
    Bind {
        /// Variable name without its sigil.
        name: String,
    },
}

impl GraphSel {
    pub(crate) fn store_key(&self) -> &str {
        match self {
            GraphSel::Exact(g) => g,
            _ => "",
        }
    }

    /// Whether a quad's graph satisfies this constraint. A graph
    /// variable only matches named graphs.
    pub(crate) fn admits(&self, graph: &str) -> bool {
        match self {
            GraphSel::Any => true,
            GraphSel::Exact(g) => g == graph,
            GraphSel::OneOf(set) => set.iter().any(|g| g == graph),
            GraphSel::Bind { .. } => !graph.is_empty(),
        }
    }
}

/// Resolve the graph context of a pattern: an explicit GRAPH term wins,
/// then the query's FROM set, then any graph.
pub(crate) fn resolve_graph(
    query: &QueryBuffer,
    graph_term: Option<&Term>,
    bindings: &BindingTable,
) -> GraphSel {
    if let Some(term) = graph_term {
        let text = query.term_text(term);
        if term.kind == TermKind::Variable {
            let name = var_name(text);
            return match bindings.find(name) {
                Some(i) => GraphSel::Exact(bindings.get(i).to_owned()),
                None => GraphSel::Bind {
                    name: name.to_owned(),
                },
            };
        }
        return GraphSel::Exact(query.expand(text));
    }
    if !query.from_graphs.is_empty() {
        let set = query
            .from_graphs
            .iter()
            .map(|span| query.expand(query.source.resolve(*span)))
            .collect();
        return GraphSel::OneOf(set);
    }
    GraphSel::Any
}

/// Bind one pattern position against an observed value.
///
/// Already-bound variables (including a second occurrence inside the same
/// pattern) accept the value only when it equals the existing binding.
pub(crate) fn bind_component(
    bindings: &mut BindingTable,
    resolved: &Resolved,
    value: &str,
) -> Result<bool, EngineError> {
    match resolved {
        Resolved::Wildcard => Ok(true),
        Resolved::Constraint(c) => Ok(c == value),
        Resolved::Bind { name, .. } => match bindings.find(name) {
            Some(i) => Ok(bindings.get(i) == value),
            None => {
                bindings.bind(name, value)?;
                Ok(true)
            }
        },
    }
}

/// Bind a `(subject, object)` result pair, without graph handling.
pub(crate) fn bind_pair(
    bindings: &mut BindingTable,
    subject: &Resolved,
    object: &Resolved,
    s_val: &str,
    o_val: &str,
) -> Result<bool, EngineError> {
    if !bind_component(bindings, subject, s_val)? {
        return Ok(false);
    }
    bind_component(bindings, object, o_val)
}
