//! Triple-pattern scan
//!
//! Lazy iterator over one triple pattern, property paths included. Term
//! resolution happens at construction: bound variables become store
//! constraints copied into the scan, unbound variables become bind
//! targets. Every `move_next` entry first truncates the binding table to
//! the count recorded at construction, so a `false` return always leaves
//! the table exactly as it was.

use super::path::{self, PathJob};
use super::{bind_component, bind_pair, resolve_graph, resolve_term, GraphSel, Resolved};
use crate::bindings::BindingTable;
use crate::cancel::CancellationToken;
use crate::query::{PathKind, QueryBuffer, Term, TriplePattern};
use crate::EngineError;
use storage::{QuadIter, QuadSource};

enum ScanState<'a> {
    /// Plain or inverse predicate streaming straight off the store.
    Simple {
        iter: QuadIter<'a>,
        swap: bool,
    },
    /// `p?` with at least one bound end: stream matches, then one
    /// reflexive result.
    ZeroOrOne {
        iter: QuadIter<'a>,
        reflexive_done: bool,
    },
    /// Transitive or composite path, expanded on first advance.
    Pending(PathJob),
    /// Expanded path results streaming out.
    Buffered {
        pairs: std::vec::IntoIter<(String, String)>,
    },
}

/// Scan over a single triple pattern.
pub(crate) struct SingleScan<'a, S: QuadSource + ?Sized> {
    store: &'a S,
    query: &'a QueryBuffer,
    initial_count: usize,
    subject: Resolved,
    predicate: Resolved,
    object: Resolved,
    graph: GraphSel,
    cancel: CancellationToken,
    state: ScanState<'a>,
}

impl<'a, S: QuadSource + ?Sized> SingleScan<'a, S> {
    pub(crate) fn new(
        store: &'a S,
        query: &'a QueryBuffer,
        pattern: &TriplePattern,
        graph_term: Option<&Term>,
        bindings: &BindingTable,
        cancel: CancellationToken,
    ) -> Self {
        let subject = resolve_term(query, &pattern.subject, bindings);
        let object = resolve_term(query, &pattern.object, bindings);
        let graph = resolve_graph(query, graph_term, bindings);
        let initial_count = bindings.count();

        let (predicate, state) = match pattern.path.kind {
            PathKind::None => {
                let predicate = resolve_term(query, &pattern.predicate, bindings);
                let iter = store.query(
                    subject.store_key(),
                    predicate.store_key(),
                    object.store_key(),
                    graph.store_key(),
                );
                (predicate, ScanState::Simple { iter, swap: false })
            }
            PathKind::Inverse => {
                let pred = query.expand(query.source.resolve(pattern.path.first));
                let iter = store.query(
                    object.store_key(),
                    &pred,
                    subject.store_key(),
                    graph.store_key(),
                );
                (Resolved::Wildcard, ScanState::Simple { iter, swap: true })
            }
            PathKind::ZeroOrOne
                if subject.constraint().is_some() || object.constraint().is_some() =>
            {
                let pred = query.expand(query.source.resolve(pattern.path.first));
                let iter = store.query(
                    subject.store_key(),
                    &pred,
                    object.store_key(),
                    graph.store_key(),
                );
                (
                    Resolved::Wildcard,
                    ScanState::ZeroOrOne {
                        iter,
                        reflexive_done: false,
                    },
                )
            }
            kind => {
                let job = PathJob {
                    kind,
                    first: query.source.resolve(pattern.path.first).to_owned(),
                    second: if pattern.path.second.is_empty() {
                        String::new()
                    } else {
                        query.source.resolve(pattern.path.second).to_owned()
                    },
                };
                (Resolved::Wildcard, ScanState::Pending(job))
            }
        };

        Self {
            store,
            query,
            initial_count,
            subject,
            predicate,
            object,
            graph,
            cancel,
            state,
        }
    }

    /// Advance to the next match.
    pub(crate) fn move_next(
        &mut self,
        bindings: &mut BindingTable,
    ) -> Result<bool, EngineError> {
        bindings.truncate_to(self.initial_count);

        if matches!(self.state, ScanState::Pending(_)) {
            let state = std::mem::replace(
                &mut self.state,
                ScanState::Buffered {
                    pairs: Vec::new().into_iter(),
                },
            );
            if let ScanState::Pending(job) = state {
                let pairs = path::expand_path(
                    self.store,
                    self.query,
                    &job,
                    &self.subject,
                    &self.object,
                    &self.graph,
                    &self.cancel,
                )?;
                self.state = ScanState::Buffered {
                    pairs: pairs.into_iter(),
                };
            }
        }

        loop {
            self.cancel.check()?;
            match &mut self.state {
                ScanState::Simple { iter, swap } => {
                    let Some(t) = iter.next() else {
                        return Ok(false);
                    };
                    let (s_val, o_val) = if *swap {
                        (t.object, t.subject)
                    } else {
                        (t.subject, t.object)
                    };
                    if !self.graph.admits(t.graph) {
                        continue;
                    }
                    let mut hit = bind_component(bindings, &self.subject, s_val)?;
                    if hit {
                        hit = bind_component(bindings, &self.predicate, t.predicate)?;
                    }
                    if hit {
                        hit = bind_component(bindings, &self.object, o_val)?;
                    }
                    if hit {
                        hit = bind_graph(bindings, &self.graph, t.graph)?;
                    }
                    if hit {
                        return Ok(true);
                    }
                    bindings.truncate_to(self.initial_count);
                }
                ScanState::ZeroOrOne {
                    iter,
                    reflexive_done,
                } => {
                    if let Some(t) = iter.next() {
                        if !self.graph.admits(t.graph) {
                            continue;
                        }
                        if bind_pair(bindings, &self.subject, &self.object, t.subject, t.object)? {
                            return Ok(true);
                        }
                        bindings.truncate_to(self.initial_count);
                        continue;
                    }
                    if *reflexive_done {
                        return Ok(false);
                    }
                    *reflexive_done = true;
                    let anchor = self
                        .subject
                        .constraint()
                        .or_else(|| self.object.constraint())
                        .map(str::to_owned);
                    if let Some(node) = anchor {
                        if bind_pair(bindings, &self.subject, &self.object, &node, &node)? {
                            return Ok(true);
                        }
                        bindings.truncate_to(self.initial_count);
                    }
                }
                ScanState::Buffered { pairs } => {
                    let Some((s_val, o_val)) = pairs.next() else {
                        return Ok(false);
                    };
                    if bind_pair(bindings, &self.subject, &self.object, &s_val, &o_val)? {
                        return Ok(true);
                    }
                    bindings.truncate_to(self.initial_count);
                }
                ScanState::Pending(_) => unreachable!("path job expanded above"),
            }
        }
    }
}

/// Bind the graph variable of a `GRAPH ?g` context from a matching quad.
fn bind_graph(
    bindings: &mut BindingTable,
    graph: &GraphSel,
    value: &str,
) -> Result<bool, EngineError> {
    if let GraphSel::Bind { name } = graph {
        return match bindings.find(name) {
            Some(i) => Ok(bindings.get(i) == value),
            None => {
                bindings.bind(name, value)?;
                Ok(true)
            }
        };
    }
    Ok(true)
}
