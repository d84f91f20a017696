//! Property-path expansion
//!
//! Transitive and composite paths (`*`, `+`, sequences, alternatives,
//! negated sets, grouped forms) expand into an ordered list of
//! `(subject, object)` result pairs which the owning scan then streams
//! with the usual join checks. Transitive closures run an explicit BFS
//! with a visited set, never recursion, and poll cancellation at each
//! frontier node. Simple `*`/`+` keep multiset discovery order; grouped
//! paths compute endpoint sets.

use super::{GraphSel, Resolved};
use crate::cancel::CancellationToken;
use crate::query::{PathKind, QueryBuffer};
use crate::EngineError;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use storage::QuadSource;

/// A deferred path expansion captured at scan construction.
#[derive(Debug)]
pub(crate) struct PathJob {
    pub(crate) kind: PathKind,
    pub(crate) first: String,
    pub(crate) second: String,
}

/// One evaluation step of a path: follow a predicate forward or inverted.
#[derive(Debug, Clone)]
enum Step {
    Forward(String),
    Inverse(String),
}

fn parse_step(query: &QueryBuffer, text: &str) -> Step {
    let text = text.trim();
    match text.strip_prefix('^') {
        Some(rest) => Step::Inverse(query.expand(rest.trim())),
        None => Step::Forward(query.expand(text)),
    }
}

fn seq_steps(query: &QueryBuffer, text: &str) -> Vec<Step> {
    split_top(text, b'/')
        .into_iter()
        .map(|part| parse_step(query, part))
        .collect()
}

fn inverted(steps: &[Step]) -> Vec<Step> {
    steps
        .iter()
        .rev()
        .map(|step| match step {
            Step::Forward(p) => Step::Inverse(p.clone()),
            Step::Inverse(p) => Step::Forward(p.clone()),
        })
        .collect()
}

/// Split at a top-level separator, skipping `(...)` groups and `<...>`
/// IRIs.
fn split_top(text: &str, sep: u8) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0u32;
    let mut in_iri = false;
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'<' => in_iri = true,
            b'>' if in_iri => in_iri = false,
            b'(' if !in_iri => depth += 1,
            b')' if !in_iri => depth = depth.saturating_sub(1),
            _ if b == sep && depth == 0 && !in_iri => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

/// Expand a composite path into its ordered result pairs.
pub(crate) fn expand_path<S: QuadSource + ?Sized>(
    store: &S,
    query: &QueryBuffer,
    job: &PathJob,
    subject: &Resolved,
    object: &Resolved,
    graph: &GraphSel,
    cancel: &CancellationToken,
) -> Result<Vec<(String, String)>, EngineError> {
    match job.kind {
        PathKind::ZeroOrMore => {
            let steps = vec![parse_step(query, &job.first)];
            closure_pairs(store, graph, &steps, true, false, subject, object, cancel)
        }
        PathKind::OneOrMore => {
            let steps = vec![parse_step(query, &job.first)];
            closure_pairs(store, graph, &steps, false, false, subject, object, cancel)
        }
        PathKind::GroupedZeroOrMore => {
            let steps = seq_steps(query, &job.first);
            closure_pairs(store, graph, &steps, true, true, subject, object, cancel)
        }
        PathKind::GroupedOneOrMore => {
            let steps = seq_steps(query, &job.first);
            closure_pairs(store, graph, &steps, false, true, subject, object, cancel)
        }
        PathKind::Sequence => {
            let mut steps = vec![parse_step(query, &job.first)];
            steps.extend(seq_steps(query, &job.second));
            seq_pairs(store, graph, &steps, subject, object, false, cancel)
        }
        PathKind::InverseGroup => {
            let steps = inverted(&seq_steps(query, &job.first));
            seq_pairs(store, graph, &steps, subject, object, true, cancel)
        }
        PathKind::GroupedZeroOrOne => {
            let steps = seq_steps(query, &job.first);
            let mut pairs = seq_pairs(store, graph, &steps, subject, object, true, cancel)?;
            let anchors: Vec<String> = match (subject.constraint(), object.constraint()) {
                (Some(s), _) => vec![s.to_owned()],
                (None, Some(o)) => vec![o.to_owned()],
                (None, None) => node_set(store, graph),
            };
            for node in anchors {
                if !pairs.iter().any(|(s, o)| *s == node && *o == node) {
                    pairs.push((node.clone(), node));
                }
            }
            Ok(pairs)
        }
        PathKind::Alternative => {
            let mut pairs = Vec::new();
            for alt in split_top(&job.first, b'|') {
                cancel.check()?;
                let parts = split_top(alt, b'/');
                if parts.len() > 1 {
                    let steps: Vec<Step> =
                        parts.into_iter().map(|p| parse_step(query, p)).collect();
                    pairs.extend(seq_pairs(store, graph, &steps, subject, object, false, cancel)?);
                } else {
                    pairs.extend(direct_pairs(store, graph, &parse_step(query, alt), subject, object));
                }
            }
            Ok(pairs)
        }
        PathKind::NegatedSet => Ok(negated_pairs(store, query, graph, &job.first, subject, object)),
        PathKind::ZeroOrOne => {
            // Both ends unbound (bound anchors stream in the scan).
            let step = parse_step(query, &job.first);
            let mut pairs: Vec<(String, String)> =
                node_set(store, graph).into_iter().map(|n| (n.clone(), n)).collect();
            for (s, o) in direct_pairs(store, graph, &step, subject, object) {
                if s != o {
                    pairs.push((s, o));
                }
            }
            Ok(pairs)
        }
        PathKind::None | PathKind::Inverse => {
            Ok(direct_pairs(store, graph, &parse_step(query, &job.first), subject, object))
        }
    }
}

/// Endpoints reachable from `node` through one step.
fn step_targets<S: QuadSource + ?Sized>(
    store: &S,
    graph: &GraphSel,
    node: &str,
    step: &Step,
) -> Vec<String> {
    match step {
        Step::Forward(p) => store
            .query(node, p, "", graph.store_key())
            .filter(|t| graph.admits(t.graph))
            .map(|t| t.object.to_owned())
            .collect(),
        Step::Inverse(p) => store
            .query("", p, node, graph.store_key())
            .filter(|t| graph.admits(t.graph))
            .map(|t| t.subject.to_owned())
            .collect(),
    }
}

/// Fold a step list from one start node: each step maps the current node
/// multiset through its targets. `dedupe` collapses each stage to a set
/// (grouped-path semantics).
fn fold_steps<S: QuadSource + ?Sized>(
    store: &S,
    graph: &GraphSel,
    start: &str,
    steps: &[Step],
    dedupe: bool,
    cancel: &CancellationToken,
) -> Result<Vec<String>, EngineError> {
    let mut current = vec![start.to_owned()];
    for step in steps {
        cancel.check()?;
        let mut next = Vec::new();
        for node in &current {
            next.extend(step_targets(store, graph, node, step));
        }
        if dedupe {
            let mut seen = FxHashSet::default();
            next.retain(|n| seen.insert(n.clone()));
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    Ok(current)
}

/// Sequence evaluation anchored on whichever end is bound.
fn seq_pairs<S: QuadSource + ?Sized>(
    store: &S,
    graph: &GraphSel,
    steps: &[Step],
    subject: &Resolved,
    object: &Resolved,
    dedupe: bool,
    cancel: &CancellationToken,
) -> Result<Vec<(String, String)>, EngineError> {
    if steps.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(s) = subject.constraint() {
        let ends = fold_steps(store, graph, s, steps, dedupe, cancel)?;
        return Ok(ends.into_iter().map(|o| (s.to_owned(), o)).collect());
    }
    if let Some(o) = object.constraint() {
        let back = inverted(steps);
        let starts = fold_steps(store, graph, o, &back, dedupe, cancel)?;
        return Ok(starts.into_iter().map(|s| (s, o.to_owned())).collect());
    }

    let mut pairs = Vec::new();
    let rest = &steps[1..];
    let edges: Vec<(String, String)> = match &steps[0] {
        Step::Forward(p) => store
            .query("", p, "", graph.store_key())
            .filter(|t| graph.admits(t.graph))
            .map(|t| (t.subject.to_owned(), t.object.to_owned()))
            .collect(),
        Step::Inverse(p) => store
            .query("", p, "", graph.store_key())
            .filter(|t| graph.admits(t.graph))
            .map(|t| (t.object.to_owned(), t.subject.to_owned()))
            .collect(),
    };
    for (s, mid) in edges {
        cancel.check()?;
        if rest.is_empty() {
            pairs.push((s, mid));
        } else {
            for end in fold_steps(store, graph, &mid, rest, dedupe, cancel)? {
                pairs.push((s.clone(), end));
            }
        }
    }
    if dedupe {
        let mut seen = FxHashSet::default();
        pairs.retain(|p| seen.insert(p.clone()));
    }
    Ok(pairs)
}

/// BFS transitive closure from every relevant start node.
#[allow(clippy::too_many_arguments)]
fn closure_pairs<S: QuadSource + ?Sized>(
    store: &S,
    graph: &GraphSel,
    steps: &[Step],
    include_reflexive: bool,
    dedupe_steps: bool,
    subject: &Resolved,
    object: &Resolved,
    cancel: &CancellationToken,
) -> Result<Vec<(String, String)>, EngineError> {
    match (subject.constraint(), object.constraint()) {
        (Some(s), _) => bfs_from(
            store, graph, s, steps, dedupe_steps, include_reflexive, false, cancel,
        ),
        (None, Some(o)) => {
            let back = inverted(steps);
            let reached = bfs_from(
                store, graph, o, &back, dedupe_steps, include_reflexive, false, cancel,
            )?;
            Ok(reached.into_iter().map(|(_, n)| (n, o.to_owned())).collect())
        }
        (None, None) => {
            let mut pairs = Vec::new();
            if include_reflexive {
                // `p*` with both ends open relates the full node set of
                // the graph to itself.
                for node in node_set(store, graph) {
                    pairs.push((node.clone(), node));
                }
            }
            for start in start_nodes(store, graph, &steps[0]) {
                cancel.check()?;
                pairs.extend(bfs_from(
                    store,
                    graph,
                    &start,
                    steps,
                    dedupe_steps,
                    false,
                    include_reflexive,
                    cancel,
                )?);
            }
            Ok(pairs)
        }
    }
}

/// Breadth-first discovery of every node reachable from `start`.
///
/// Each reachable endpoint is emitted once; `skip_self` suppresses the
/// `(start, start)` pair when a reflexive set was already emitted by the
/// caller.
#[allow(clippy::too_many_arguments)]
fn bfs_from<S: QuadSource + ?Sized>(
    store: &S,
    graph: &GraphSel,
    start: &str,
    steps: &[Step],
    dedupe_steps: bool,
    include_reflexive: bool,
    skip_self: bool,
    cancel: &CancellationToken,
) -> Result<Vec<(String, String)>, EngineError> {
    let mut pairs = Vec::new();
    let mut reached: FxHashSet<String> = FxHashSet::default();
    let mut expanded: FxHashSet<String> = FxHashSet::default();
    let mut queue: VecDeque<String> = VecDeque::new();

    if include_reflexive {
        pairs.push((start.to_owned(), start.to_owned()));
        reached.insert(start.to_owned());
    }
    queue.push_back(start.to_owned());
    expanded.insert(start.to_owned());

    while let Some(node) = queue.pop_front() {
        cancel.check()?;
        for target in fold_steps(store, graph, &node, steps, dedupe_steps, cancel)? {
            if reached.insert(target.clone()) && !(skip_self && target == start) {
                pairs.push((start.to_owned(), target.clone()));
            }
            if expanded.insert(target.clone()) {
                queue.push_back(target);
            }
        }
    }
    Ok(pairs)
}

/// Every subject or object of any triple visible under the graph
/// constraint, in first-seen order.
fn node_set<S: QuadSource + ?Sized>(store: &S, graph: &GraphSel) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut nodes = Vec::new();
    for t in store.query("", "", "", graph.store_key()) {
        if !graph.admits(t.graph) {
            continue;
        }
        for value in [t.subject, t.object] {
            if seen.insert(value.to_owned()) {
                nodes.push(value.to_owned());
            }
        }
    }
    nodes
}

/// Starting nodes for a both-ends-open closure: the source side of every
/// edge of the first step.
fn start_nodes<S: QuadSource + ?Sized>(store: &S, graph: &GraphSel, first: &Step) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut nodes = Vec::new();
    let predicate = match first {
        Step::Forward(p) | Step::Inverse(p) => p.as_str(),
    };
    for t in store.query("", predicate, "", graph.store_key()) {
        if !graph.admits(t.graph) {
            continue;
        }
        let node = match first {
            Step::Forward(_) => t.subject,
            Step::Inverse(_) => t.object,
        };
        if seen.insert(node.to_owned()) {
            nodes.push(node.to_owned());
        }
    }
    nodes
}

/// One direct (non-composite) step with both constraints pushed down.
fn direct_pairs<S: QuadSource + ?Sized>(
    store: &S,
    graph: &GraphSel,
    step: &Step,
    subject: &Resolved,
    object: &Resolved,
) -> Vec<(String, String)> {
    match step {
        Step::Forward(p) => store
            .query(subject.store_key(), p, object.store_key(), graph.store_key())
            .filter(|t| graph.admits(t.graph))
            .map(|t| (t.subject.to_owned(), t.object.to_owned()))
            .collect(),
        Step::Inverse(p) => store
            .query(object.store_key(), p, subject.store_key(), graph.store_key())
            .filter(|t| graph.admits(t.graph))
            .map(|t| (t.object.to_owned(), t.subject.to_owned()))
            .collect(),
    }
}

/// Negated property set: forward quads outside the direct set, then
/// swapped quads outside the inverse set.
fn negated_pairs<S: QuadSource + ?Sized>(
    store: &S,
    query: &QueryBuffer,
    graph: &GraphSel,
    members: &str,
    subject: &Resolved,
    object: &Resolved,
) -> Vec<(String, String)> {
    let mut direct = Vec::new();
    let mut inverse = Vec::new();
    for member in split_top(members, b'|') {
        match member.trim().strip_prefix('^') {
            Some(rest) => inverse.push(query.expand(rest.trim())),
            None => direct.push(query.expand(member.trim())),
        }
    }

    let mut pairs = Vec::new();
    if !direct.is_empty() {
        for t in store.query(subject.store_key(), "", object.store_key(), graph.store_key()) {
            if !graph.admits(t.graph) {
                continue;
            }
            if !direct.iter().any(|p| p == t.predicate) {
                pairs.push((t.subject.to_owned(), t.object.to_owned()));
            }
        }
    }
    if !inverse.is_empty() {
        for t in store.query(object.store_key(), "", subject.store_key(), graph.store_key()) {
            if !graph.admits(t.graph) {
                continue;
            }
            if !inverse.iter().any(|p| p == t.predicate) {
                pairs.push((t.object.to_owned(), t.subject.to_owned()));
            }
        }
    }
    pairs
}
