//! Heuristic pattern ordering
//!
//! Greedy reordering of the required patterns: at each step pick, among
//! the patterns that can execute (at least one position bound or
//! constant), the one with the smallest estimated cardinality, then mark
//! its variables bound. Per-predicate statistics refine the estimate when
//! a statistics source knows the predicate; otherwise a fixed table keyed
//! on the number of bound positions applies, scaled by a path-kind
//! factor.

use crate::query::{PathKind, QueryBuffer, Term, TermKind, TriplePattern};
use crate::scan::PlannedPattern;
use rustc_hash::FxHashSet;
use storage::StatsSource;
use tracing::debug;

/// Cardinality guesses by number of bound positions (3, 2, 1, 0).
const BOUND_ESTIMATES: [f64; 4] = [1.0, 100.0, 1_000.0, 10_000.0];

fn path_factor(kind: PathKind) -> f64 {
    match kind {
        PathKind::ZeroOrMore | PathKind::GroupedZeroOrMore => 100.0,
        PathKind::OneOrMore | PathKind::GroupedOneOrMore => 50.0,
        PathKind::Sequence | PathKind::InverseGroup => 10.0,
        PathKind::Alternative => 2.0,
        _ => 1.0,
    }
}

fn term_is_bound(query: &QueryBuffer, term: &Term, bound: &FxHashSet<String>) -> bool {
    match term.kind {
        TermKind::Variable => {
            bound.contains(crate::query::var_name(query.term_text(term)))
        }
        _ => true,
    }
}

fn collect_vars(query: &QueryBuffer, pattern: &TriplePattern, bound: &mut FxHashSet<String>) {
    for term in [&pattern.subject, &pattern.predicate, &pattern.object] {
        if term.kind == TermKind::Variable {
            bound.insert(crate::query::var_name(query.term_text(term)).to_owned());
        }
    }
}

fn estimate(
    query: &QueryBuffer,
    pattern: &TriplePattern,
    bound: &FxHashSet<String>,
    stats: Option<&dyn StatsSource>,
) -> f64 {
    let s_bound = term_is_bound(query, &pattern.subject, bound);
    let p_bound = term_is_bound(query, &pattern.predicate, bound);
    let o_bound = term_is_bound(query, &pattern.object, bound);

    let factor = path_factor(pattern.path.kind);

    // Statistics apply only to a concrete, path-free predicate.
    if pattern.path.kind == PathKind::None && pattern.predicate.kind != TermKind::Variable {
        if let Some(stats) = stats {
            let predicate = query.expand(query.term_text(&pattern.predicate));
            if let Some(ps) = stats.predicate_stats(&predicate) {
                let base = match (s_bound, o_bound) {
                    (true, true) => 1.0,
                    (true, false) => ps.avg_objects_per_subject,
                    (false, true) => ps.avg_subjects_per_object,
                    (false, false) => ps.triple_count as f64,
                };
                return base * factor;
            }
        }
    }

    let bound_count =
        usize::from(s_bound) + usize::from(p_bound) + usize::from(o_bound);
    BOUND_ESTIMATES[3 - bound_count] * factor
}

/// Order the required patterns for nested-loop execution.
pub(crate) fn order_patterns(
    query: &QueryBuffer,
    patterns: Vec<PlannedPattern>,
    stats: Option<&dyn StatsSource>,
) -> Vec<PlannedPattern> {
    if patterns.len() <= 1 {
        return patterns;
    }

    let mut bound: FxHashSet<String> = FxHashSet::default();
    let mut remaining: Vec<Option<PlannedPattern>> = patterns.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    while ordered.len() < remaining.len() {
        let mut best: Option<(usize, f64)> = None;
        let mut best_executable: Option<(usize, f64)> = None;

        for (i, slot) in remaining.iter().enumerate() {
            let Some(planned) = slot else { continue };
            let pattern = &planned.pattern;
            let cost = estimate(query, pattern, &bound, stats);
            let executable = term_is_bound(query, &pattern.subject, &bound)
                || term_is_bound(query, &pattern.predicate, &bound)
                || term_is_bound(query, &pattern.object, &bound);

            if executable && best_executable.map_or(true, |(_, c)| cost < c) {
                best_executable = Some((i, cost));
            }
            if best.map_or(true, |(_, c)| cost < c) {
                best = Some((i, cost));
            }
        }

        // Patterns over only unbound variables stay eligible as a
        // fallback full scan.
        let Some((index, cost)) = best_executable.or(best) else {
            break;
        };
        let planned = remaining[index].take().expect("pattern selected twice");
        collect_vars(query, &planned.pattern, &mut bound);
        debug!(index, cost, "planner picked pattern");
        ordered.push(planned);
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{PatternSlot, QueryBuilder};
    use storage::{MemoryQuadStore, PredicateStats};

    fn planned_of(query: &QueryBuffer) -> Vec<PlannedPattern> {
        query
            .slots()
            .iter()
            .filter_map(|slot| match slot {
                PatternSlot::Triple { pattern, .. } => Some(PlannedPattern {
                    pattern: *pattern,
                    graph: None,
                }),
                _ => None,
            })
            .collect()
    }

    fn subject_texts(query: &QueryBuffer, ordered: &[PlannedPattern]) -> Vec<String> {
        ordered
            .iter()
            .map(|p| query.term_text(&p.pattern.subject).to_owned())
            .collect()
    }

    #[test]
    fn test_most_bound_pattern_goes_first() {
        let query = QueryBuilder::new()
            .triple("?s", "?p", "?o")
            .triple("<urn:a>", "<urn:p>", "?o")
            .build();
        let ordered = order_patterns(&query, planned_of(&query), None);
        assert_eq!(subject_texts(&query, &ordered), vec!["<urn:a>", "?s"]);
    }

    #[test]
    fn test_dependency_chain_respected() {
        // ?y is only bound after the first pattern runs.
        let query = QueryBuilder::new()
            .triple("?x", "<urn:p>", "?y")
            .triple("<urn:a>", "<urn:q>", "?x")
            .build();
        let ordered = order_patterns(&query, planned_of(&query), None);
        assert_eq!(subject_texts(&query, &ordered), vec!["<urn:a>", "?x"]);
    }

    #[test]
    fn test_path_patterns_are_penalized() {
        let query = QueryBuilder::new()
            .triple("<urn:a>", "<urn:p>*", "?x")
            .triple("<urn:a>", "<urn:q>", "?x")
            .build();
        let ordered = order_patterns(&query, planned_of(&query), None);
        // Same boundedness, but the transitive path costs 100x.
        assert_eq!(
            query.term_text(&ordered[0].pattern.predicate),
            "<urn:q>"
        );
    }

    #[test]
    fn test_statistics_override_heuristic() {
        let mut store = MemoryQuadStore::new();
        // <urn:rare> has one triple; <urn:common> has many.
        store.insert_triple("<urn:a>", "<urn:rare>", "<urn:b>");
        for i in 0..50 {
            store.insert_triple(format!("<urn:s{}>", i), "<urn:common>", "<urn:o>");
        }
        let stats = store.predicate_stats("<urn:rare>").unwrap();
        assert_eq!(stats.triple_count, 1);

        let query = QueryBuilder::new()
            .triple("?x", "<urn:common>", "?y")
            .triple("?x", "<urn:rare>", "?z")
            .build();
        let ordered = order_patterns(&query, planned_of(&query), Some(&store));
        assert_eq!(
            query.term_text(&ordered[0].pattern.predicate),
            "<urn:rare>"
        );
    }

    #[test]
    fn test_stats_cardinality_levels() {
        let mut store = MemoryQuadStore::new();
        store.insert_triple("<urn:a>", "<urn:p>", "<urn:b>");
        store.insert_triple("<urn:a>", "<urn:p>", "<urn:c>");
        let ps: PredicateStats = store.predicate_stats("<urn:p>").unwrap();
        assert_eq!(ps.triple_count, 2);
        assert!((ps.avg_objects_per_subject - 2.0).abs() < f64::EPSILON);
    }
}
