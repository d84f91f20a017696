//! Nested-loop join across multiple triple patterns
//!
//! One scan level per pattern, in planner order. Each level records the
//! binding count on entry; exhausting a level pops it and truncates the
//! table back to that mark. The table is never cleared between
//! iterations: clearing would corrupt the arena high-water marks held by
//! parent frames.

use super::single::SingleScan;
use crate::bindings::BindingTable;
use crate::cancel::CancellationToken;
use crate::query::{QueryBuffer, Term, TriplePattern};
use crate::EngineError;
use storage::QuadSource;

/// One required pattern with its graph context, in planner order.
#[derive(Debug, Clone)]
pub(crate) struct PlannedPattern {
    /// The triple pattern.
    pub(crate) pattern: TriplePattern,
    /// GRAPH clause term, when the pattern sits inside one.
    pub(crate) graph: Option<Term>,
}

struct Level<'a, S: QuadSource + ?Sized> {
    scan: SingleScan<'a, S>,
    entry_count: usize,
}

/// Nested-loop join scan.
pub(crate) struct MultiScan<'a, S: QuadSource + ?Sized> {
    store: &'a S,
    query: &'a QueryBuffer,
    patterns: Vec<PlannedPattern>,
    levels: Vec<Level<'a, S>>,
    started: bool,
    exhausted: bool,
    cancel: CancellationToken,
}

impl<'a, S: QuadSource + ?Sized> MultiScan<'a, S> {
    pub(crate) fn new(
        store: &'a S,
        query: &'a QueryBuffer,
        patterns: Vec<PlannedPattern>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            query,
            patterns,
            levels: Vec::new(),
            started: false,
            exhausted: false,
            cancel,
        }
    }

    fn push_level(&mut self, index: usize, bindings: &BindingTable) {
        let planned = &self.patterns[index];
        let scan = SingleScan::new(
            self.store,
            self.query,
            &planned.pattern,
            planned.graph.as_ref(),
            bindings,
            self.cancel.clone(),
        );
        self.levels.push(Level {
            scan,
            entry_count: bindings.count(),
        });
    }

    /// Advance to the next joined row.
    pub(crate) fn move_next(
        &mut self,
        bindings: &mut BindingTable,
    ) -> Result<bool, EngineError> {
        if self.exhausted {
            return Ok(false);
        }
        if !self.started {
            self.started = true;
            if self.patterns.is_empty() {
                self.exhausted = true;
                return Ok(false);
            }
            self.push_level(0, bindings);
        }

        loop {
            self.cancel.check()?;
            let depth = self.levels.len() - 1;
            let hit = self.levels[depth].scan.move_next(bindings)?;
            if hit {
                if depth + 1 == self.patterns.len() {
                    return Ok(true);
                }
                self.push_level(depth + 1, bindings);
            } else {
                let entry = self.levels[depth].entry_count;
                self.levels.pop();
                bindings.truncate_to(entry);
                if self.levels.is_empty() {
                    self.exhausted = true;
                    return Ok(false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{PatternSlot, QueryBuilder};
    use storage::MemoryQuadStore;

    fn planned(query: &QueryBuffer) -> Vec<PlannedPattern> {
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

    #[test]
    fn test_two_pattern_join() {
        let mut store = MemoryQuadStore::new();
        store.insert_triple("<urn:a>", "<urn:p>", "<urn:b>");
        store.insert_triple("<urn:b>", "<urn:p>", "<urn:c>");
        store.insert_triple("<urn:c>", "<urn:p>", "<urn:d>");

        let query = QueryBuilder::new()
            .triple("?x", "<urn:p>", "?y")
            .triple("?y", "<urn:p>", "?z")
            .build();

        let mut bindings = BindingTable::new();
        let mut scan = MultiScan::new(&store, &query, planned(&query), CancellationToken::new());

        let mut rows = Vec::new();
        while scan.move_next(&mut bindings).unwrap() {
            rows.push((
                bindings.value_of("x").unwrap().to_owned(),
                bindings.value_of("z").unwrap().to_owned(),
            ));
        }
        assert_eq!(
            rows,
            vec![
                ("<urn:a>".to_owned(), "<urn:c>".to_owned()),
                ("<urn:b>".to_owned(), "<urn:d>".to_owned()),
            ]
        );
        assert_eq!(bindings.count(), 0);
    }

    #[test]
    fn test_join_backtracks_via_truncation_only() {
        let mut store = MemoryQuadStore::new();
        store.insert_triple("<urn:a>", "<urn:p>", "<urn:b>");
        store.insert_triple("<urn:a>", "<urn:p>", "<urn:c>");
        store.insert_triple("<urn:b>", "<urn:q>", "<urn:k>");
        store.insert_triple("<urn:c>", "<urn:q>", "<urn:k>");

        let query = QueryBuilder::new()
            .triple("<urn:a>", "<urn:p>", "?m")
            .triple("?m", "<urn:q>", "?end")
            .build();

        let mut bindings = BindingTable::new();
        bindings.bind("outer", "anchor").unwrap();
        let outer_mark = bindings.arena_len();

        let mut scan = MultiScan::new(&store, &query, planned(&query), CancellationToken::new());
        let mut count = 0;
        while scan.move_next(&mut bindings).unwrap() {
            count += 1;
            assert_eq!(bindings.value_of("outer"), Some("anchor"));
        }
        assert_eq!(count, 2);
        // Pre-existing bindings and their arena region survive untouched.
        assert_eq!(bindings.count(), 1);
        assert_eq!(bindings.arena_len(), outer_mark);
    }

    #[test]
    fn test_empty_pattern_list_is_exhausted() {
        let store = MemoryQuadStore::new();
        let query = QueryBuilder::new().build();
        let mut bindings = BindingTable::new();
        let mut scan = MultiScan::new(&store, &query, Vec::new(), CancellationToken::new());
        assert!(!scan.move_next(&mut bindings).unwrap());
    }
}
