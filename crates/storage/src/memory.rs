//! Indexed in-memory quad store

use crate::{PredicateStats, QuadIter, QuadSource, StatsSource};
use rdf_model::{Quad, TripleRef};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

/// In-memory quad store with subject / predicate / object posting lists.
///
/// Quads form a set (duplicate inserts are ignored) and scans iterate in
/// insertion order, which keeps query results deterministic for a given
/// load sequence.
#[derive(Debug, Default)]
pub struct MemoryQuadStore {
    quads: Vec<Quad>,
    by_subject: FxHashMap<String, Vec<u32>>,
    by_predicate: FxHashMap<String, Vec<u32>>,
    by_object: FxHashMap<String, Vec<u32>>,
    graphs: Vec<String>,
    seen: FxHashSet<String>,
}

impl MemoryQuadStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a quad. Returns `false` when the quad was already present.
    pub fn insert(&mut self, quad: Quad) -> bool {
        let key = format!(
            "{}\u{0}{}\u{0}{}\u{0}{}",
            quad.subject, quad.predicate, quad.object, quad.graph
        );
        if !self.seen.insert(key) {
            return false;
        }

        let id = self.quads.len() as u32;
        self.by_subject.entry(quad.subject.clone()).or_default().push(id);
        self.by_predicate.entry(quad.predicate.clone()).or_default().push(id);
        self.by_object.entry(quad.object.clone()).or_default().push(id);
        if !quad.graph.is_empty() && !self.graphs.iter().any(|g| *g == quad.graph) {
            self.graphs.push(quad.graph.clone());
        }
        self.quads.push(quad);
        true
    }

    /// Insert a triple into the default graph.
    pub fn insert_triple(
        &mut self,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> bool {
        self.insert(Quad::new(subject, predicate, object))
    }

    /// Insert a triple into a named graph.
    pub fn insert_in_graph(
        &mut self,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        graph: impl Into<String>,
    ) -> bool {
        self.insert(Quad::in_graph(subject, predicate, object, graph))
    }

    /// Number of quads stored.
    pub fn len(&self) -> usize {
        self.quads.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    /// Drop every quad, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.quads.clear();
        self.by_subject.clear();
        self.by_predicate.clear();
        self.by_object.clear();
        self.graphs.clear();
        self.seen.clear();
    }

    /// Candidate quad ids for the most selective bound position.
    fn candidates(&self, subject: &str, predicate: &str, object: &str) -> Option<&[u32]> {
        if !subject.is_empty() {
            return Some(self.by_subject.get(subject).map_or(&[], Vec::as_slice));
        }
        if !object.is_empty() {
            return Some(self.by_object.get(object).map_or(&[], Vec::as_slice));
        }
        if !predicate.is_empty() {
            return Some(self.by_predicate.get(predicate).map_or(&[], Vec::as_slice));
        }
        None
    }
}

impl QuadSource for MemoryQuadStore {
    fn query<'a>(
        &'a self,
        subject: &str,
        predicate: &str,
        object: &str,
        graph: &str,
    ) -> QuadIter<'a> {
        trace!(subject, predicate, object, graph, "store scan");

        let ids: Vec<u32> = match self.candidates(subject, predicate, object) {
            Some(list) => list.to_vec(),
            None => (0..self.quads.len() as u32).collect(),
        };

        let s = subject.to_owned();
        let p = predicate.to_owned();
        let o = object.to_owned();
        let g = graph.to_owned();

        Box::new(ids.into_iter().filter_map(move |id| {
            let quad = &self.quads[id as usize];
            let matches = (s.is_empty() || quad.subject == s)
                && (p.is_empty() || quad.predicate == p)
                && (o.is_empty() || quad.object == o)
                && (g.is_empty() || quad.graph == g);
            matches.then(|| TripleRef {
                subject: &quad.subject,
                predicate: &quad.predicate,
                object: &quad.object,
                graph: &quad.graph,
            })
        }))
    }

    fn graph_names(&self) -> Vec<&str> {
        self.graphs.iter().map(String::as_str).collect()
    }
}

impl StatsSource for MemoryQuadStore {
    fn predicate_stats(&self, predicate: &str) -> Option<PredicateStats> {
        let ids = self.by_predicate.get(predicate)?;
        let mut subjects = FxHashSet::default();
        let mut objects = FxHashSet::default();
        for &id in ids {
            let quad = &self.quads[id as usize];
            subjects.insert(quad.subject.as_str());
            objects.insert(quad.object.as_str());
        }
        let count = ids.len() as f64;
        Some(PredicateStats {
            triple_count: ids.len() as u64,
            avg_objects_per_subject: count / subjects.len().max(1) as f64,
            avg_subjects_per_object: count / objects.len().max(1) as f64,
        })
    }
}
