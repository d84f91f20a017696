//! Quad-store scan interface and in-memory implementation
//!
//! The query engine treats storage as an opaque source of matching quads:
//! a wildcard-tolerant `(subject, predicate, object, graph)` query yields a
//! lazy iterator of borrowed term strings. This crate defines that
//! interface, the statistics interface the heuristic planner consumes, and
//! an indexed in-memory store used by tests and by the SERVICE
//! materializer.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod memory;

pub use memory::MemoryQuadStore;

use rdf_model::TripleRef;

/// Lazy scan over matching quads.
pub type QuadIter<'a> = Box<dyn Iterator<Item = TripleRef<'a>> + 'a>;

/// Read-only quad source consumed by the query engine.
///
/// Each of `subject` / `predicate` / `object` / `graph` is either an exact
/// canonical term string or `""` for a wildcard. Scan order is
/// implementation-defined but stable for a given store snapshot. The
/// borrowed spans yielded by the iterator stay valid for the iterator's
/// lifetime; the store is treated as read-only while scans are live.
pub trait QuadSource {
    /// Scan quads matching the given constraints.
    fn query<'a>(
        &'a self,
        subject: &str,
        predicate: &str,
        object: &str,
        graph: &str,
    ) -> QuadIter<'a>;

    /// Scan the store as of a point in time.
    ///
    /// Stores without history treat every timestamp as the current
    /// snapshot.
    fn query_as_of<'a>(
        &'a self,
        subject: &str,
        predicate: &str,
        object: &str,
        _as_of: u64,
        graph: &str,
    ) -> QuadIter<'a> {
        self.query(subject, predicate, object, graph)
    }

    /// Scan quads that changed inside a timestamp range.
    ///
    /// Stores without change tracking yield nothing.
    fn query_changes<'a>(
        &'a self,
        _subject: &str,
        _predicate: &str,
        _object: &str,
        _range_start: u64,
        _range_end: u64,
        _graph: &str,
    ) -> QuadIter<'a> {
        Box::new(std::iter::empty())
    }

    /// Scan the full recorded evolution of matching quads.
    ///
    /// Stores without history yield nothing.
    fn query_evolution<'a>(
        &'a self,
        _subject: &str,
        _predicate: &str,
        _object: &str,
        _graph: &str,
    ) -> QuadIter<'a> {
        Box::new(std::iter::empty())
    }

    /// Names of the non-default graphs present in the store, in a stable
    /// order.
    fn graph_names(&self) -> Vec<&str>;
}

/// Per-predicate cardinality statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredicateStats {
    /// Number of quads carrying this predicate.
    pub triple_count: u64,
    /// Mean number of distinct objects per subject.
    pub avg_objects_per_subject: f64,
    /// Mean number of distinct subjects per object.
    pub avg_subjects_per_object: f64,
}

/// Statistics source consumed by the heuristic planner.
pub trait StatsSource {
    /// Statistics for a concrete predicate, if known.
    fn predicate_stats(&self, predicate: &str) -> Option<PredicateStats>;
}
