//! SPARQL 1.1 query execution core
//!
//! Evaluates graph-pattern queries against an indexed quad store through
//! four tightly coupled subsystems:
//!
//! - **Pattern scans** — lazy, pull-based iterators over triple patterns
//!   (property paths included), nested-loop joins, UNION, OPTIONAL,
//!   sub-selects and cross-graph scans.
//! - **The binding table** — a columnar variable-binding structure
//!   threaded by reference through every operator, with truncation-based
//!   backtracking.
//! - **The expression evaluator** — recursive-descent evaluation of
//!   SPARQL value expressions for FILTER, BIND, HAVING and projection.
//! - **The post-pipeline** — DISTINCT, ORDER BY with RDF term ordering,
//!   GROUP BY with aggregate accumulation, HAVING, LIMIT/OFFSET, MINUS,
//!   VALUES joins and EXISTS.
//!
//! Execution is single-threaded and cooperative: every operator is a
//! pull-based iterator, and cancellation is polled at scan-loop
//! boundaries.
//!
//! The query parser is out of scope; [`QueryBuilder`] is the interface a
//! parser drives to assemble the [`QueryBuffer`] pattern representation.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod bindings;
pub mod cancel;
pub mod query;
pub mod value;

mod aggregate;
mod expr;
mod filter;
mod optional;
mod pipeline;
mod planner;
mod scan;
mod service;
mod source;

pub use bindings::{hash_name, BindingTable, MaterializedRow, TypedValue};
pub use cancel::CancellationToken;
pub use expr::Evaluator;
pub use filter::effective_boolean;
pub use pipeline::QueryResults;
pub use query::{
    AggregateFunction, PathKind, PatternSlot, PropertyPath, QueryBuffer, QueryBuilder, QueryFlags,
    Term, TermKind, TriplePattern,
};
pub use service::{ServiceExecutor, ServiceResultRow};
pub use source::{SourceBuffer, Span};
pub use value::Value;

use storage::{QuadSource, StatsSource};

/// Engine-level error.
///
/// Expression-level faults never reach this type: they localize into
/// [`Value::Unbound`] and, at FILTER boundaries, reject the row. Only
/// scan-level faults travel the error channel.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The per-query cancellation token was set.
    #[error("query cancelled")]
    Cancelled,

    /// Binding table capacity exceeded; the caller sized the table too
    /// small for the query.
    #[error("binding buffer exhausted (capacity {0})")]
    BufferExhausted(usize),

    /// A SERVICE clause failed and was not SILENT.
    #[error("service failure: {0}")]
    ServiceFailure(String),
}

/// Query execution engine bound to one store.
///
/// The store is read-only for the duration of every execution; per-query
/// mutable state lives in the returned [`QueryResults`].
pub struct Engine<'s, S: QuadSource + ?Sized> {
    store: &'s S,
    stats: Option<&'s dyn StatsSource>,
    service_executor: Option<&'s dyn ServiceExecutor>,
}

impl<'s, S: QuadSource + ?Sized> Engine<'s, S> {
    /// Create an engine over a store.
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            stats: None,
            service_executor: None,
        }
    }

    /// Attach a statistics source for the heuristic planner.
    pub fn with_stats(mut self, stats: &'s dyn StatsSource) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Attach an executor for SERVICE clauses.
    pub fn with_service_executor(mut self, executor: &'s dyn ServiceExecutor) -> Self {
        self.service_executor = Some(executor);
        self
    }

    /// Execute a query, returning its lazy result iterator.
    pub fn execute<'q>(&self, query: &'q QueryBuffer) -> QueryResults<'q, S>
    where
        's: 'q,
    {
        self.execute_cancellable(query, CancellationToken::new())
    }

    /// Execute a query under an externally controlled cancellation token.
    pub fn execute_cancellable<'q>(
        &self,
        query: &'q QueryBuffer,
        cancel: CancellationToken,
    ) -> QueryResults<'q, S>
    where
        's: 'q,
    {
        QueryResults::new(query, self.store, self.stats, self.service_executor, cancel)
    }
}
