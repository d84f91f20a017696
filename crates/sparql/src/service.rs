//! SERVICE clause materialization
//!
//! An external executor runs the remote query; the materializer
//! substitutes already-bound variables into the pattern text, forwards a
//! `SELECT * WHERE { ... }` query, and loads the returned rows into a
//! temporary in-memory store rented from a bounded process-wide pool.
//! Each row becomes a set of synthetic triples (one row subject, one
//! predicate per variable) so downstream triple-pattern scans can query
//! the result uniformly.

use crate::bindings::BindingTable;
use crate::query::{var_name, QueryBuffer, ServiceClause, TermKind};
use crate::EngineError;
use parking_lot::{Condvar, Mutex};
use std::sync::OnceLock;
use tracing::debug;
use storage::MemoryQuadStore;

/// One row returned by a remote endpoint: `(variable, canonical value)`
/// columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResultRow {
    /// Column values keyed by variable name (no sigil).
    pub columns: Vec<(String, String)>,
}

/// External SPARQL endpoint executor.
///
/// Only the materialization contract is specified here; transport is the
/// implementor's concern.
pub trait ServiceExecutor: Send + Sync {
    /// Execute `query` against `endpoint` and return all result rows.
    fn execute(&self, endpoint: &str, query: &str)
        -> Result<Vec<ServiceResultRow>, EngineError>;
}

/// A SERVICE clause materialized for one query execution.
pub(crate) struct MaterializedService {
    /// The result rows, joined against base solutions.
    pub(crate) rows: Vec<ServiceResultRow>,
    /// Pooled store holding the rows as synthetic triples; the rental
    /// returns to the pool when the execution drops.
    pub(crate) _store: PooledStore,
}

/// Materialize one SERVICE clause.
pub(crate) fn materialize(
    executor: Option<&dyn ServiceExecutor>,
    query: &QueryBuffer,
    clause: &ServiceClause,
    bindings: &BindingTable,
) -> Result<MaterializedService, EngineError> {
    let result = execute_clause(executor, query, clause, bindings);
    let rows = match result {
        Ok(rows) => rows,
        Err(_) if clause.silent => Vec::new(),
        Err(err) => return Err(err),
    };

    let mut store = pool().rent();
    load_rows(&mut store, &rows);
    Ok(MaterializedService {
        rows,
        _store: store,
    })
}

fn execute_clause(
    executor: Option<&dyn ServiceExecutor>,
    query: &QueryBuffer,
    clause: &ServiceClause,
    bindings: &BindingTable,
) -> Result<Vec<ServiceResultRow>, EngineError> {
    let executor = executor
        .ok_or_else(|| EngineError::ServiceFailure("no service executor configured".into()))?;

    let endpoint_text = query.term_text(&clause.endpoint);
    let endpoint = if clause.endpoint.kind == TermKind::Variable {
        let name = var_name(endpoint_text);
        match bindings.value_of(name) {
            Some(value) => rdf_model::strip_brackets(value).to_owned(),
            None => {
                return Err(EngineError::ServiceFailure(format!(
                    "service endpoint variable ?{} is unbound",
                    name
                )))
            }
        }
    } else {
        rdf_model::strip_brackets(&query.expand(endpoint_text)).to_owned()
    };

    let pattern = substitute_bound_vars(query.source().resolve(clause.pattern), bindings);
    let remote_query = format!("SELECT * WHERE {{ {} }}", pattern);
    debug!(%endpoint, "materializing service clause");
    executor.execute(&endpoint, &remote_query)
}

/// Replace every `?var` the table binds with its canonical value.
fn substitute_bound_vars(pattern: &str, bindings: &BindingTable) -> String {
    let mut out = String::with_capacity(pattern.len());
    let bytes = pattern.as_bytes();
    let mut segment_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'?' || bytes[i] == b'$' {
            out.push_str(&pattern[segment_start..i]);
            let name_start = i + 1;
            let mut end = name_start;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
            {
                end += 1;
            }
            let name = &pattern[name_start..end];
            match bindings.value_of(name) {
                Some(value) => out.push_str(value),
                None => out.push_str(&pattern[i..end]),
            }
            segment_start = end;
            i = end;
        } else {
            i += 1;
        }
    }
    out.push_str(&pattern[segment_start..]);
    out
}

/// Load service rows as synthetic triples: a unique subject per row and a
/// synthetic predicate per variable.
pub(crate) fn load_rows(store: &mut MemoryQuadStore, rows: &[ServiceResultRow]) {
    for (index, row) in rows.iter().enumerate() {
        let subject = format!("<urn:service:row:{}>", index);
        for (var, value) in &row.columns {
            let predicate = format!("<urn:service:var:{}>", var);
            store.insert_triple(subject.clone(), predicate, value.clone());
        }
    }
}

/// Bounded pool of temporary stores for SERVICE materialization.
pub(crate) struct StorePool {
    state: Mutex<PoolState>,
    available: Condvar,
    capacity: usize,
}

struct PoolState {
    idle: Vec<MemoryQuadStore>,
    outstanding: usize,
}

/// A rented store, returned to the pool on drop.
pub(crate) struct PooledStore {
    store: Option<MemoryQuadStore>,
}

impl PooledStore {
    /// Read access to the rented store.
    pub(crate) fn get(&self) -> &MemoryQuadStore {
        self.store.as_ref().expect("store present until drop")
    }
}

impl std::ops::Deref for PooledStore {
    type Target = MemoryQuadStore;

    fn deref(&self) -> &MemoryQuadStore {
        self.get()
    }
}

impl std::ops::DerefMut for PooledStore {
    fn deref_mut(&mut self) -> &mut MemoryQuadStore {
        self.store.as_mut().expect("store present until drop")
    }
}

impl Drop for PooledStore {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            pool().give_back(store);
        }
    }
}

impl StorePool {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                outstanding: 0,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Rent a cleared store, waiting when the pool is at capacity.
    pub(crate) fn rent(&self) -> PooledStore {
        let mut state = self.state.lock();
        loop {
            if let Some(mut store) = state.idle.pop() {
                store.clear();
                state.outstanding += 1;
                return PooledStore { store: Some(store) };
            }
            if state.outstanding < self.capacity {
                state.outstanding += 1;
                return PooledStore {
                    store: Some(MemoryQuadStore::new()),
                };
            }
            self.available.wait(&mut state);
        }
    }

    fn give_back(&self, store: MemoryQuadStore) {
        let mut state = self.state.lock();
        state.outstanding -= 1;
        state.idle.push(store);
        self.available.notify_one();
    }
}

/// The process-wide pool, capped at twice the processor count.
pub(crate) fn pool() -> &'static StorePool {
    static POOL: OnceLock<StorePool> = OnceLock::new();
    POOL.get_or_init(|| {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        StorePool::new(parallelism * 2)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;
    use storage::QuadSource;

    struct FixedExecutor {
        rows: Vec<ServiceResultRow>,
        fail: bool,
    }

    impl ServiceExecutor for FixedExecutor {
        fn execute(
            &self,
            _endpoint: &str,
            _query: &str,
        ) -> Result<Vec<ServiceResultRow>, EngineError> {
            if self.fail {
                Err(EngineError::ServiceFailure("remote down".into()))
            } else {
                Ok(self.rows.clone())
            }
        }
    }

    fn service_row(pairs: &[(&str, &str)]) -> ServiceResultRow {
        ServiceResultRow {
            columns: pairs
                .iter()
                .map(|(n, v)| ((*n).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn test_materialize_returns_rows() {
        let query = QueryBuilder::new()
            .service("<http://remote/sparql>", "?s <urn:p> ?o", false)
            .build();
        let executor = FixedExecutor {
            rows: vec![
                service_row(&[("s", "<urn:a>"), ("o", "1")]),
                service_row(&[("s", "<urn:b>"), ("o", "2")]),
            ],
            fail: false,
        };
        let bindings = BindingTable::new();
        let materialized =
            materialize(Some(&executor), &query, &query.services[0], &bindings).unwrap();
        assert_eq!(materialized.rows.len(), 2);
        assert_eq!(materialized.rows[0].columns[0].1, "<urn:a>");
    }

    #[test]
    fn test_load_rows_builds_synthetic_triples() {
        let rows = vec![
            service_row(&[("s", "<urn:a>"), ("o", "1")]),
            service_row(&[("s", "<urn:b>"), ("o", "2")]),
        ];
        let mut store = MemoryQuadStore::new();
        load_rows(&mut store, &rows);

        let hits: Vec<_> = store.query("", "<urn:service:var:s>", "", "").collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].subject, "<urn:service:row:0>");
        assert_eq!(hits[0].object, "<urn:a>");
        assert_eq!(store.query("<urn:service:row:1>", "", "", "").count(), 2);
    }

    #[test]
    fn test_silent_swallows_failure() {
        let query = QueryBuilder::new()
            .service("<http://remote/sparql>", "?s ?p ?o", true)
            .build();
        let executor = FixedExecutor {
            rows: Vec::new(),
            fail: true,
        };
        let bindings = BindingTable::new();
        let materialized =
            materialize(Some(&executor), &query, &query.services[0], &bindings).unwrap();
        assert!(materialized.rows.is_empty());

        let loud = QueryBuilder::new()
            .service("<http://remote/sparql>", "?s ?p ?o", false)
            .build();
        assert!(matches!(
            materialize(Some(&executor), &loud, &loud.services[0], &bindings),
            Err(EngineError::ServiceFailure(_))
        ));
    }

    #[test]
    fn test_substitution_of_bound_variables() {
        let mut bindings = BindingTable::new();
        bindings.bind("s", "<urn:a>").unwrap();
        let out = substitute_bound_vars("?s <urn:p> ?o", &bindings);
        assert_eq!(out, "<urn:a> <urn:p> ?o");
    }

    #[test]
    fn test_pool_recycles_stores() {
        let first = pool().rent();
        drop(first);
        let mut second = pool().rent();
        second.insert_triple("<urn:a>", "<urn:p>", "x");
        assert_eq!(second.len(), 1);
        drop(second);
        let third = pool().rent();
        // Rented stores come back cleared.
        assert_eq!(third.len(), 0);
    }
}
