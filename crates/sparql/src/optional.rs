//! OPTIONAL pattern extension
//!
//! Each optional pattern is an independent single-shot extension of the
//! current row: the first store match binds any not-yet-bound variables,
//! a miss leaves the bindings untouched. There is no backtracking across
//! optionals.

use crate::bindings::BindingTable;
use crate::cancel::CancellationToken;
use crate::query::{QueryBuffer, Term, TriplePattern};
use crate::scan::SingleScan;
use crate::EngineError;
use storage::QuadSource;

/// Try to extend the current row with one optional pattern.
///
/// Runs a fresh single scan and keeps the first hit; on a miss the scan
/// has already rolled its bindings back.
pub(crate) fn extend_optional<S: QuadSource + ?Sized>(
    store: &S,
    query: &QueryBuffer,
    pattern: &TriplePattern,
    graph: Option<&Term>,
    bindings: &mut BindingTable,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let mut scan = SingleScan::new(store, query, pattern, graph, bindings, cancel.clone());
    scan.move_next(bindings)?;
    Ok(())
}
