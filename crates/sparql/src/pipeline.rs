//! Result pipeline
//!
//! Drives the root scan and applies the per-row stages in order:
//! optional extension, BIND, projection expressions, FILTER,
//! EXISTS / NOT EXISTS, MINUS, inline VALUES, then the multiplicative
//! joins (SERVICE rows, post-query VALUES), then DISTINCT, OFFSET and
//! LIMIT. ORDER BY and GROUP BY branch before streaming: the pipeline
//! drains into materialized rows, aggregates or sorts them, then streams
//! the result with the remaining gates applied.

use crate::aggregate::Aggregation;
use crate::bindings::{hash_name, BindingTable, MaterializedRow};
use crate::cancel::CancellationToken;
use crate::expr::Evaluator;
use crate::filter;
use crate::optional::extend_optional;
use crate::planner::order_patterns;
use crate::query::{
    var_name, PatternSlot, QueryBuffer, SelectItem, Term, TriplePattern,
};
use crate::scan::{
    apply_service_row, MultiScan, PlannedPattern, ServicePatternScan, SingleScan, SubqueryScan,
};
use crate::service::{self, MaterializedService, ServiceExecutor};
use crate::value::Value;
use crate::EngineError;
use rustc_hash::FxHashSet;
use storage::{QuadSource, StatsSource};
use tracing::debug;

enum RootScan<'a, S: QuadSource + ?Sized> {
    Single(Box<SingleScan<'a, S>>),
    Multi(MultiScan<'a, S>),
    SubqueryJoin {
        sub: SubqueryScan,
        multi: Option<MultiScan<'a, S>>,
        patterns: Vec<PlannedPattern>,
    },
    Service(ServicePatternScan),
    Empty {
        emitted: bool,
    },
}

struct ProductState {
    base_count: usize,
    dims: Vec<usize>,
    idx: Vec<usize>,
    exhausted: bool,
}

impl ProductState {
    fn new(base_count: usize, dims: Vec<usize>) -> Self {
        let exhausted = dims.iter().any(|&d| d == 0);
        Self {
            base_count,
            idx: vec![0; dims.len()],
            dims,
            exhausted,
        }
    }

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.exhausted {
            return None;
        }
        let combo = self.idx.clone();
        let mut i = 0;
        loop {
            if i == self.dims.len() {
                self.exhausted = true;
                break;
            }
            self.idx[i] += 1;
            if self.idx[i] < self.dims[i] {
                break;
            }
            self.idx[i] = 0;
            i += 1;
        }
        Some(combo)
    }
}

/// Streaming result iterator for one query execution.
///
/// Owns the binding table, the active scan variant, and every per-query
/// mutable resource; advanced by its owning thread only.
pub struct QueryResults<'a, S: QuadSource + ?Sized> {
    query: &'a QueryBuffer,
    store: &'a S,
    stats: Option<&'a dyn StatsSource>,
    service_executor: Option<&'a dyn ServiceExecutor>,
    evaluator: Evaluator<'a>,
    bindings: BindingTable,
    cancel: CancellationToken,
    select_names: Vec<String>,
    root: RootScan<'a, S>,
    union_branch: u8,
    services: Vec<MaterializedService>,
    root_service: Option<usize>,
    product: Option<ProductState>,
    distinct_seen: FxHashSet<u32>,
    offset_remaining: usize,
    remaining: Option<usize>,
    materialized: Option<(Vec<MaterializedRow>, usize)>,
    started: bool,
    done: bool,
}

impl<'a, S: QuadSource + ?Sized> QueryResults<'a, S> {
    pub(crate) fn new(
        query: &'a QueryBuffer,
        store: &'a S,
        stats: Option<&'a dyn StatsSource>,
        service_executor: Option<&'a dyn ServiceExecutor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            query,
            store,
            stats,
            service_executor,
            evaluator: Evaluator::new(query),
            bindings: BindingTable::new(),
            cancel,
            select_names: select_output_names(query),
            root: RootScan::Empty { emitted: true },
            union_branch: 0,
            services: Vec::new(),
            root_service: None,
            product: None,
            distinct_seen: FxHashSet::default(),
            offset_remaining: query.offset,
            remaining: query.limit,
            materialized: None,
            started: false,
            done: false,
        }
    }

    /// The current row's bindings.
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Value bound to a variable in the current row.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings.value_of(name)
    }

    /// Advance to the next solution.
    pub fn move_next(&mut self) -> Result<bool, EngineError> {
        if self.done {
            return Ok(false);
        }
        if !self.started {
            self.started = true;
            self.prepare()?;
        }

        if self.materialized.is_some() {
            loop {
                self.cancel.check()?;
                let row = {
                    let (rows, next) = self.materialized.as_mut().expect("materialized mode");
                    if *next >= rows.len() {
                        None
                    } else {
                        let row = rows[*next].clone();
                        *next += 1;
                        Some(row)
                    }
                };
                let Some(row) = row else {
                    self.done = true;
                    return Ok(false);
                };
                row.restore(&mut self.bindings)?;
                if !self.passes_gates() {
                    continue;
                }
                if self.limit_reached() {
                    self.done = true;
                    return Ok(false);
                }
                return Ok(true);
            }
        }

        loop {
            if !self.next_streaming_row()? {
                self.done = true;
                return Ok(false);
            }
            if !self.passes_gates() {
                continue;
            }
            if self.limit_reached() {
                self.done = true;
                return Ok(false);
            }
            return Ok(true);
        }
    }

    fn prepare(&mut self) -> Result<(), EngineError> {
        debug!(slots = self.query.slots().len(), "query execution starting");
        for clause in &self.query.services {
            let materialized =
                service::materialize(self.service_executor, self.query, clause, &self.bindings)?;
            self.services.push(materialized);
        }
        self.build_root(0)?;

        let needs_groups =
            !self.query.aggregates.is_empty() || !self.query.group_by.is_empty();
        if needs_groups {
            let mut aggregation = Aggregation::new(self.query);
            while self.next_streaming_row()? {
                aggregation.update(&self.evaluator, &self.bindings)?;
            }
            let mut rows = aggregation.finish(&self.evaluator)?;
            if !self.query.order_by.is_empty() {
                self.sort_rows(&mut rows)?;
            }
            self.bindings.clear();
            self.materialized = Some((rows, 0));
        } else if !self.query.order_by.is_empty() {
            let mut rows = Vec::new();
            while self.next_streaming_row()? {
                rows.push(self.capture_row());
            }
            self.sort_rows(&mut rows)?;
            self.bindings.clear();
            self.materialized = Some((rows, 0));
        }
        Ok(())
    }

    /// Produce the next fully-joined row (stages 1-8), without the
    /// DISTINCT / OFFSET / LIMIT gates.
    fn next_streaming_row(&mut self) -> Result<bool, EngineError> {
        loop {
            self.cancel.check()?;
            if self.product.is_some() {
                let combo = self.product.as_mut().expect("product state").next();
                match combo {
                    Some(combo) => {
                        if self.apply_combo(&combo)? {
                            return Ok(true);
                        }
                        continue;
                    }
                    None => self.product = None,
                }
            }
            if !self.next_base_row()? {
                return Ok(false);
            }
            let dims = self.product_dims();
            self.product = Some(ProductState::new(self.bindings.count(), dims));
        }
    }

    fn next_base_row(&mut self) -> Result<bool, EngineError> {
        loop {
            self.cancel.check()?;
            if !self.advance_root()? {
                if self.query.flags().has_union && self.union_branch == 0 {
                    self.union_branch = 1;
                    self.bindings.clear();
                    self.build_root(1)?;
                    continue;
                }
                return Ok(false);
            }

            for (pattern, graph) in self.collect_optionals() {
                extend_optional(
                    self.store,
                    self.query,
                    &pattern,
                    graph.as_ref(),
                    &mut self.bindings,
                    &self.cancel,
                )?;
            }
            self.apply_binds()?;
            self.apply_select_exprs()?;
            if !self.pass_filters() {
                continue;
            }
            if !self.pass_exists()? {
                continue;
            }
            if !self.pass_minus()? {
                continue;
            }
            if !self.pass_inline_values() {
                continue;
            }
            return Ok(true);
        }
    }

    fn advance_root(&mut self) -> Result<bool, EngineError> {
        match &mut self.root {
            RootScan::Single(scan) => scan.move_next(&mut self.bindings),
            RootScan::Multi(scan) => scan.move_next(&mut self.bindings),
            RootScan::Service(scan) => scan.move_next(&mut self.bindings),
            RootScan::Empty { emitted } => {
                if *emitted {
                    Ok(false)
                } else {
                    *emitted = true;
                    Ok(true)
                }
            }
            RootScan::SubqueryJoin {
                sub,
                multi,
                patterns,
            } => loop {
                if let Some(active) = multi {
                    if active.move_next(&mut self.bindings)? {
                        return Ok(true);
                    }
                    *multi = None;
                }
                if !sub.move_next(&mut self.bindings)? {
                    return Ok(false);
                }
                if patterns.is_empty() {
                    return Ok(true);
                }
                *multi = Some(MultiScan::new(
                    self.store,
                    self.query,
                    patterns.clone(),
                    self.cancel.clone(),
                ));
            },
        }
    }

    fn build_root(&mut self, branch: u8) -> Result<(), EngineError> {
        let mut patterns = self.collect_patterns(branch);
        // A BIND-only UNION branch re-scans the first branch's triples
        // with the second branch's BINDs active.
        if branch == 1 && patterns.is_empty() {
            patterns = self.collect_patterns(0);
        }
        let patterns = order_patterns(self.query, patterns, self.stats);

        if let Some(inner) = self.find_sub_select(branch) {
            let rows = self.materialize_sub_select(inner)?;
            self.root = RootScan::SubqueryJoin {
                sub: SubqueryScan::new(rows, &self.bindings),
                multi: None,
                patterns,
            };
            return Ok(());
        }

        if !patterns.is_empty() {
            self.root = if patterns.len() == 1 {
                RootScan::Single(Box::new(SingleScan::new(
                    self.store,
                    self.query,
                    &patterns[0].pattern,
                    patterns[0].graph.as_ref(),
                    &self.bindings,
                    self.cancel.clone(),
                )))
            } else {
                RootScan::Multi(MultiScan::new(
                    self.store,
                    self.query,
                    patterns,
                    self.cancel.clone(),
                ))
            };
            return Ok(());
        }

        if branch == 0 && !self.services.is_empty() {
            self.root_service = Some(0);
            self.root = RootScan::Service(ServicePatternScan::new(
                self.services[0].rows.clone(),
                &self.bindings,
            ));
            return Ok(());
        }

        self.root = RootScan::Empty { emitted: false };
        Ok(())
    }

    fn find_sub_select(&self, branch: u8) -> Option<&'a QueryBuffer> {
        let query: &'a QueryBuffer = self.query;
        let range = query.branch_slots(branch);
        for index in range {
            if query.is_child_slot(index) {
                continue;
            }
            if let PatternSlot::SubSelect { query: inner } = &query.slots()[index] {
                return Some(inner);
            }
        }
        None
    }

    fn materialize_sub_select(
        &self,
        inner: &'a QueryBuffer,
    ) -> Result<Vec<MaterializedRow>, EngineError> {
        let mut results = QueryResults::new(
            inner,
            self.store,
            self.stats,
            self.service_executor,
            self.cancel.clone(),
        );
        let names = select_output_names(inner);
        let mut rows = Vec::new();
        while results.move_next()? {
            if names.is_empty() {
                rows.push(MaterializedRow::capture(results.bindings()));
            } else {
                let mut hashes = Vec::with_capacity(names.len());
                let mut values = Vec::with_capacity(names.len());
                for name in &names {
                    if let Some(value) = results.get(name) {
                        hashes.push(hash_name(name));
                        values.push(value.to_owned());
                    }
                }
                rows.push(MaterializedRow { hashes, values });
            }
        }
        Ok(rows)
    }

    /// Required patterns of a branch: top-level triples plus the children
    /// of GRAPH clauses, each carrying its graph term.
    fn collect_patterns(&self, branch: u8) -> Vec<PlannedPattern> {
        let mut patterns = Vec::new();
        let range = self.query.branch_slots(branch);
        for index in range {
            if self.query.is_child_slot(index) {
                continue;
            }
            match &self.query.slots()[index] {
                PatternSlot::Triple {
                    pattern,
                    optional: false,
                } => patterns.push(PlannedPattern {
                    pattern: *pattern,
                    graph: None,
                }),
                PatternSlot::GraphClause {
                    graph,
                    child_start,
                    child_count,
                } => {
                    for child in *child_start..*child_start + *child_count {
                        if let PatternSlot::Triple {
                            pattern,
                            optional: false,
                        } = &self.query.slots()[child]
                        {
                            patterns.push(PlannedPattern {
                                pattern: *pattern,
                                graph: Some(*graph),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        patterns
    }

    fn collect_optionals(&self) -> Vec<(TriplePattern, Option<Term>)> {
        let mut optionals = Vec::new();
        let range = self.query.branch_slots(self.union_branch);
        for index in range {
            if self.query.is_child_slot(index) {
                continue;
            }
            match &self.query.slots()[index] {
                PatternSlot::Triple {
                    pattern,
                    optional: true,
                } => optionals.push((*pattern, None)),
                PatternSlot::GraphClause {
                    graph,
                    child_start,
                    child_count,
                } => {
                    for child in *child_start..*child_start + *child_count {
                        if let PatternSlot::Triple {
                            pattern,
                            optional: true,
                        } = &self.query.slots()[child]
                        {
                            optionals.push((*pattern, Some(*graph)));
                        }
                    }
                }
                _ => {}
            }
        }
        optionals
    }

    fn apply_binds(&mut self) -> Result<(), EngineError> {
        let query = self.query;
        let range = query.branch_slots(self.union_branch);
        for index in range {
            if query.is_child_slot(index) {
                continue;
            }
            let PatternSlot::Bind { var, expr, branch } = &query.slots()[index] else {
                continue;
            };
            if query.flags().has_union && *branch != self.union_branch {
                continue;
            }
            let name = var_name(query.source().resolve(*var));
            if self.bindings.find(name).is_some() {
                continue;
            }
            let value = self
                .evaluator
                .evaluate(query.source().resolve(*expr), &self.bindings);
            if let Some((text, typed)) = value.binding_string() {
                self.bindings.bind_decoded(name, &text, typed)?;
            }
        }
        Ok(())
    }

    fn apply_select_exprs(&mut self) -> Result<(), EngineError> {
        let query = self.query;
        for item in &query.select {
            let SelectItem::Expression { expr, alias } = item else {
                continue;
            };
            let name = var_name(query.source().resolve(*alias));
            if self.bindings.find(name).is_some() {
                continue;
            }
            let value = self
                .evaluator
                .evaluate(query.source().resolve(*expr), &self.bindings);
            if let Some((text, typed)) = value.binding_string() {
                self.bindings.bind_decoded(name, &text, typed)?;
            }
        }
        Ok(())
    }

    fn pass_filters(&self) -> bool {
        let query = self.query;
        let range = query.branch_slots(self.union_branch);
        for index in range {
            if query.is_child_slot(index) {
                continue;
            }
            if let PatternSlot::Filter { expr } = &query.slots()[index] {
                if !filter::holds(
                    &self.evaluator,
                    query.source().resolve(*expr),
                    &self.bindings,
                ) {
                    return false;
                }
            }
        }
        true
    }

    fn pass_exists(&mut self) -> Result<bool, EngineError> {
        let query = self.query;
        let range = query.branch_slots(self.union_branch);
        for index in range {
            if query.is_child_slot(index) {
                continue;
            }
            let (child_start, child_count, negated) = match &query.slots()[index] {
                PatternSlot::ExistsHeader {
                    child_start,
                    child_count,
                } => (*child_start, *child_count, false),
                PatternSlot::NotExistsHeader {
                    child_start,
                    child_count,
                } => (*child_start, *child_count, true),
                _ => continue,
            };
            let patterns: Vec<PlannedPattern> = (child_start..child_start + child_count)
                .filter_map(|child| match &query.slots()[child] {
                    PatternSlot::Triple { pattern, .. } => Some(PlannedPattern {
                        pattern: *pattern,
                        graph: None,
                    }),
                    _ => None,
                })
                .collect();

            let snapshot = self.bindings.count();
            let mut scan =
                MultiScan::new(self.store, query, patterns, self.cancel.clone());
            let matched = scan.move_next(&mut self.bindings)?;
            self.bindings.truncate_to(snapshot);
            if matched == negated {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// MINUS rejects the row iff every MINUS pattern matches under the
    /// current bindings.
    fn pass_minus(&mut self) -> Result<bool, EngineError> {
        let query = self.query;
        let range = query.branch_slots(self.union_branch);
        let mut saw_minus = false;
        for index in range {
            if query.is_child_slot(index) {
                continue;
            }
            let PatternSlot::MinusTriple { pattern } = &query.slots()[index] else {
                continue;
            };
            saw_minus = true;
            let snapshot = self.bindings.count();
            let mut scan = SingleScan::new(
                self.store,
                query,
                pattern,
                None,
                &self.bindings,
                self.cancel.clone(),
            );
            let matched = scan.move_next(&mut self.bindings)?;
            self.bindings.truncate_to(snapshot);
            if !matched {
                return Ok(true);
            }
        }
        Ok(!saw_minus)
    }

    fn pass_inline_values(&self) -> bool {
        let query = self.query;
        let range = query.branch_slots(self.union_branch);
        for index in range {
            if query.is_child_slot(index) {
                continue;
            }
            let PatternSlot::ValuesHeader {
                var,
                entry_start,
                entry_count,
            } = &query.slots()[index]
            else {
                continue;
            };
            let name = var_name(query.term_text(var));
            let Some(bound) = self.bindings.value_of(name) else {
                return false;
            };
            let matched = (*entry_start..*entry_start + *entry_count).any(|entry| {
                match &query.slots()[entry] {
                    PatternSlot::ValuesEntry { value } => {
                        query.expand(query.source().resolve(*value)) == bound
                    }
                    _ => false,
                }
            });
            if !matched {
                return false;
            }
        }
        true
    }

    fn product_dims(&self) -> Vec<usize> {
        let mut dims = Vec::new();
        if let Some(grid) = &self.query.post_values {
            dims.push(grid.rows.len());
        }
        for (i, materialized) in self.services.iter().enumerate() {
            if Some(i) != self.root_service {
                dims.push(materialized.rows.len());
            }
        }
        dims
    }

    fn apply_combo(&mut self, combo: &[usize]) -> Result<bool, EngineError> {
        let base_count = self.product.as_ref().expect("product state").base_count;
        self.bindings.truncate_to(base_count);
        let mut dim = 0;

        if let Some(grid) = &self.query.post_values {
            let row = &grid.rows[combo[dim]];
            dim += 1;
            for (var, cell) in grid.vars.iter().zip(row) {
                let Some(cell) = cell else {
                    // UNDEF is a wildcard.
                    continue;
                };
                let name = var_name(self.query.source().resolve(*var));
                let value = self.query.expand(self.query.source().resolve(*cell));
                match self.bindings.find(name) {
                    Some(i) => {
                        if self.bindings.get(i) != value {
                            return Ok(false);
                        }
                    }
                    None => self.bindings.bind(name, &value)?,
                }
            }
        }

        for (i, materialized) in self.services.iter().enumerate() {
            if Some(i) == self.root_service {
                continue;
            }
            let row = &materialized.rows[combo[dim]];
            dim += 1;
            if !apply_service_row(&mut self.bindings, row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn passes_gates(&mut self) -> bool {
        if self.query.distinct {
            let hash = self.distinct_hash();
            if !self.distinct_seen.insert(hash) {
                return false;
            }
        }
        if self.offset_remaining > 0 {
            self.offset_remaining -= 1;
            return false;
        }
        true
    }

    fn limit_reached(&mut self) -> bool {
        match &mut self.remaining {
            Some(0) => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        }
    }

    /// DISTINCT hashes the projected columns when a SELECT list exists,
    /// otherwise the full row.
    fn distinct_hash(&self) -> u32 {
        if self.select_names.is_empty() {
            return self.bindings.row_hash();
        }
        BindingTable::composite_hash(
            self.select_names
                .iter()
                .map(|name| self.bindings.value_of(name).unwrap_or("")),
        )
    }

    fn capture_row(&self) -> MaterializedRow {
        MaterializedRow::capture(&self.bindings)
    }

    fn sort_rows(&mut self, rows: &mut Vec<MaterializedRow>) -> Result<(), EngineError> {
        let conditions: Vec<(String, bool)> = self
            .query
            .order_by
            .iter()
            .map(|c| {
                (
                    self.query.source().resolve(c.expr).to_owned(),
                    c.ascending,
                )
            })
            .collect();

        let mut keyed: Vec<(Vec<Value>, MaterializedRow)> = Vec::with_capacity(rows.len());
        let mut scratch = BindingTable::new();
        for row in rows.drain(..) {
            row.restore(&mut scratch)?;
            let keys = conditions
                .iter()
                .map(|(expr, _)| self.evaluator.evaluate(expr, &scratch))
                .collect();
            keyed.push((keys, row));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for (i, (_, ascending)) in conditions.iter().enumerate() {
                let ordering = compare_order_values(&a[i], &b[i]);
                if ordering != std::cmp::Ordering::Equal {
                    return if *ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    };
                }
            }
            std::cmp::Ordering::Equal
        });

        rows.extend(keyed.into_iter().map(|(_, row)| row));
        Ok(())
    }
}

/// Output column names of the SELECT clause, sigil-free.
fn select_output_names(query: &QueryBuffer) -> Vec<String> {
    query
        .select
        .iter()
        .map(|item| match item {
            SelectItem::Variable(span) => var_name(query.source().resolve(*span)).to_owned(),
            SelectItem::Expression { alias, .. } => {
                var_name(query.source().resolve(*alias)).to_owned()
            }
            SelectItem::Aggregate(index) => {
                var_name(query.source().resolve(query.aggregates[*index].alias)).to_owned()
            }
        })
        .collect()
}

/// RDF term ordering: Unbound < BlankNode < Iri < Literal; literals
/// compare numerically when both coerce, lexically otherwise.
fn compare_order_values(left: &Value, right: &Value) -> std::cmp::Ordering {
    let rank_left = term_rank(left);
    let rank_right = term_rank(right);
    if rank_left != rank_right {
        return rank_left.cmp(&rank_right);
    }
    match (left, right) {
        (Value::Uri(a), Value::Uri(b)) => a.cmp(b),
        _ => {
            let a = left.coerce_number();
            let b = right.coerce_number();
            if !a.is_nan() && !b.is_nan() {
                a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
            } else {
                left.lexical().cmp(&right.lexical())
            }
        }
    }
}

fn term_rank(value: &Value) -> u8 {
    match value {
        Value::Unbound => 0,
        Value::Str(s) if s.starts_with("_:") => 1,
        Value::Uri(_) => 2,
        _ => 3,
    }
}
