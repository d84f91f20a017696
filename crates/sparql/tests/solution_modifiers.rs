//! Aggregation and solution-modifier tests
//!
//! GROUP BY keys and aliases, each aggregate function through the full
//! pipeline, HAVING conjuncts, multi-key ORDER BY, and the interaction
//! of the modifier gates (DISTINCT, OFFSET, LIMIT) with materialized
//! results.

use sparql::{AggregateFunction, Engine, QueryBuilder};
use storage::MemoryQuadStore;

const EX: &str = "http://example.org/";

fn ex(local: &str) -> String {
    format!("<{}{}>", EX, local)
}

fn int(n: i64) -> String {
    format!("\"{}\"^^<http://www.w3.org/2001/XMLSchema#integer>", n)
}

fn decimal(lex: &str) -> String {
    format!("\"{}\"^^<http://www.w3.org/2001/XMLSchema#decimal>", lex)
}

/// Orders with per-customer line amounts.
fn orders_store() -> MemoryQuadStore {
    let mut store = MemoryQuadStore::new();
    store.insert_triple(ex("o1"), ex("customer"), ex("ada"));
    store.insert_triple(ex("o1"), ex("amount"), int(10));
    store.insert_triple(ex("o2"), ex("customer"), ex("ada"));
    store.insert_triple(ex("o2"), ex("amount"), int(30));
    store.insert_triple(ex("o3"), ex("customer"), ex("bo"));
    store.insert_triple(ex("o3"), ex("amount"), int(5));
    store
}

fn builder() -> QueryBuilder {
    QueryBuilder::new().prefix("", EX)
}

fn rows_of(
    store: &MemoryQuadStore,
    query: &sparql::QueryBuffer,
    vars: &[&str],
) -> Vec<Vec<String>> {
    let engine = Engine::new(store);
    let mut results = engine.execute(query);
    let mut rows = Vec::new();
    while results.move_next().unwrap() {
        rows.push(
            vars.iter()
                .map(|v| results.get(v).unwrap_or("").to_owned())
                .collect(),
        );
    }
    rows
}

#[test]
fn test_avg_min_max_sample_per_group() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":customer", "?c")
        .triple("?order", ":amount", "?amount")
        .select("?c")
        .select_agg(AggregateFunction::Avg, false, "?amount", "?avg")
        .select_agg(AggregateFunction::Min, false, "?amount", "?low")
        .select_agg(AggregateFunction::Max, false, "?amount", "?high")
        .select_agg(AggregateFunction::Sample, false, "?amount", "?any")
        .group_by("?c")
        .order_by("?c")
        .build();

    let rows = rows_of(&store, &query, &["c", "avg", "low", "high", "any"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], ex("ada"));
    assert_eq!(rows[0][1], int(20));
    assert_eq!(rows[0][2], int(10));
    assert_eq!(rows[0][3], int(30));
    assert_eq!(rows[0][4], int(10));
    assert_eq!(rows[1][0], ex("bo"));
    assert_eq!(rows[1][1], int(5));
}

#[test]
fn test_avg_emits_decimal_for_fractional_mean() {
    let mut store = MemoryQuadStore::new();
    store.insert_triple(ex("x"), ex("v"), int(1));
    store.insert_triple(ex("x"), ex("v"), int(2));

    let query = builder()
        .triple("?s", ":v", "?v")
        .select_agg(AggregateFunction::Avg, false, "?v", "?mean")
        .build();
    let rows = rows_of(&store, &query, &["mean"]);
    assert_eq!(rows, vec![vec![decimal("1.5")]]);
}

#[test]
fn test_sum_mixes_decimal_inputs() {
    let mut store = MemoryQuadStore::new();
    store.insert_triple(ex("x"), ex("v"), decimal("0.1"));
    store.insert_triple(ex("x"), ex("v"), decimal("0.2"));

    let query = builder()
        .triple("?s", ":v", "?v")
        .select_agg(AggregateFunction::Sum, false, "?v", "?total")
        .build();
    // Decimal-track addition, no float drift.
    let rows = rows_of(&store, &query, &["total"]);
    assert_eq!(rows, vec![vec![decimal("0.3")]]);
}

#[test]
fn test_count_star_counts_rows() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":customer", "?c")
        .select_agg(AggregateFunction::Count, false, "*", "?n")
        .build();
    let rows = rows_of(&store, &query, &["n"]);
    assert_eq!(rows, vec![vec![int(3)]]);
}

#[test]
fn test_group_by_expression_alias() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":amount", "?amount")
        .select_agg(AggregateFunction::Count, false, "?order", "?n")
        .group_by_as("?amount > 9", "?big")
        .order_by_desc("?n")
        .build();

    let rows = rows_of(&store, &query, &["big", "n"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0],
        vec![
            "\"true\"^^<http://www.w3.org/2001/XMLSchema#boolean>".to_owned(),
            int(2)
        ]
    );
    assert_eq!(
        rows[1],
        vec![
            "\"false\"^^<http://www.w3.org/2001/XMLSchema#boolean>".to_owned(),
            int(1)
        ]
    );
}

#[test]
fn test_having_conjuncts_all_apply() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":customer", "?c")
        .triple("?order", ":amount", "?amount")
        .select("?c")
        .select_agg(AggregateFunction::Sum, false, "?amount", "?total")
        .group_by("?c")
        .having("(SUM(?amount) > 6) (COUNT(?order) > 1)")
        .build();

    let rows = rows_of(&store, &query, &["c", "total"]);
    // bo clears neither conjunct; ada clears both.
    assert_eq!(rows, vec![vec![ex("ada"), int(40)]]);
}

#[test]
fn test_having_without_matching_select_aggregate() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":customer", "?c")
        .select("?c")
        .group_by("?c")
        .having("COUNT(?order) > 1")
        .build();

    let rows = rows_of(&store, &query, &["c"]);
    assert_eq!(rows, vec![vec![ex("ada")]]);
}

#[test]
fn test_order_by_two_keys() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":customer", "?c")
        .triple("?order", ":amount", "?amount")
        .order_by_desc("?c")
        .order_by("?amount")
        .build();

    let rows = rows_of(&store, &query, &["c", "amount"]);
    assert_eq!(
        rows,
        vec![
            vec![ex("bo"), int(5)],
            vec![ex("ada"), int(10)],
            vec![ex("ada"), int(30)],
        ]
    );
}

#[test]
fn test_order_by_expression_key() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":amount", "?amount")
        .order_by_desc("?amount * 2")
        .limit(1)
        .build();
    let rows = rows_of(&store, &query, &["amount"]);
    assert_eq!(rows, vec![vec![int(30)]]);
}

#[test]
fn test_distinct_after_order_by() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":customer", "?c")
        .select("?c")
        .order_by("?c")
        .distinct()
        .build();
    let rows = rows_of(&store, &query, &["c"]);
    assert_eq!(rows, vec![vec![ex("ada")], vec![ex("bo")]]);
}

#[test]
fn test_offset_past_end_yields_nothing() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":customer", "?c")
        .offset(10)
        .build();
    let rows = rows_of(&store, &query, &["c"]);
    assert!(rows.is_empty());
}

#[test]
fn test_limit_zero() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":customer", "?c")
        .limit(0)
        .build();
    let rows = rows_of(&store, &query, &["c"]);
    assert!(rows.is_empty());
}

#[test]
fn test_limit_bounds_group_output() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":customer", "?c")
        .select("?c")
        .select_agg(AggregateFunction::Count, false, "?order", "?n")
        .group_by("?c")
        .order_by("?c")
        .limit(1)
        .build();
    let rows = rows_of(&store, &query, &["c", "n"]);
    assert_eq!(rows, vec![vec![ex("ada"), int(2)]]);
}

#[test]
fn test_filter_interacts_with_grouping() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":customer", "?c")
        .triple("?order", ":amount", "?amount")
        .filter("?amount >= 10")
        .select("?c")
        .select_agg(AggregateFunction::Count, false, "?order", "?n")
        .group_by("?c")
        .build();
    // bo's only order is filtered out before grouping, so its group
    // never forms.
    let rows = rows_of(&store, &query, &["c", "n"]);
    assert_eq!(rows, vec![vec![ex("ada"), int(2)]]);
}

#[test]
fn test_group_concat_distinct() {
    let mut store = MemoryQuadStore::new();
    store.insert_triple(ex("s"), ex("tag"), "red".to_owned());
    store.insert_triple(ex("t"), ex("tag"), "red".to_owned());
    store.insert_triple(ex("s"), ex("tag"), "blue".to_owned());

    let query = builder()
        .triple("?s", ":tag", "?tag")
        .select_group_concat(true, "?tag", "|", "?tags")
        .build();
    let rows = rows_of(&store, &query, &["tags"]);
    assert_eq!(rows, vec![vec!["red|blue".to_owned()]]);
}

#[test]
fn test_sample_is_first_observed() {
    let store = orders_store();
    let query = builder()
        .triple("?order", ":amount", "?amount")
        .select_agg(AggregateFunction::Sample, false, "?amount", "?one")
        .build();
    let rows = rows_of(&store, &query, &["one"]);
    assert_eq!(rows, vec![vec![int(10)]]);
}

#[test]
fn test_min_max_keep_exact_typed_literals() {
    let mut store = MemoryQuadStore::new();
    store.insert_triple(ex("s"), ex("v"), decimal("2.50"));
    store.insert_triple(ex("s"), ex("v"), int(7));

    let query = builder()
        .triple("?s", ":v", "?v")
        .select_agg(AggregateFunction::Min, false, "?v", "?low")
        .select_agg(AggregateFunction::Max, false, "?v", "?high")
        .build();
    let rows = rows_of(&store, &query, &["low", "high"]);
    // The original literals come back verbatim, datatype included.
    assert_eq!(rows, vec![vec![decimal("2.50"), int(7)]]);
}
