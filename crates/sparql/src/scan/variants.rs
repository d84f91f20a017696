//! Materialized-input scans
//!
//! Scans whose input rows were materialized out of a scan lifetime: the
//! rows of an inner sub-select and the rows a SERVICE clause produced.
//! Both yield their rows with compatibility-join semantics against any
//! pre-existing bindings: a shared variable must agree, a fresh variable
//! is introduced.

use crate::bindings::{BindingTable, MaterializedRow};
use crate::query::var_name;
use crate::service::ServiceResultRow;
use crate::EngineError;

/// Scan over the materialized rows of an inner sub-select.
pub(crate) struct SubqueryScan {
    rows: Vec<MaterializedRow>,
    next: usize,
    initial_count: usize,
}

impl SubqueryScan {
    pub(crate) fn new(rows: Vec<MaterializedRow>, bindings: &BindingTable) -> Self {
        Self {
            rows,
            next: 0,
            initial_count: bindings.count(),
        }
    }

    pub(crate) fn move_next(
        &mut self,
        bindings: &mut BindingTable,
    ) -> Result<bool, EngineError> {
        bindings.truncate_to(self.initial_count);
        while self.next < self.rows.len() {
            let row = &self.rows[self.next];
            self.next += 1;
            if apply_row(bindings, &row.hashes, &row.values)? {
                return Ok(true);
            }
            bindings.truncate_to(self.initial_count);
        }
        Ok(false)
    }
}

fn apply_row(
    bindings: &mut BindingTable,
    hashes: &[u32],
    values: &[String],
) -> Result<bool, EngineError> {
    for (hash, value) in hashes.iter().zip(values) {
        match bindings.find_by_hash(*hash) {
            Some(i) => {
                if bindings.get(i) != value {
                    return Ok(false);
                }
            }
            None => bindings.bind_with_hash(*hash, value)?,
        }
    }
    Ok(true)
}

/// Scan over pre-materialized SERVICE result rows.
pub(crate) struct ServicePatternScan {
    rows: Vec<ServiceResultRow>,
    next: usize,
    initial_count: usize,
}

impl ServicePatternScan {
    pub(crate) fn new(rows: Vec<ServiceResultRow>, bindings: &BindingTable) -> Self {
        Self {
            rows,
            next: 0,
            initial_count: bindings.count(),
        }
    }

    pub(crate) fn move_next(
        &mut self,
        bindings: &mut BindingTable,
    ) -> Result<bool, EngineError> {
        bindings.truncate_to(self.initial_count);
        while self.next < self.rows.len() {
            let row = &self.rows[self.next];
            self.next += 1;
            if apply_service_row(bindings, row)? {
                return Ok(true);
            }
            bindings.truncate_to(self.initial_count);
        }
        Ok(false)
    }
}

/// Extend bindings from one service row; shared variables must agree.
pub(crate) fn apply_service_row(
    bindings: &mut BindingTable,
    row: &ServiceResultRow,
) -> Result<bool, EngineError> {
    for (var, value) in &row.columns {
        let name = var_name(var);
        match bindings.find(name) {
            Some(i) => {
                if bindings.get(i) != value {
                    return Ok(false);
                }
            }
            None => bindings.bind(name, value)?,
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> MaterializedRow {
        MaterializedRow {
            hashes: pairs
                .iter()
                .map(|(n, _)| crate::bindings::hash_name(n))
                .collect(),
            values: pairs.iter().map(|(_, v)| (*v).to_owned()).collect(),
        }
    }

    #[test]
    fn test_subquery_scan_yields_rows() {
        let rows = vec![row(&[("x", "1")]), row(&[("x", "2")])];
        let mut bindings = BindingTable::new();
        let mut scan = SubqueryScan::new(rows, &bindings);

        assert!(scan.move_next(&mut bindings).unwrap());
        assert_eq!(bindings.value_of("x"), Some("1"));
        assert!(scan.move_next(&mut bindings).unwrap());
        assert_eq!(bindings.value_of("x"), Some("2"));
        assert!(!scan.move_next(&mut bindings).unwrap());
        assert_eq!(bindings.count(), 0);
    }

    #[test]
    fn test_subquery_scan_compatibility_join() {
        let rows = vec![row(&[("x", "1"), ("y", "10")]), row(&[("x", "2"), ("y", "20")])];
        let mut bindings = BindingTable::new();
        bindings.bind("x", "2").unwrap();

        let mut scan = SubqueryScan::new(rows, &bindings);
        assert!(scan.move_next(&mut bindings).unwrap());
        assert_eq!(bindings.value_of("y"), Some("20"));
        assert!(!scan.move_next(&mut bindings).unwrap());
        assert_eq!(bindings.count(), 1);
    }

    #[test]
    fn test_service_scan_compatibility_join() {
        let rows = vec![
            ServiceResultRow {
                columns: vec![("s".to_owned(), "<urn:a>".to_owned())],
            },
            ServiceResultRow {
                columns: vec![("s".to_owned(), "<urn:b>".to_owned())],
            },
        ];
        let mut bindings = BindingTable::new();
        bindings.bind("s", "<urn:b>").unwrap();

        let mut scan = ServicePatternScan::new(rows, &bindings);
        assert!(scan.move_next(&mut bindings).unwrap());
        assert!(!scan.move_next(&mut bindings).unwrap());
    }
}
