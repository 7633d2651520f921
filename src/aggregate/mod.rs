// src/aggregate/mod.rs

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::AggregateError;
use crate::parse::RowSet;

/// Every row of every row-set expressed against the union of their columns.
/// `None` marks a column the row's own row-set did not have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl OutputTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in `row`; `None` if absent or unknown.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }
}

/// Collects row-sets, tracking the first-seen order of column names, and
/// materialises the padded table in a second pass.
#[derive(Debug, Default)]
pub struct TableBuilder<'a> {
    columns: Vec<String>,
    seen: HashSet<&'a str>,
    sets: Vec<&'a RowSet>,
}

impl<'a> TableBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, set: &'a RowSet) {
        for col in set.columns() {
            if self.seen.insert(col.as_str()) {
                self.columns.push(col.clone());
            }
        }
        self.sets.push(set);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn finish(self) -> Result<OutputTable, AggregateError> {
        if self.sets.is_empty() {
            return Err(AggregateError::NoData);
        }

        let total: usize = self.sets.iter().map(|s| s.len()).sum();
        let mut rows = Vec::with_capacity(total);

        for set in &self.sets {
            // a header repeating a name maps to its first occurrence
            let mut positions: HashMap<&str, usize> = HashMap::new();
            for (i, col) in set.columns().iter().enumerate() {
                positions.entry(col.as_str()).or_insert(i);
            }
            let layout: Vec<Option<usize>> = self
                .columns
                .iter()
                .map(|c| positions.get(c.as_str()).copied())
                .collect();

            for row in set.rows() {
                rows.push(layout.iter().map(|p| p.map(|i| row[i].clone())).collect());
            }
        }

        debug!(
            sets = self.sets.len(),
            columns = self.columns.len(),
            rows = rows.len(),
            "aggregated"
        );
        Ok(OutputTable {
            columns: self.columns,
            rows,
        })
    }
}

/// Union every row-set, in order, into one table.
pub fn aggregate(sets: &[RowSet]) -> Result<OutputTable, AggregateError> {
    let mut builder = TableBuilder::new();
    for set in sets {
        builder.push(set);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rs(cols: &[&str], rows: &[&[&str]]) -> RowSet {
        RowSet::new(
            cols.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn unions_columns_in_first_seen_order() {
        let sets = vec![
            rs(&["A", "B"], &[&["a1", "b1"]]),
            rs(&["B", "C"], &[&["b2", "c2"]]),
        ];
        let table = aggregate(&sets).unwrap();

        assert_eq!(table.columns(), ["A", "B", "C"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "A"), Some("a1"));
        assert_eq!(table.value(0, "C"), None);
        assert_eq!(table.rows()[0][2], None);
        assert_eq!(table.value(1, "A"), None);
        assert_eq!(table.value(1, "B"), Some("b2"));
        assert_eq!(table.value(1, "C"), Some("c2"));
    }

    #[test]
    fn preserves_arrival_order_of_rows() {
        let sets = vec![
            rs(&["id"], &[&["3"], &["1"]]),
            rs(&["id"], &[&["2"]]),
        ];
        let table = aggregate(&sets).unwrap();
        let ids: Vec<_> = (0..table.len()).map(|i| table.value(i, "id").unwrap()).collect();
        assert_eq!(ids, ["3", "1", "2"]);
    }

    #[test]
    fn reordered_columns_are_realigned() {
        let sets = vec![rs(&["A", "B"], &[&["1", "2"]]), rs(&["B", "A"], &[&["4", "3"]])];
        let table = aggregate(&sets).unwrap();
        assert_eq!(table.columns(), ["A", "B"]);
        assert_eq!(table.value(1, "A"), Some("3"));
        assert_eq!(table.value(1, "B"), Some("4"));
    }

    #[test]
    fn repeated_header_uses_first_occurrence() {
        let sets = vec![rs(&["A", "A"], &[&["first", "second"]])];
        let table = aggregate(&sets).unwrap();
        assert_eq!(table.columns(), ["A"]);
        assert_eq!(table.value(0, "A"), Some("first"));
    }

    #[test]
    fn no_row_sets_is_no_data() {
        assert_eq!(aggregate(&[]), Err(AggregateError::NoData));
    }

    #[test]
    fn empty_row_sets_give_empty_table_not_no_data() {
        let sets = vec![RowSet::default(), rs(&["A"], &[])];
        let table = aggregate(&sets).unwrap();
        assert_eq!(table.columns(), ["A"]);
        assert!(table.is_empty());
    }

    #[test]
    fn aggregating_twice_is_identical() {
        let sets = vec![
            rs(&["A", "B"], &[&["1", "2"], &["3", "4"]]),
            rs(&["C"], &[&["5"]]),
        ];
        assert_eq!(aggregate(&sets).unwrap(), aggregate(&sets).unwrap());
    }

    #[test]
    fn builder_exposes_columns_while_streaming() {
        let a = rs(&["x"], &[]);
        let b = rs(&["y", "x"], &[]);
        let mut builder = TableBuilder::new();
        builder.push(&a);
        assert_eq!(builder.columns(), ["x"]);
        builder.push(&b);
        assert_eq!(builder.columns(), ["x", "y"]);
    }
}
