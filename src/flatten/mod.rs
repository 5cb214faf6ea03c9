use anyhow::{ensure, Result};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use crate::table::Table;

/// Inverted-index abstracts dominate payload size and are never exported.
pub const EXCLUDED_FIELD: &str = "abstract_inverted_index";

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub column: String,
    pub path: Vec<String>,
}

impl ColumnSpec {
    /// `primary_location.source.issn_l` -> path segments, column name kept dotted.
    pub fn from_dotted(dotted: &str) -> Self {
        Self {
            column: dotted.to_string(),
            path: dotted.split('.').map(String::from).collect(),
        }
    }
}

/// The declared output columns for one flattening pass, validated once up
/// front rather than re-derived per record.
#[derive(Debug, Clone)]
pub struct ColumnSet {
    specs: Vec<ColumnSpec>,
}

impl ColumnSet {
    pub fn new(specs: Vec<ColumnSpec>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.path.iter().any(|segment| segment == EXCLUDED_FIELD) {
                warn!(column = %spec.column, "dropping bulk field from declared columns");
                continue;
            }
            ensure!(
                seen.insert(spec.column.clone()),
                "duplicate output column: {}",
                spec.column
            );
            kept.push(spec);
        }
        Ok(Self { specs: kept })
    }

    pub fn from_dotted(names: &[&str]) -> Result<Self> {
        Self::new(names.iter().map(|n| ColumnSpec::from_dotted(n)).collect())
    }

    pub fn columns(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.column.clone()).collect()
    }

    pub fn specs(&self) -> &[ColumnSpec] {
        &self.specs
    }
}

/// Walk a nested path through one record. `None` for any absent segment.
pub fn extract_path<'a>(record: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = record;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Project records onto the declared column set, one row per record. Every
/// declared column exists in every row; missing paths become null.
pub fn flatten_records(records: &[Value], columns: &ColumnSet) -> Table {
    let mut table = Table::new(columns.columns());
    for record in records {
        let row = columns
            .specs()
            .iter()
            .map(|spec| match extract_path(record, &spec.path) {
                Some(Value::Null) | None => Value::Null,
                Some(value) => value.clone(),
            })
            .collect();
        table.push_row(row);
    }
    table
}
