use anyhow::{anyhow, ensure, Context, Result};
use rust_xlsxwriter::Workbook;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::warn;

/// Spreadsheet cell rendering of a JSON value: scalars as themselves, nested
/// lists/objects as compact JSON, null as the empty string.
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// A column-ordered frame of JSON cells. The in-memory shape every workflow
/// assembles before export.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    /// Insert a column at `idx` holding the same value in every row.
    pub fn insert_const_column(&mut self, idx: usize, name: &str, value: Value) {
        debug_assert!(idx <= self.columns.len());
        self.columns.insert(idx, name.to_string());
        for row in &mut self.rows {
            row.insert(idx, value.clone());
        }
    }

    /// Drop rows whose key cell repeats an earlier row's, keeping the first
    /// occurrence.
    pub fn dedup_by_key(&mut self, key: &str) -> Result<()> {
        let idx = self
            .column_index(key)
            .ok_or_else(|| anyhow!("missing column: {key}"))?;
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(cell_to_string(&row[idx])));
        Ok(())
    }

    /// First-match left join. Every left row survives; unmatched right-side
    /// columns are null-filled. Right columns already present on the left
    /// (and the right key itself) are not carried over.
    pub fn left_join(&self, right: &Table, left_key: &str, right_key: &str) -> Result<Table> {
        let lk = self
            .column_index(left_key)
            .ok_or_else(|| anyhow!("missing column: {left_key}"))?;
        let rk = right
            .column_index(right_key)
            .ok_or_else(|| anyhow!("missing column: {right_key}"))?;

        let carried: Vec<usize> = right
            .columns
            .iter()
            .enumerate()
            .filter(|(i, name)| {
                if *i == rk {
                    return false;
                }
                if self.columns.contains(name) {
                    warn!(column = %name, "skipping duplicate column in join");
                    return false;
                }
                true
            })
            .map(|(i, _)| i)
            .collect();

        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, row) in right.rows.iter().enumerate() {
            let key = cell_to_string(&row[rk]);
            if !key.is_empty() {
                index.entry(key).or_insert(i);
            }
        }

        let mut columns = self.columns.clone();
        columns.extend(carried.iter().map(|&i| right.columns[i].clone()));
        let mut joined = Table::new(columns);

        for row in &self.rows {
            let mut new_row = row.clone();
            match index.get(&cell_to_string(&row[lk])) {
                Some(&ri) => new_row.extend(carried.iter().map(|&i| right.rows[ri][i].clone())),
                None => new_row.extend(carried.iter().map(|_| Value::Null)),
            }
            joined.rows.push(new_row);
        }

        Ok(joined)
    }

    /// Append another frame's columns side by side. Row counts must match —
    /// this is the order- and count-preserving guarantee enrichment relies on.
    pub fn hconcat(&mut self, other: Table) -> Result<()> {
        ensure!(
            self.rows.len() == other.rows.len(),
            "row count mismatch: {} vs {}",
            self.rows.len(),
            other.rows.len()
        );
        for name in &other.columns {
            ensure!(!self.columns.contains(name), "duplicate column: {name}");
        }
        self.columns.extend(other.columns);
        for (row, extra) in self.rows.iter_mut().zip(other.rows) {
            row.extend(extra);
        }
        Ok(())
    }

    /// Prefix URL cells with an apostrophe so spreadsheet applications treat
    /// them as text instead of hyperlinks; nulls become empty strings.
    pub fn coerce_url_columns(&mut self, names: &[&str]) {
        for name in names {
            let Some(idx) = self.column_index(name) else {
                continue;
            };
            for row in &mut self.rows {
                row[idx] = match &row[idx] {
                    Value::Null => Value::String(String::new()),
                    value => Value::String(format!("'{}", cell_to_string(value))),
                };
            }
        }
    }

    /// Append rows to a durable CSV checkpoint, writing the header only when
    /// the file is new. Quotes every field.
    pub fn append_csv(&self, path: &Path) -> Result<()> {
        let write_header = !path.exists() || fs::metadata(path)?.len() == 0;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(file);
        if write_header {
            writer.write_record(&self.columns)?;
        }
        for row in &self.rows {
            writer.write_record(row.iter().map(cell_to_string))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reload a CSV checkpoint. Empty cells become null; numeric cells are
    /// re-typed so the spreadsheet export keeps them as numbers.
    pub fn read_csv(path: &Path) -> Result<Table> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let columns: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record?;
            let row = record.iter().map(parse_csv_cell).collect();
            table.push_row(row);
        }
        Ok(table)
    }

    pub fn write_xlsx(&self, path: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        for (c, name) in self.columns.iter().enumerate() {
            worksheet.write_string(0, c as u16, name.as_str())?;
        }
        for (r, row) in self.rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                let (row_idx, col_idx) = ((r + 1) as u32, c as u16);
                match value {
                    Value::Null => {}
                    Value::String(s) => {
                        worksheet.write_string(row_idx, col_idx, s.as_str())?;
                    }
                    Value::Number(n) => {
                        if let Some(f) = n.as_f64() {
                            worksheet.write_number(row_idx, col_idx, f)?;
                        }
                    }
                    Value::Bool(b) => {
                        worksheet.write_boolean(row_idx, col_idx, *b)?;
                    }
                    other => {
                        let text = other.to_string();
                        worksheet.write_string(row_idx, col_idx, text.as_str())?;
                    }
                }
            }
        }

        workbook
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

fn parse_csv_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(cell.to_string())
}
