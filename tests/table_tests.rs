use openalex_harvest::table::{cell_to_string, Table};
use serde_json::{json, Value};
use tempfile::TempDir;

fn sample_table() -> Table {
    let mut table = Table::new(vec!["id".into(), "count".into(), "note".into()]);
    table.push_row(vec![json!("W1"), json!(5), json!("hello")]);
    table.push_row(vec![json!("W2"), Value::Null, Value::Null]);
    table
}

#[test]
fn test_left_join_preserves_left_row_count() {
    let mut left = Table::new(vec!["cited_paper_id".into(), "citing_paper_id".into()]);
    left.push_row(vec![json!("W10"), json!("W1")]);
    left.push_row(vec![json!("W11"), json!("W1")]);
    left.push_row(vec![json!("W10"), json!("W2")]);

    let mut right = Table::new(vec!["work_id".into(), "title".into()]);
    right.push_row(vec![json!("W10"), json!("Alpha")]);

    let joined = left.left_join(&right, "cited_paper_id", "work_id").unwrap();

    assert_eq!(joined.len(), 3);
    assert_eq!(joined.columns(), &["cited_paper_id", "citing_paper_id", "title"]);
    assert_eq!(joined.get(0, "title"), Some(&json!("Alpha")));
    // Unmatched left rows survive with nulls.
    assert_eq!(joined.get(1, "title"), Some(&Value::Null));
    assert_eq!(joined.get(2, "title"), Some(&json!("Alpha")));
}

#[test]
fn test_left_join_skips_columns_already_present() {
    let mut left = Table::new(vec!["id".into(), "title".into()]);
    left.push_row(vec![json!("W1"), json!("Alpha")]);

    let mut right = Table::new(vec!["id".into(), "title".into(), "year".into()]);
    right.push_row(vec![json!("W1"), json!("Other"), json!(2024)]);

    let joined = left.left_join(&right, "id", "id").unwrap();

    assert_eq!(joined.columns(), &["id", "title", "year"]);
    assert_eq!(joined.get(0, "title"), Some(&json!("Alpha")));
    assert_eq!(joined.get(0, "year"), Some(&json!(2024)));
}

#[test]
fn test_dedup_by_key_keeps_first_occurrence() {
    let mut table = Table::new(vec!["id".into(), "title".into()]);
    table.push_row(vec![json!("W1"), json!("first")]);
    table.push_row(vec![json!("W2"), json!("second")]);
    table.push_row(vec![json!("W1"), json!("duplicate")]);

    table.dedup_by_key("id").unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.get(0, "title"), Some(&json!("first")));
}

#[test]
fn test_csv_checkpoint_roundtrip_appends_header_once() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("checkpoint.csv");

    sample_table().append_csv(&path).unwrap();

    let mut second = Table::new(vec!["id".into(), "count".into(), "note".into()]);
    second.push_row(vec![json!("W3"), json!(1.5), json!("[\"x\"]")]);
    second.append_csv(&path).unwrap();

    let reloaded = Table::read_csv(&path).unwrap();

    assert_eq!(reloaded.columns(), &["id", "count", "note"]);
    assert_eq!(reloaded.len(), 3);
    // Numeric cells are re-typed on reload; empty cells become null.
    assert_eq!(reloaded.get(0, "count"), Some(&json!(5)));
    assert_eq!(reloaded.get(1, "count"), Some(&Value::Null));
    assert_eq!(reloaded.get(2, "count"), Some(&json!(1.5)));
    assert_eq!(reloaded.get(2, "note"), Some(&json!("[\"x\"]")));
}

#[test]
fn test_coerce_url_columns_defeats_autolinking() {
    let mut table = Table::new(vec!["id".into(), "doi".into()]);
    table.push_row(vec![json!("W1"), json!("https://doi.org/10.1/x")]);
    table.push_row(vec![json!("W2"), Value::Null]);

    table.coerce_url_columns(&["doi", "not_a_column"]);

    assert_eq!(table.get(0, "doi"), Some(&json!("'https://doi.org/10.1/x")));
    assert_eq!(table.get(1, "doi"), Some(&json!("")));
}

#[test]
fn test_hconcat_requires_matching_row_counts() {
    let mut base = sample_table();

    let mut extras = Table::new(vec!["extra".into()]);
    extras.push_row(vec![json!("only one row")]);
    assert!(base.hconcat(extras).is_err());

    let mut extras = Table::new(vec!["extra".into()]);
    extras.push_row(vec![json!("a")]);
    extras.push_row(vec![json!("b")]);
    base.hconcat(extras).unwrap();

    assert_eq!(base.columns(), &["id", "count", "note", "extra"]);
    assert_eq!(base.get(1, "extra"), Some(&json!("b")));
}

#[test]
fn test_insert_const_column() {
    let mut table = sample_table();
    table.insert_const_column(0, "Institution", json!("Example University"));

    assert_eq!(table.columns()[0], "Institution");
    assert_eq!(table.get(1, "Institution"), Some(&json!("Example University")));
    assert_eq!(table.get(0, "id"), Some(&json!("W1")));
}

#[test]
fn test_write_xlsx_produces_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("out.xlsx");

    let mut table = sample_table();
    table.push_row(vec![json!("W3"), json!(2.5), json!({"k": "v"})]);
    table.write_xlsx(&path).unwrap();

    assert!(path.exists());
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
}

#[test]
fn test_cell_to_string_renders_nested_values_as_json() {
    assert_eq!(cell_to_string(&Value::Null), "");
    assert_eq!(cell_to_string(&json!("x")), "x");
    assert_eq!(cell_to_string(&json!(3)), "3");
    assert_eq!(cell_to_string(&json!(true)), "true");
    assert_eq!(cell_to_string(&json!(["a", "b"])), r#"["a","b"]"#);
}
