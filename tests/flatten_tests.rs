use openalex_harvest::flatten::{extract_path, flatten_records, ColumnSet};
use serde_json::{json, Value};

#[test]
fn test_flattening_is_column_total() {
    let records = vec![
        json!({
            "id": "W1",
            "title": "Alpha",
            "primary_location": {"source": {"issn_l": "1234-5678"}}
        }),
        json!({"id": "W2"}),
    ];
    let columns =
        ColumnSet::from_dotted(&["id", "title", "primary_location.source.issn_l"]).unwrap();

    let table = flatten_records(&records, &columns);

    assert_eq!(
        table.columns(),
        &["id", "title", "primary_location.source.issn_l"]
    );
    assert_eq!(table.len(), 2);
    // Every declared column exists in every row; absent paths are null.
    assert_eq!(table.get(0, "title"), Some(&json!("Alpha")));
    assert_eq!(
        table.get(0, "primary_location.source.issn_l"),
        Some(&json!("1234-5678"))
    );
    assert_eq!(table.get(1, "title"), Some(&Value::Null));
    assert_eq!(
        table.get(1, "primary_location.source.issn_l"),
        Some(&Value::Null)
    );
}

#[test]
fn test_nested_lists_survive_as_json_values() {
    let records = vec![json!({
        "id": "W1",
        "authorships": [{"author": {"display_name": "Doe, Jane"}}]
    })];
    let columns = ColumnSet::from_dotted(&["id", "authorships"]).unwrap();

    let table = flatten_records(&records, &columns);

    assert!(table.get(0, "authorships").unwrap().is_array());
}

#[test]
fn test_bulk_field_is_dropped_even_when_declared() {
    let columns = ColumnSet::from_dotted(&["id", "abstract_inverted_index", "title"]).unwrap();
    assert_eq!(columns.columns(), vec!["id", "title"]);

    let records = vec![json!({
        "id": "W1",
        "title": "Alpha",
        "abstract_inverted_index": {"Deep": [0], "learning": [1]}
    })];
    let table = flatten_records(&records, &columns);
    assert_eq!(table.columns(), &["id", "title"]);
}

#[test]
fn test_duplicate_columns_are_rejected() {
    assert!(ColumnSet::from_dotted(&["id", "id"]).is_err());
}

#[test]
fn test_extract_path_walks_nesting() {
    let record = json!({"a": {"b": {"c": 7}}});
    let path: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
    assert_eq!(extract_path(&record, &path), Some(&json!(7)));

    let missing: Vec<String> = vec!["a".into(), "x".into()];
    assert_eq!(extract_path(&record, &missing), None);
}
