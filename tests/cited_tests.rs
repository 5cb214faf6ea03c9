use openalex_harvest::cited::{build_tables, read_work_ids};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

fn cited_work_alpha() -> Value {
    json!({
        "id": "https://openalex.org/W10",
        "title": "Alpha",
        "doi": "https://doi.org/10.1/a",
        "primary_location": {
            "source": {
                "id": "https://openalex.org/S1",
                "issn_l": "1234-5678",
                "display_name": "Journal of Examples",
                "host_organization": "https://openalex.org/P1",
                "host_organization_name": "Example Press"
            }
        },
        "topics": [
            {"id": "https://openalex.org/T1", "display_name": "Examples"},
            {"id": "https://openalex.org/T2", "display_name": "Secondary"}
        ]
    })
}

fn cited_work_deleted() -> Value {
    json!({
        "id": "https://openalex.org/W11",
        "title": "Deleted Work"
    })
}

#[test]
fn test_build_tables_counts_and_dedupes() {
    let references = vec![
        (
            "W1".to_string(),
            vec![cited_work_alpha(), cited_work_deleted()],
        ),
        ("W2".to_string(), vec![cited_work_alpha()]),
    ];

    let (edges, metadata) = build_tables(&references);

    // One edge per citation, cited ids normalized short.
    assert_eq!(edges.len(), 3);
    assert_eq!(edges.get(0, "citing_paper_id"), Some(&json!("W1")));
    assert_eq!(edges.get(0, "cited_paper_id"), Some(&json!("W10")));
    assert_eq!(edges.get(1, "cited_paper_id"), Some(&json!("W11")));

    // Alpha appears once despite being cited twice; the tally says twice.
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata.get(0, "work_id"), Some(&json!("W10")));
    assert_eq!(metadata.get(0, "citation_count"), Some(&json!(2)));
    assert_eq!(metadata.get(0, "source_id"), Some(&json!("S1")));
    assert_eq!(
        metadata.get(0, "source_display_name"),
        Some(&json!("Journal of Examples"))
    );
    assert_eq!(metadata.get(0, "primary_topic_id"), Some(&json!("T1")));
}

#[test]
fn test_deleted_work_excluded_from_metadata_but_tallied() {
    let references = vec![("W1".to_string(), vec![cited_work_deleted()])];

    let (edges, metadata) = build_tables(&references);

    // Still a citation edge, never a metadata row.
    assert_eq!(edges.len(), 1);
    assert!(metadata.is_empty());
}

#[test]
fn test_metadata_absent_fields_become_null() {
    let bare = json!({"id": "https://openalex.org/W12", "title": "Bare"});
    let references = vec![("W1".to_string(), vec![bare])];

    let (_, metadata) = build_tables(&references);

    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata.get(0, "doi"), Some(&Value::Null));
    assert_eq!(metadata.get(0, "source_issn"), Some(&Value::Null));
    assert_eq!(metadata.get(0, "primary_topic_display_name"), Some(&Value::Null));
}

#[test]
fn test_join_preserves_edge_rows() {
    let references = vec![(
        "W1".to_string(),
        vec![cited_work_alpha(), cited_work_deleted()],
    )];
    let (edges, metadata) = build_tables(&references);

    let combined = edges.left_join(&metadata, "cited_paper_id", "work_id").unwrap();

    assert_eq!(combined.len(), 2);
    assert_eq!(combined.get(0, "title"), Some(&json!("Alpha")));
    // The deleted work keeps its edge with null metadata.
    assert_eq!(combined.get(1, "title"), Some(&Value::Null));
}

#[test]
fn test_read_work_ids_normalizes_and_skips_blanks() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("works.csv");
    fs::write(
        &path,
        "Title,ID\nAlpha,https://openalex.org/W1\nBlank,\nBeta, W2 \n",
    )
    .unwrap();

    let ids = read_work_ids(&path).unwrap();

    assert_eq!(ids, vec!["W1", "W2"]);
}

#[test]
fn test_read_work_ids_requires_id_column() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("works.csv");
    fs::write(&path, "Title,DOI\nAlpha,10.1/x\n").unwrap();

    assert!(read_work_ids(&path).is_err());
}
