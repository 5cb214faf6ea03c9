use serde_json::Value;
use tracing::warn;

use crate::{strip_prefix_trim, OPENALEX_ID_PREFIX};

/// Parse one `funders` cell into short OpenAlex funder ids.
///
/// Handles both serializations the upstream exports produce: a JSON array of
/// objects carrying an `id` field, and a `" | "`-delimited string of URIs.
/// Empty cells and malformed JSON yield an empty list (the row itself is
/// preserved either way).
pub fn parse_funder_ids(cell: &str) -> Vec<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed == "[]" {
        return Vec::new();
    }

    if trimmed.starts_with('[') {
        return match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.get("id").and_then(Value::as_str))
                .map(|id| strip_prefix_trim(id, OPENALEX_ID_PREFIX))
                .collect(),
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!("funders cell JSON parse failed: {e}");
                Vec::new()
            }
        };
    }

    trimmed
        .split(" | ")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| strip_prefix_trim(v, OPENALEX_ID_PREFIX))
        .collect()
}
