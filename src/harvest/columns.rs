use anyhow::Result;

use crate::flatten::ColumnSet;

/// Output columns for the full institutional harvest. Top-level fields come
/// through as-is (nested lists/objects export as JSON strings); the dotted
/// entries are the sub-structures worth first-class columns. The raw
/// `primary_location`, `open_access`, `apc_*` and `primary_topic` objects are
/// deliberately not declared, so only their flattened projections appear.
pub const FULL_COLUMNS: &[&str] = &[
    "id",
    "doi",
    "title",
    "display_name",
    "publication_year",
    "publication_date",
    "ids",
    "language",
    "type",
    "indexed_in",
    "authorships",
    "corresponding_author_ids",
    "corresponding_institution_ids",
    "fwci",
    "cited_by_count",
    "citation_normalized_percentile",
    "cited_by_percentile_year",
    "biblio",
    "is_retracted",
    "is_paratext",
    "topics",
    "keywords",
    "concepts",
    "mesh",
    "locations_count",
    "locations",
    "best_oa_location",
    "sustainable_development_goals",
    "grants",
    "funders",
    "referenced_works_count",
    "referenced_works",
    "related_works",
    "counts_by_year",
    "updated_date",
    "created_date",
    "primary_location.is_oa",
    "primary_location.landing_page_url",
    "primary_location.source.display_name",
    "primary_location.source.issn_l",
    "primary_location.source.is_oa",
    "primary_location.source.is_in_doaj",
    "primary_location.source.host_organization_name",
    "primary_location.source.host_organization_lineage_names",
    "primary_location.source.type",
    "primary_location.is_accepted",
    "primary_location.is_published",
    "open_access.is_oa",
    "open_access.oa_status",
    "open_access.any_repository_has_fulltext",
    "apc_list.value_usd",
    "apc_paid.value_usd",
    "primary_topic.display_name",
    "primary_topic.subfield.display_name",
    "primary_topic.field.display_name",
    "primary_topic.domain.display_name",
];

pub const BRIEF_COLUMNS: &[&str] = &[
    "id",
    "doi",
    "title",
    "display_name",
    "corresponding_institution_ids",
];

/// Columns rewritten as text at export so spreadsheets don't auto-link them.
pub const URL_COLUMNS: &[&str] = &["doi", "primary_location.landing_page_url"];

pub fn full_column_set() -> Result<ColumnSet> {
    ColumnSet::from_dotted(FULL_COLUMNS)
}

pub fn brief_column_set() -> Result<ColumnSet> {
    ColumnSet::from_dotted(BRIEF_COLUMNS)
}
