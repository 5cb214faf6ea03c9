pub mod cited;
pub mod client;
pub mod dois;
pub mod enrich;
pub mod flatten;
pub mod harvest;
pub mod table;

pub const OPENALEX_ID_PREFIX: &str = "https://openalex.org/";
pub const DOI_PREFIX: &str = "https://doi.org/";
pub const ROR_PREFIX: &str = "https://ror.org/";

pub(crate) fn strip_prefix_trim(value: &str, prefix: &str) -> String {
    let trimmed = value.trim();
    trimmed.strip_prefix(prefix).unwrap_or(trimmed).to_string()
}

/// Strip the OpenAlex namespace from a work/funder/institution URI.
/// Already-short ids pass through unchanged.
pub fn short_openalex_id(value: Option<&str>) -> Option<String> {
    value.map(|v| strip_prefix_trim(v, OPENALEX_ID_PREFIX))
}

/// Strip the doi.org resolver prefix, leaving the bare DOI.
pub fn short_doi(value: Option<&str>) -> Option<String> {
    value.map(|v| strip_prefix_trim(v, DOI_PREFIX))
}

/// Strip only the URL scheme, keeping the host (e.g. `doi.org/10.1/x`).
pub fn strip_url_scheme(value: Option<&str>) -> Option<String> {
    value.map(|v| strip_prefix_trim(v, "https://"))
}

/// Strip the ror.org namespace from an organization URI.
pub fn clean_ror_id(value: Option<&str>) -> Option<String> {
    value.map(|v| strip_prefix_trim(v, ROR_PREFIX))
}

/// Last path segment of a GeoNames resource URI (the numeric geonames id).
pub fn geonames_id_from_uri(uri: &str) -> Option<String> {
    uri.trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(String::from)
}
