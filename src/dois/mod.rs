use anyhow::{anyhow, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::client::{ApiConfig, FetchError, OpenAlexClient, RequestPolicy};
use crate::flatten::{flatten_records, ColumnSet};
use crate::short_doi;
use crate::table::Table;

pub const DOI_SELECT: &str = "id,doi,title,display_name,publication_year,type,\
corresponding_institution_ids,primary_location,open_access,apc_list,apc_paid,\
authorships,grants,primary_topic";

/// Top-level columns kept as-is; the nested objects these leave out are
/// re-joined through the flattened sub-frames below.
const BASE_COLUMNS: &[&str] = &[
    "id",
    "doi",
    "title",
    "display_name",
    "publication_year",
    "type",
    "corresponding_institution_ids",
    "authorships",
    "grants",
];

const PRIMARY_LOCATION_COLUMNS: &[&str] = &[
    "id",
    "primary_location.is_oa",
    "primary_location.landing_page_url",
    "primary_location.source.display_name",
    "primary_location.source.issn_l",
    "primary_location.source.issn",
    "primary_location.source.is_oa",
    "primary_location.source.is_in_doaj",
    "primary_location.source.host_organization_name",
    "primary_location.source.host_organization_lineage_names",
    "primary_location.source.type",
    "primary_location.is_accepted",
    "primary_location.is_published",
];

const OPEN_ACCESS_COLUMNS: &[&str] = &[
    "id",
    "open_access.is_oa",
    "open_access.oa_status",
    "open_access.any_repository_has_fulltext",
];

const APC_COLUMNS: &[&str] = &["id", "apc_list.value_usd", "apc_paid.value_usd"];

const PRIMARY_TOPIC_COLUMNS: &[&str] = &[
    "id",
    "primary_topic.display_name",
    "primary_topic.subfield.display_name",
    "primary_topic.field.display_name",
    "primary_topic.domain.display_name",
];

#[derive(Args)]
pub struct DoisArgs {
    /// Input CSV with a `doi` column
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output spreadsheet path (.xlsx)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Contact email for the polite pool
    #[arg(short, long)]
    pub mailto: String,

    /// Optional OpenAlex API key
    #[arg(long)]
    pub api_key: Option<String>,

    /// OpenAlex API base URL
    #[arg(short = 'u', long, default_value = "https://api.openalex.org")]
    pub base_url: String,
}

/// Read DOIs from the input CSV. Accepts long (`https://doi.org/...`) or bare
/// form; empty cells are logged and skipped.
pub fn read_dois(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let doi_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("doi"))
        .ok_or_else(|| anyhow!("input file has no 'doi' column"))?;

    let mut dois = Vec::new();
    for record in reader.records() {
        let record = record?;
        match record.get(doi_idx).map(str::trim) {
            Some(value) if !value.is_empty() => {
                if let Some(short) = short_doi(Some(value)) {
                    dois.push(short);
                }
            }
            _ => warn!("skipping row without a DOI"),
        }
    }
    Ok(dois)
}

/// Flatten fetched records into the base frame plus the per-substructure
/// sub-frames, joined back on `id` so the base row count never shrinks.
pub fn assemble(records: &[Value]) -> Result<Table> {
    let base_set = ColumnSet::from_dotted(BASE_COLUMNS)?;
    let mut merged = flatten_records(records, &base_set);
    merged.dedup_by_key("id")?;

    for sub_columns in [
        PRIMARY_LOCATION_COLUMNS,
        OPEN_ACCESS_COLUMNS,
        APC_COLUMNS,
        PRIMARY_TOPIC_COLUMNS,
    ] {
        let sub_set = ColumnSet::from_dotted(sub_columns)?;
        let mut sub = flatten_records(records, &sub_set);
        sub.dedup_by_key("id")?;
        merged = merged.left_join(&sub, "id", "id")?;
    }

    Ok(merged)
}

pub fn run(args: DoisArgs) -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(args))
}

pub async fn run_async(args: DoisArgs) -> Result<()> {
    let config = ApiConfig::new(args.base_url, args.mailto, args.api_key, 100)?;
    let client = OpenAlexClient::new(config, RequestPolicy::default())?;

    let dois = read_dois(&args.input)?;
    info!(dois = dois.len(), "loaded input DOIs");
    if dois.is_empty() {
        info!("no DOIs to look up");
        return Ok(());
    }

    let pb = ProgressBar::new(dois.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let mut records: Vec<Value> = Vec::with_capacity(dois.len());
    let mut not_found = 0usize;

    for doi in &dois {
        match client
            .fetch_one(&format!("works/doi:{doi}"), Some(DOI_SELECT))
            .await
        {
            Ok(record) => records.push(shorten_id(record)),
            Err(FetchError::Status { status: 404, .. }) => {
                warn!(doi = %doi, "no OpenAlex record, skipping");
                not_found += 1;
            }
            Err(e) => return Err(e.into()),
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done");

    info!(
        fetched = records.len(),
        not_found,
        "DOI lookups complete"
    );

    let table = assemble(&records)?;
    table.write_xlsx(&args.output)?;
    info!(
        rows = table.len(),
        output = %args.output.display(),
        "export complete"
    );

    Ok(())
}

fn shorten_id(mut record: Value) -> Value {
    if let Some(obj) = record.as_object_mut() {
        let id = obj.get("id").and_then(Value::as_str).map(String::from);
        if let Some(short) = crate::short_openalex_id(id.as_deref()) {
            obj.insert("id".to_string(), Value::String(short));
        }
    }
    record
}
