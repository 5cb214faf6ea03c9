use anyhow::{anyhow, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::client::{ApiConfig, OpenAlexClient, RequestPolicy, WorksQuery};
use crate::table::Table;
use crate::{short_openalex_id, strip_prefix_trim, OPENALEX_ID_PREFIX};

/// Fields needed to build the citation-edge and metadata tables.
pub const CITED_SELECT: &str = "id,doi,publication_year,title,primary_location,authorships,topics";

pub const METADATA_COLUMNS: &[&str] = &[
    "work_id",
    "title",
    "doi",
    "citation_count",
    "source_id",
    "source_issn",
    "source_display_name",
    "source_host_organization",
    "source_host_organization_name",
    "primary_topic_id",
    "primary_topic_display_name",
];

#[derive(Args)]
pub struct CitedArgs {
    /// Input CSV with an `id` column of OpenAlex work ids
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

    /// Results per page
    #[arg(short, long, default_value = "100")]
    pub per_page: usize,
}

/// Read work ids from the input CSV. The header match is case-insensitive and
/// values are trimmed; long-form URIs are normalized to short ids. Rows with
/// an empty id cell are logged and skipped.
pub fn read_work_ids(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let id_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("id"))
        .ok_or_else(|| anyhow!("input file has no 'id' column"))?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record?;
        match record.get(id_idx).map(str::trim) {
            Some(value) if !value.is_empty() => {
                if let Some(short) = short_openalex_id(Some(value)) {
                    ids.push(short);
                }
            }
            _ => warn!("skipping row without a work id"),
        }
    }
    Ok(ids)
}

/// Build the citation-edge table and the deduplicated metadata table from the
/// per-work harvests. Every cited occurrence counts toward the citation
/// tally, including works titled "Deleted Work", which are excluded from the
/// metadata table only.
pub fn build_tables(references: &[(String, Vec<Value>)]) -> (Table, Table) {
    let mut edges = Table::new(vec![
        "citing_paper_id".to_string(),
        "cited_paper_id".to_string(),
    ]);
    let mut tallies: HashMap<String, i64> = HashMap::new();

    for (citing_id, cited_works) in references {
        for work in cited_works {
            if let Some(cited_id) = work.get("id").and_then(Value::as_str) {
                edges.push_row(vec![
                    Value::String(citing_id.clone()),
                    Value::String(strip_prefix_trim(cited_id, OPENALEX_ID_PREFIX)),
                ]);
                *tallies.entry(cited_id.to_string()).or_insert(0) += 1;
            }
        }
    }

    let mut metadata = Table::new(METADATA_COLUMNS.iter().map(|s| s.to_string()).collect());
    let mut seen: HashSet<String> = HashSet::new();

    for (_, cited_works) in references {
        for work in cited_works {
            let Some(work_id) = work.get("id").and_then(Value::as_str) else {
                continue;
            };
            if work.get("title").and_then(Value::as_str) == Some("Deleted Work") {
                continue;
            }
            if !seen.insert(work_id.to_string()) {
                continue;
            }

            let count = tallies.get(work_id).copied().unwrap_or(0);
            let source = work.pointer("/primary_location/source");
            let topic = work.pointer("/topics/0");

            metadata.push_row(vec![
                Value::String(strip_prefix_trim(work_id, OPENALEX_ID_PREFIX)),
                field(work, "title"),
                field(work, "doi"),
                Value::from(count),
                short_id_field(source, "id"),
                opt_field(source, "issn_l"),
                opt_field(source, "display_name"),
                opt_field(source, "host_organization"),
                opt_field(source, "host_organization_name"),
                short_id_field(topic, "id"),
                opt_field(topic, "display_name"),
            ]);
        }
    }

    (edges, metadata)
}

fn field(record: &Value, name: &str) -> Value {
    match record.get(name) {
        Some(Value::Null) | None => Value::Null,
        Some(value) => value.clone(),
    }
}

fn opt_field(parent: Option<&Value>, name: &str) -> Value {
    match parent.and_then(|p| p.get(name)) {
        Some(Value::Null) | None => Value::Null,
        Some(value) => value.clone(),
    }
}

fn short_id_field(parent: Option<&Value>, name: &str) -> Value {
    match parent.and_then(|p| p.get(name)).and_then(Value::as_str) {
        Some(id) => Value::String(strip_prefix_trim(id, OPENALEX_ID_PREFIX)),
        None => Value::Null,
    }
}

pub fn run(args: CitedArgs) -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(args))
}

pub async fn run_async(args: CitedArgs) -> Result<()> {
    let config = ApiConfig::new(args.base_url, args.mailto, args.api_key, args.per_page)?;
    let client = OpenAlexClient::new(config, RequestPolicy::default())?;

    let work_ids = read_work_ids(&args.input)?;
    info!(works = work_ids.len(), "loaded input works");
    if work_ids.is_empty() {
        info!("no works to collect");
        return Ok(());
    }

    let pb = ProgressBar::new(work_ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let mut references: Vec<(String, Vec<Value>)> = Vec::with_capacity(work_ids.len());
    let mut total_queries = 0u32;
    let mut total_retrieved = 0usize;

    for work_id in work_ids {
        let harvest = client
            .fetch_all_pages(&WorksQuery {
                filter: format!("cited_by:{work_id}"),
                select: Some(CITED_SELECT.to_string()),
            })
            .await?;
        total_queries += harvest.pages_fetched;
        total_retrieved += harvest.results.len();
        references.push((work_id, harvest.results));
        pb.inc(1);
    }
    pb.finish_with_message("Done");

    info!(total_queries, total_retrieved, "citation harvest complete");

    let (edges, metadata) = build_tables(&references);
    let combined = edges.left_join(&metadata, "cited_paper_id", "work_id")?;
    combined.write_xlsx(&args.output)?;
    info!(
        rows = combined.len(),
        output = %args.output.display(),
        "export complete"
    );

    Ok(())
}
