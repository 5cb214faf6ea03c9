use anyhow::{ensure, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::client::{ApiConfig, OpenAlexClient, RequestPolicy, WorksQuery};
use crate::flatten::flatten_records;
use crate::table::Table;
use crate::{short_openalex_id, strip_url_scheme};

mod columns;
pub use columns::{brief_column_set, full_column_set, BRIEF_COLUMNS, FULL_COLUMNS, URL_COLUMNS};

#[derive(Args)]
pub struct HarvestArgs {
    /// Calendar year to harvest
    #[arg(short, long)]
    pub year: i32,

    /// Institution to harvest, as ID=Name (repeatable)
    #[arg(short, long = "institution", value_parser = parse_institution, required = true)]
    pub institutions: Vec<(String, String)>,

    /// Contact email for the polite pool
    #[arg(short, long)]
    pub mailto: String,

    /// Optional OpenAlex API key
    #[arg(long)]
    pub api_key: Option<String>,

    /// Output spreadsheet path (.xlsx)
    #[arg(short, long)]
    pub output: PathBuf,

    /// OpenAlex API base URL
    #[arg(short = 'u', long, default_value = "https://api.openalex.org")]
    pub base_url: String,

    /// Results per page
    #[arg(short, long, default_value = "200")]
    pub per_page: usize,

    /// Export only the brief column set in a single pass per institution
    #[arg(long)]
    pub brief: bool,
}

fn parse_institution(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((id, name)) if !id.trim().is_empty() => {
            Ok((id.trim().to_string(), name.trim().to_string()))
        }
        _ => Err("expected ID=Name".to_string()),
    }
}

fn quarters(year: i32) -> [(&'static str, String, String); 4] {
    [
        ("Q1", format!("{year}-01-01"), format!("{year}-03-31")),
        ("Q2", format!("{year}-04-01"), format!("{year}-06-30")),
        ("Q3", format!("{year}-07-01"), format!("{year}-09-30")),
        ("Q4", format!("{year}-10-01"), format!("{year}-12-31")),
    ]
}

fn shorten_work_id(mut record: Value) -> Value {
    if let Some(obj) = record.as_object_mut() {
        let id = obj.get("id").and_then(Value::as_str).map(String::from);
        if let Some(short) = short_openalex_id(id.as_deref()) {
            obj.insert("id".to_string(), Value::String(short));
        }
    }
    record
}

fn strip_doi_scheme(mut record: Value) -> Value {
    if let Some(obj) = record.as_object_mut() {
        let doi = obj.get("doi").and_then(Value::as_str).map(String::from);
        if let Some(stripped) = strip_url_scheme(doi.as_deref()) {
            obj.insert("doi".to_string(), Value::String(stripped));
        }
    }
    record
}

pub fn run(args: HarvestArgs) -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(args))
}

pub async fn run_async(args: HarvestArgs) -> Result<()> {
    ensure!(
        args.output.extension().is_some_and(|e| e == "xlsx"),
        "output path must end in .xlsx"
    );

    let config = ApiConfig::new(
        args.base_url.clone(),
        args.mailto.clone(),
        args.api_key.clone(),
        args.per_page,
    )?;
    let client = OpenAlexClient::new(config, RequestPolicy::default())?;

    if args.brief {
        run_brief(&client, &args).await
    } else {
        run_full(&client, &args).await
    }
}

/// Quarterly institution harvest: every slice is appended to a CSV checkpoint
/// as soon as it is flattened, so an abort partway through keeps the pages
/// already fetched. The checkpoint is converted to XLSX and removed once the
/// harvest completes.
async fn run_full(client: &OpenAlexClient, args: &HarvestArgs) -> Result<()> {
    let column_set = full_column_set()?;
    let csv_path = args.output.with_extension("csv");
    if csv_path.exists() {
        fs::remove_file(&csv_path)
            .with_context(|| format!("failed to remove stale {}", csv_path.display()))?;
    }

    let slice_count = args.institutions.len() * 4 * 2;
    let pb = ProgressBar::new(slice_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let mut total_harvested = 0usize;
    let mut total_queries = 0u32;

    for (inst_id, inst_name) in &args.institutions {
        for (label, start, end) in quarters(args.year) {
            for is_oa in [true, false] {
                let filter = format!(
                    "from_publication_date:{start},to_publication_date:{end},\
                     authorships.institutions.lineage:{inst_id},open_access.is_oa:{is_oa}"
                );
                let harvest = client
                    .fetch_all_pages(&WorksQuery {
                        filter,
                        select: None,
                    })
                    .await?;
                total_queries += harvest.pages_fetched;
                info!(
                    institution = %inst_name,
                    quarter = label,
                    is_oa,
                    works = harvest.results.len(),
                    "harvested slice"
                );
                pb.inc(1);
                if harvest.results.is_empty() {
                    continue;
                }

                let records: Vec<Value> =
                    harvest.results.into_iter().map(shorten_work_id).collect();
                let mut slice = flatten_records(&records, &column_set);
                slice.insert_const_column(0, "InstitutionID", Value::String(inst_id.clone()));
                slice.insert_const_column(0, "Institution", Value::String(inst_name.clone()));
                slice.dedup_by_key("id")?;
                total_harvested += slice.len();
                slice.append_csv(&csv_path)?;
            }
        }
    }

    pb.finish_with_message("Done");
    info!(total_queries, total_harvested, "harvest complete");

    if !csv_path.exists() {
        info!("no works harvested, nothing to export");
        return Ok(());
    }

    let mut full = Table::read_csv(&csv_path)?;
    full.coerce_url_columns(URL_COLUMNS);
    full.write_xlsx(&args.output)?;
    fs::remove_file(&csv_path)
        .with_context(|| format!("failed to remove checkpoint {}", csv_path.display()))?;
    info!(output = %args.output.display(), "export complete");

    Ok(())
}

/// Single pass per institution over the whole year, exporting the short
/// column set. DOIs keep their host but lose the scheme, for matching against
/// other bibliographic exports downstream.
async fn run_brief(client: &OpenAlexClient, args: &HarvestArgs) -> Result<()> {
    let column_set = brief_column_set()?;
    let mut records: Vec<Value> = Vec::new();
    let mut total_queries = 0u32;

    for (inst_id, inst_name) in &args.institutions {
        let filter = format!(
            "authorships.institutions.lineage:{inst_id},publication_year:{}",
            args.year
        );
        let harvest = client
            .fetch_all_pages(&WorksQuery {
                filter,
                select: None,
            })
            .await?;
        total_queries += harvest.pages_fetched;
        info!(
            institution = %inst_name,
            works = harvest.results.len(),
            "harvested institution"
        );
        records.extend(
            harvest
                .results
                .into_iter()
                .map(shorten_work_id)
                .map(strip_doi_scheme),
        );
    }

    info!(total_queries, results = records.len(), "harvest complete");

    let mut table = flatten_records(&records, &column_set);
    table.dedup_by_key("id")?;
    table.write_xlsx(&args.output)?;
    info!(output = %args.output.display(), "export complete");

    Ok(())
}
