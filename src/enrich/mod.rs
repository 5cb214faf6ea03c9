use anyhow::{anyhow, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, warn};
use urlencoding::encode;

use crate::client::{ApiConfig, FetchError, OpenAlexClient, RequestPolicy};
use crate::table::{cell_to_string, Table};
use crate::{clean_ror_id, geonames_id_from_uri, short_doi};

mod parser;
mod registries;
pub use parser::parse_funder_ids;
pub use registries::{Lookup, RegistryCache, RegistryEndpoints};

use registries::resolve;

/// Enrichment output columns, in export order.
pub const ENRICHMENT_COLUMNS: &[&str] = &[
    "OpenAlex_Funder_IDs",
    "OpenAlex_DisplayName",
    "OpenAlex_AlternateTitles",
    "OpenAlex_CountryCode",
    "OpenAlex_Description",
    "OpenAlex_HomepageURL",
    "OpenAlex_ROR",
    "FunderDOI",
    "ROR_Types",
    "ROR_Locations",
    "ROR_CountryCode",
    "ROR_Lat",
    "ROR_Long",
    "ROR_City",
    "Crossref_Country",
    "Crossref_Name",
    "Crossref_Type",
    "Crossref_Subtype",
    "Crossref_Region",
    "Crossref_StateURI",
    "Crossref_StateName",
    "Crossref_StateCountry",
];

/// Enrichment columns text-coerced before export.
pub const URL_COLUMNS: &[&str] = &["OpenAlex_HomepageURL", "ROR_Locations", "Crossref_StateURI"];

#[derive(Args)]
pub struct FundersArgs {
    /// Input CSV carrying a funders column
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

    /// GeoNames web-service username
    #[arg(short, long)]
    pub geonames_username: String,

    /// OpenAlex API base URL
    #[arg(short = 'u', long, default_value = "https://api.openalex.org")]
    pub base_url: String,

    /// ROR API base URL
    #[arg(long, default_value = "https://api.ror.org")]
    pub ror_base_url: String,

    /// Crossref funder-registry base URL
    #[arg(long, default_value = "https://data.crossref.org")]
    pub crossref_base_url: String,

    /// GeoNames API base URL
    #[arg(long, default_value = "http://api.geonames.org")]
    pub geonames_base_url: String,

    /// Name of the input column holding funder ids
    #[arg(long, default_value = "funders")]
    pub funders_column: String,
}

/// Resolves funder-id bundles across OpenAlex, ROR, the Crossref funder
/// registry and GeoNames, memoizing every lookup for the lifetime of one run.
pub struct Enricher {
    client: OpenAlexClient,
    endpoints: RegistryEndpoints,
    cache: RegistryCache,
}

impl Enricher {
    pub fn new(client: OpenAlexClient, endpoints: RegistryEndpoints) -> Self {
        Self {
            client,
            endpoints,
            cache: RegistryCache::default(),
        }
    }

    pub fn cache(&self) -> &RegistryCache {
        &self.cache
    }

    async fn funder(&mut self, funder_id: &str) -> Lookup {
        if let Some(hit) = self.cache.funders.get(funder_id) {
            return hit.clone();
        }
        let outcome = match self.client.fetch_one(&format!("funders/{funder_id}"), None).await {
            Ok(value) => Lookup::Found(value),
            Err(FetchError::Status { status: 404, .. }) => Lookup::Absent,
            Err(e) => {
                warn!(funder_id, error = %e, "funder lookup failed");
                Lookup::Failed(e.to_string())
            }
        };
        self.cache.funders.insert(funder_id.to_string(), outcome.clone());
        outcome
    }

    /// Enrich one input row's funder bundle into the 22 output cells.
    /// Multi-valued results are pipe-joined per column; a consumer splits on
    /// `" | "` to recover individual values.
    pub async fn enrich_row(&mut self, funders_cell: &str) -> Vec<Value> {
        let funder_ids = parse_funder_ids(funders_cell);

        let mut display_names = Vec::new();
        let mut alternate_titles = Vec::new();
        let mut country_codes = Vec::new();
        let mut descriptions = Vec::new();
        let mut homepage_urls = Vec::new();
        let mut ror_ids = Vec::new();
        let mut funder_dois = Vec::new();

        for funder_id in &funder_ids {
            let lookup = self.funder(funder_id).await;
            let Some(data) = lookup.value() else { continue };

            push_field(&mut display_names, data.get("display_name"));
            push_joined_array(&mut alternate_titles, data.get("alternate_titles"));
            push_field(&mut country_codes, data.get("country_code"));
            push_field(&mut descriptions, data.get("description"));
            push_field(&mut homepage_urls, data.get("homepage_url"));
            if let Some(ror) = clean_ror_id(data.pointer("/ids/ror").and_then(Value::as_str)) {
                ror_ids.push(ror);
            }
            if let Some(doi) = short_doi(data.pointer("/ids/doi").and_then(Value::as_str)) {
                funder_dois.push(doi);
            }
        }

        let mut ror_types = Vec::new();
        let mut ror_country = Vec::new();
        let mut ror_lat = Vec::new();
        let mut ror_lng = Vec::new();
        let mut ror_city = Vec::new();
        let mut ror_locations = Vec::new();

        for ror_id in &ror_ids {
            let url = format!(
                "{}/v2/organizations/{}",
                self.endpoints.ror_base,
                encode(ror_id)
            );
            let lookup = resolve(&self.client, &mut self.cache.ror, "ror", ror_id, url).await;
            let Some(data) = lookup.value() else { continue };

            push_joined_array(&mut ror_types, data.get("types"));
            if let Some(location) = data
                .get("locations")
                .and_then(Value::as_array)
                .and_then(|l| l.first())
            {
                push_field(&mut ror_country, location.pointer("/geonames_details/country_code"));
                push_field(&mut ror_lat, location.pointer("/geonames_details/lat"));
                push_field(&mut ror_lng, location.pointer("/geonames_details/lng"));
                push_field(&mut ror_city, location.get("name"));
                push_field(&mut ror_locations, location.get("url"));
            }
        }

        let mut crossref_country = Vec::new();
        let mut crossref_names = Vec::new();
        let mut crossref_types = Vec::new();
        let mut crossref_subtypes = Vec::new();
        let mut crossref_regions = Vec::new();
        let mut state_uris = Vec::new();
        let mut state_names = Vec::new();
        let mut state_countries = Vec::new();

        for doi in &funder_dois {
            let url = format!("{}/fundingdata/funder/{}", self.endpoints.crossref_base, doi);
            let lookup = resolve(&self.client, &mut self.cache.crossref, "crossref", doi, url).await;
            let Some(data) = lookup.value() else { continue };

            push_field(&mut crossref_country, data.pointer("/address/postalAddress/addressCountry"));
            push_field(&mut crossref_names, data.pointer("/prefLabel/Label/literalForm/content"));
            push_field(&mut crossref_types, data.get("fundingBodyType"));
            push_field(&mut crossref_subtypes, data.get("fundingBodySubType"));
            push_field(&mut crossref_regions, data.get("region"));

            let state_uri = data
                .pointer("/state/resource")
                .and_then(Value::as_str)
                .map(String::from);
            let Some(uri) = state_uri else { continue };
            state_uris.push(uri.clone());

            let Some(geonames_id) = geonames_id_from_uri(&uri) else {
                continue;
            };
            let url = format!(
                "{}/getJSON?geonameId={}&username={}",
                self.endpoints.geonames_base,
                encode(&geonames_id),
                encode(&self.endpoints.geonames_username)
            );
            let lookup = resolve(&self.client, &mut self.cache.geonames, "geonames", &uri, url).await;
            if let Some(geo) = lookup.value() {
                push_field(&mut state_names, geo.get("name"));
                push_field(&mut state_countries, geo.get("countryCode"));
            }
        }

        vec![
            join_pipe(&funder_ids),
            join_pipe(&display_names),
            join_pipe(&alternate_titles),
            join_pipe(&country_codes),
            join_pipe(&descriptions),
            join_pipe(&homepage_urls),
            join_pipe(&ror_ids),
            join_pipe(&funder_dois),
            join_pipe(&ror_types),
            join_pipe(&ror_locations),
            join_pipe(&ror_country),
            join_pipe(&ror_lat),
            join_pipe(&ror_lng),
            join_pipe(&ror_city),
            join_pipe(&crossref_country),
            join_pipe(&crossref_names),
            join_pipe(&crossref_types),
            join_pipe(&crossref_subtypes),
            join_pipe(&crossref_regions),
            join_pipe(&state_uris),
            join_pipe(&state_names),
            join_pipe(&state_countries),
        ]
    }
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn push_field(acc: &mut Vec<String>, value: Option<&Value>) {
    if let Some(value) = value {
        if !value.is_null() {
            let display = value_to_display(value);
            if !display.is_empty() {
                acc.push(display);
            }
        }
    }
}

/// String arrays (alternate titles, organization types) collapse to one
/// comma-joined entry before the pipe join.
fn push_joined_array(acc: &mut Vec<String>, value: Option<&Value>) {
    if let Some(items) = value.and_then(Value::as_array) {
        let joined = items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(",");
        if !joined.is_empty() {
            acc.push(joined);
        }
    }
}

pub fn join_pipe(values: &[String]) -> Value {
    let joined = values
        .iter()
        .filter(|v| !v.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" | ");
    if joined.is_empty() {
        Value::Null
    } else {
        Value::String(joined)
    }
}

pub fn run(args: FundersArgs) -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(args))
}

pub async fn run_async(args: FundersArgs) -> Result<()> {
    let config = ApiConfig::new(args.base_url, args.mailto, args.api_key, 100)?;
    let client = OpenAlexClient::new(config, RequestPolicy::default())?;
    let endpoints = RegistryEndpoints {
        ror_base: args.ror_base_url.trim_end_matches('/').to_string(),
        crossref_base: args.crossref_base_url.trim_end_matches('/').to_string(),
        geonames_base: args.geonames_base_url.trim_end_matches('/').to_string(),
        geonames_username: args.geonames_username.clone(),
    };
    let mut enricher = Enricher::new(client, endpoints);

    let mut input = Table::read_csv(&args.input)?;
    let original_row_count = input.len();
    let funders_idx = input
        .column_index(&args.funders_column)
        .ok_or_else(|| anyhow!("input file has no '{}' column", args.funders_column))?;
    info!(rows = original_row_count, "loaded input rows");

    let pb = ProgressBar::new(original_row_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let mut enrichment = Table::new(ENRICHMENT_COLUMNS.iter().map(|s| s.to_string()).collect());
    for row in input.rows() {
        let cell = cell_to_string(&row[funders_idx]);
        let values = enricher.enrich_row(&cell).await;
        enrichment.push_row(values);
        pb.inc(1);
    }
    pb.finish_with_message("Done");

    // Count- and order-preserving by construction; hconcat re-checks it.
    input.hconcat(enrichment)?;
    debug_assert_eq!(input.len(), original_row_count);

    input.coerce_url_columns(URL_COLUMNS);
    input.write_xlsx(&args.output)?;
    info!(
        rows = input.len(),
        cached_lookups = enricher.cache().len(),
        output = %args.output.display(),
        "export complete"
    );

    Ok(())
}
