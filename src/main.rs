use anyhow::Result;
use clap::{Parser, Subcommand};
use openalex_harvest::{cited, dois, enrich, harvest};

#[derive(Parser)]
#[command(name = "openalex-harvest")]
#[command(about = "Harvest OpenAlex works, flatten nested metadata, export spreadsheets")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest works for institutions over a calendar year
    Harvest(harvest::HarvestArgs),
    /// Harvest the works cited by an input list of works
    CitedWorks(cited::CitedArgs),
    /// Look up publication details for an input list of DOIs
    Dois(dois::DoisArgs),
    /// Enrich funder ids across OpenAlex, ROR, Crossref and GeoNames
    Funders(enrich::FundersArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }

    match cli.command {
        Commands::Harvest(args) => harvest::run(args),
        Commands::CitedWorks(args) => cited::run(args),
        Commands::Dois(args) => dois::run(args),
        Commands::Funders(args) => enrich::run(args),
    }
}
