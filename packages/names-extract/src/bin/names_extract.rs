//! names-extract: build `<category>-<YYYYMMDD>.csv.gz` from the latest
//! Wikidata entities dump.
//!
//! Usage:
//!   names-extract --dumps /public/dumps/public --workdir /data/names
//!   names-extract --category givennames=Q202444 --force --verbose

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use names_extract::dump::{find_entities_dump, should_run};
use names_extract::hierarchy::{DEFAULT_SPARQL_ENDPOINT, DEFAULT_USER_AGENT};
use names_extract::{
    default_categories, open_dump, Category, ExtractConfig, Extractor, ResourceManager,
    SparqlSubclassQuery, TuningProfile,
};

const MB: usize = 1024 * 1024;

/// Extract given names and family names from a Wikidata entities dump
#[derive(Parser, Debug)]
#[command(name = "names-extract", version)]
struct Args {
    /// Root of the dumps mirror (contains wikidatawiki/entities/)
    #[arg(long, default_value = "/public/dumps/public")]
    dumps: PathBuf,

    /// Directory receiving the CSV outputs
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Output category as <name>=<Qid> (repeatable; default familynames and givennames)
    #[arg(long = "category", value_parser = parse_category)]
    categories: Vec<Category>,

    /// Run even if all outputs for the latest dump already exist
    #[arg(long)]
    force: bool,

    /// SPARQL endpoint for class hierarchy lookups
    #[arg(long, default_value = DEFAULT_SPARQL_ENDPOINT)]
    sparql_endpoint: String,

    /// In-memory sort buffer per category, in MB (default: sized from available memory)
    #[arg(long)]
    sort_buffer_mb: Option<usize>,

    /// Log debug output
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn parse_category(s: &str) -> Result<Category, String> {
    s.parse().map_err(|e: names_extract::ExtractError| e.to_string())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "names_extract=debug,info" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn run(args: Args) -> anyhow::Result<()> {
    let categories = if args.categories.is_empty() {
        default_categories()
    } else {
        args.categories
    };

    let (date, dump_path) = find_entities_dump(&args.dumps)
        .with_context(|| format!("locating entities dump under {}", args.dumps.display()))?;
    info!(date = %date, dump = %dump_path.display(), "found entities dump");

    if !args.force && !should_run(date, &args.workdir, &categories)? {
        info!(date = %date, "outputs already exist, nothing to do");
        return Ok(());
    }
    std::fs::create_dir_all(&args.workdir)
        .with_context(|| format!("creating {}", args.workdir.display()))?;

    let profile = match args.sort_buffer_mb {
        Some(mb) => TuningProfile::with_buffer_bytes(mb.saturating_mul(MB)),
        None => ResourceManager::auto_tune(categories.len()),
    };
    let config = ExtractConfig {
        workdir: args.workdir,
        categories,
        sort: profile.to_sort_config(),
        ..Default::default()
    };

    let query = SparqlSubclassQuery::new(args.sparql_endpoint, DEFAULT_USER_AGENT)
        .context("building SPARQL client")?;
    let entities = open_dump(&dump_path)?;

    let summary = match Extractor::new(config, query).run(date, entities) {
        Ok(summary) => summary,
        Err(e) => bail!("extraction failed [{}]: {}", e.code(), e),
    };
    for output in &summary.outputs {
        info!(
            category = %output.category,
            path = %output.path.display(),
            records = output.stats.records_written,
            spills = output.stats.sort.spills,
            "output ready"
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
