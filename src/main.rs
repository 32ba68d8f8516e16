use clap::{ArgGroup, Parser};
use tracing::warn;

use schedule_scraper::http::{HttpClient, ReqwestHttp};
use schedule_scraper::logging;
use schedule_scraper::orchestrator::Orchestrator;
use schedule_scraper::output::{CsvSink, ScheduleSink};
use schedule_scraper::parsers::Dispatcher;
use schedule_scraper::registry::{InMemoryRegistry, SiteRegistry};
use schedule_scraper::resolver::VenueAddressResolver;

use chrono::{Datelike, Utc};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "schedule_scraper")]
#[command(about = "Concurrent schedule scraper for external league sites")]
#[command(version = "0.1.0")]
#[command(group(ArgGroup::new("scope").required(true).args(["sites", "all", "overdue"])))]
struct Cli {
    /// Specific sites to scrape (comma-separated site names)
    #[arg(long, value_delimiter = ',')]
    sites: Option<Vec<String>>,

    /// Scrape all enabled sites
    #[arg(long)]
    all: bool,

    /// Scrape only sites that are due per their scrape frequency
    #[arg(long)]
    overdue: bool,

    /// Worker pool size (clamped to 1..=20)
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Target month (1-12); defaults to the current month
    #[arg(long)]
    month: Option<u32>,

    /// Target year; defaults to the current year
    #[arg(long)]
    year: Option<i32>,

    /// CSV output path; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    /// Record newly observed location strings for later address mapping
    #[arg(long)]
    import_locations: bool,

    /// Site definitions file
    #[arg(long, default_value = "sites.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let cli = Cli::parse();

    let now = Utc::now();
    let month = cli.month.unwrap_or_else(|| now.month());
    let year = cli.year.unwrap_or_else(|| now.year());
    if !(1..=12).contains(&month) {
        return Err(format!("invalid month: {}", month).into());
    }

    let registry = Arc::new(InMemoryRegistry::from_toml_file(&cli.config)?);

    let sites = if let Some(names) = &cli.sites {
        let mut selected = Vec::new();
        for name in names {
            match registry.get_site(name).await? {
                Some(site) => selected.push(site),
                None => {
                    warn!(site = %name, "unknown site name");
                    println!("⚠️  Unknown site: {}", name);
                }
            }
        }
        selected
    } else if cli.all {
        registry.get_all_enabled().await?
    } else {
        registry.get_due_for_scraping(now).await?
    };

    if sites.is_empty() {
        println!("Nothing to scrape");
        return Ok(());
    }

    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttp::new());
    let resolver = Arc::new(VenueAddressResolver::new(Arc::clone(&http)));
    let dispatcher = Arc::new(Dispatcher::new(http, resolver));
    let sink: Arc<dyn ScheduleSink> = match &cli.output {
        Some(path) => Arc::new(CsvSink::to_path(path)?),
        None => Arc::new(CsvSink::to_stdout()?),
    };

    println!(
        "🚀 Scraping {} site(s) with {} worker(s) for {}/{}",
        sites.len(),
        cli.workers.clamp(1, schedule_scraper::orchestrator::MAX_WORKERS),
        month,
        year
    );

    let orchestrator = Orchestrator::new(dispatcher, registry, sink)
        .with_location_import(cli.import_locations);
    let summary = orchestrator.run(sites, cli.workers, month, year).await;

    println!("\n📊 Scrape results:");
    println!("   Succeeded: {}", summary.success);
    println!("   Failed: {}", summary.failed);

    Ok(())
}
