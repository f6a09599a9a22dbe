use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use catsearch::catalog::Catalog;
use catsearch::client::HttpCatalogClient;
use catsearch::codec::with_default_suffix;
use catsearch::config::{ConfigLoader, timeout_from_secs};
use catsearch::domain::FrequencyRange;
use catsearch::downloader::save_catalog;
use catsearch::error::CatsearchError;
use catsearch::filter::FilterCriteria;
use catsearch::output::{CatalogReport, JsonOutput, TextOutput};

#[derive(Parser)]
#[command(name = "catsearch")]
#[command(about = "Search and build offline JPL/CDMS spectral-line catalogs")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download the catalog and save it")]
    Download(DownloadArgs),
    #[command(about = "Search saved catalogs")]
    Search(SearchArgs),
    #[command(about = "Describe saved catalogs")]
    Info(InfoArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// Output file; `.json.gz` is appended without a known suffix
    path: PathBuf,

    /// MHz
    #[arg(long, default_value_t = 0.0)]
    min_frequency: f64,

    /// MHz
    #[arg(long, default_value_t = f64::INFINITY)]
    max_frequency: f64,

    #[arg(long)]
    concurrency: Option<usize>,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// MHz
    #[arg(long)]
    min_frequency: Option<f64>,
    /// MHz
    #[arg(long)]
    max_frequency: Option<f64>,
    /// log10(nm²·MHz)
    #[arg(long, allow_negative_numbers = true)]
    min_intensity: Option<f64>,
    /// log10(nm²·MHz)
    #[arg(long, allow_negative_numbers = true)]
    max_intensity: Option<f64>,
    /// K
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    species_tag: Option<i64>,
    #[arg(long)]
    inchi: Option<String>,
    #[arg(long)]
    trivial_name: Option<String>,
    #[arg(long)]
    structural_formula: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    stoichiometric_formula: Option<String>,
    #[arg(long)]
    isotopolog: Option<String>,
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    degrees_of_freedom: Option<i8>,
    #[arg(long)]
    any_name: Option<String>,
    #[arg(long)]
    any_formula: Option<String>,
    #[arg(long)]
    any_name_or_formula: Option<String>,
    /// Seconds
    #[arg(long)]
    timeout: Option<f64>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct InfoArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatsearchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatsearchError) -> u8 {
    match error {
        CatsearchError::UnknownCodec(_)
        | CatsearchError::ConfigRead(_)
        | CatsearchError::ConfigParse(_) => 2,
        CatsearchError::Connection { .. }
        | CatsearchError::Http { .. }
        | CatsearchError::HttpStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Download(args) => {
            let mut downloader_config = config.downloader;
            if let Some(concurrency) = args.concurrency {
                downloader_config.concurrency = concurrency.max(1);
            }
            let path = with_default_suffix(&args.path);
            let client = Arc::new(HttpCatalogClient::new(&downloader_config)?);
            let range = FrequencyRange::new(args.min_frequency, args.max_frequency);
            let catalog = save_catalog(&path, client, &downloader_config, range)?;
            println!(
                "saved {} species to {}",
                catalog.entries_count(),
                path.display()
            );
            Ok(())
        }
        Commands::Search(args) => {
            let catalog = Catalog::load(&args.paths);
            let timeout = args
                .timeout
                .and_then(timeout_from_secs)
                .or(config.search_timeout);
            let criteria = FilterCriteria {
                min_frequency: args.min_frequency,
                max_frequency: args.max_frequency,
                min_intensity: args.min_intensity,
                max_intensity: args.max_intensity,
                temperature: args.temperature,
                species_tag: args.species_tag,
                inchi: args.inchi,
                trivial_name: args.trivial_name,
                structural_formula: args.structural_formula,
                name: args.name,
                stoichiometric_formula: args.stoichiometric_formula,
                isotopolog: args.isotopolog,
                state: args.state,
                degrees_of_freedom: args.degrees_of_freedom,
                any_name: args.any_name,
                any_formula: args.any_formula,
                any_name_or_formula: args.any_name_or_formula,
                timeout,
            };
            let found = catalog.filter(&criteria);
            if args.json {
                JsonOutput::print_entries(&found).into_diagnostic()?;
            } else {
                TextOutput::print_entries(&found).into_diagnostic()?;
            }
            Ok(())
        }
        Commands::Info(args) => {
            let report = CatalogReport::new(&Catalog::load(&args.paths));
            if args.json {
                JsonOutput::print_report(&report).into_diagnostic()?;
            } else {
                TextOutput::print_report(&report).into_diagnostic()?;
            }
            Ok(())
        }
    }
}
