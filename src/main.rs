use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use tokenledger::budget::{ChatMessage, RequestConfig, TokenBudgetCalculator};
use tokenledger::catalog::{CatalogConfig, CatalogFile, ModelCatalog};
use tokenledger::cost::{format_cost, UsageCostEstimator};
use tokenledger::usage::{export, LogSchema, LogStreamParser, PhaseInfo, UsageSummary, UsageTotals};
use tokenledger::Result;

/// Token budgets, usage cost and per-phase usage of multi-agent runs.
#[derive(Parser, Debug)]
#[command(name = "tokenledger")]
#[command(version)]
#[command(about = "Token budgets, usage cost and per-phase usage of multi-agent runs", long_about = None)]
struct Cli {
    /// TOML model catalog merged over the built-in models
    #[arg(long, global = true, value_name = "PATH")]
    catalog: Option<PathBuf>,

    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract phase-correlated usage records from a run log
    Parse {
        /// Run log to read
        log: PathBuf,

        /// Log has timestamped Send/Receive pairs
        #[arg(long)]
        timestamped: bool,

        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Csv)]
        format: ReportFormat,

        /// Write the report here instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Summarize token usage of a run log per phase and role
    Summary {
        /// Run log to read
        log: PathBuf,

        /// Log has timestamped Send/Receive pairs
        #[arg(long)]
        timestamped: bool,

        /// Price the usage at this model's rates
        #[arg(long)]
        model: Option<String>,
    },

    /// Compute max_completion_tokens for a list of chat messages
    Budget {
        /// Target model id
        #[arg(long)]
        model: String,

        /// JSON array of {role, content} messages
        #[arg(long, value_name = "PATH")]
        messages: PathBuf,
    },

    /// Price one exchange
    Cost {
        /// Model id
        #[arg(long)]
        model: String,

        #[arg(long)]
        prompt_tokens: u64,

        #[arg(long)]
        completion_tokens: u64,
    },

    /// Print the effective model catalog as TOML
    Catalog,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ReportFormat {
    Csv,
    Json,
}

fn schema_for(timestamped: bool) -> LogSchema {
    if timestamped {
        LogSchema::Timestamped
    } else {
        LogSchema::CountOnly
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise warn, or debug with --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut catalog_config = CatalogConfig::from_env();
    if let Some(path) = cli.catalog {
        catalog_config = catalog_config.with_path(path);
    }

    match cli.command {
        Commands::Parse {
            log,
            timestamped,
            format,
            output,
        } => run_parse(&log, schema_for(timestamped), format, output.as_deref()),
        Commands::Summary {
            log,
            timestamped,
            model,
        } => run_summary(&log, schema_for(timestamped), &catalog_config, model.as_deref()),
        Commands::Budget { model, messages } => {
            run_budget(load_catalog(&catalog_config)?, &model, &messages)
        }
        Commands::Cost {
            model,
            prompt_tokens,
            completion_tokens,
        } => {
            let estimator = UsageCostEstimator::new(load_catalog(&catalog_config)?);
            let cost = estimator.cost(&model, prompt_tokens, completion_tokens)?;
            println!("{}", format_cost(cost));
            Ok(())
        }
        Commands::Catalog => {
            let catalog = load_catalog(&catalog_config)?;
            print!("{}", CatalogFile::from_catalog(&catalog).to_toml()?);
            Ok(())
        }
    }
}

/// Only subcommands that price or budget read the catalog.
fn load_catalog(config: &CatalogConfig) -> Result<Arc<ModelCatalog>> {
    let catalog = config.load()?;
    debug!(models = catalog.len(), "model catalog ready");
    Ok(Arc::new(catalog))
}

fn read_log(path: &Path, schema: LogSchema) -> Result<Vec<PhaseInfo>> {
    let file = File::open(path)?;
    let phases = LogStreamParser::new(schema).parse_reader(BufReader::new(file))?;
    info!(log = %path.display(), phases = phases.len(), "parsed run log");
    Ok(phases)
}

fn run_parse(
    log: &Path,
    schema: LogSchema,
    format: ReportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let phases = read_log(log, schema)?;

    let out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    match format {
        ReportFormat::Csv => export::write_csv(out, schema, &phases),
        ReportFormat::Json => export::write_json(out, &phases),
    }
}

fn run_summary(
    log: &Path,
    schema: LogSchema,
    catalog_config: &CatalogConfig,
    model: Option<&str>,
) -> Result<()> {
    let phases = read_log(log, schema)?;
    let mut summary = UsageSummary::from_phases(&phases);
    if let Some(model) = model {
        let estimator = UsageCostEstimator::new(load_catalog(catalog_config)?);
        summary = summary.with_cost(&estimator, model)?;
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &UsageSummary) {
    println!("{}", "Totals".bold());
    print_totals("all phases", &summary.totals);
    if let Some(latency) = &summary.latency {
        println!(
            "  latency: mean {} ms, max {} ms over {} exchanges",
            latency.mean_ms(),
            latency.max_ms,
            latency.measured
        );
    }

    println!();
    println!("{}", "By phase".bold());
    for (phase, totals) in &summary.by_phase {
        print_totals(phase, totals);
        if let Some(cost) = summary.cost.as_ref().and_then(|c| c.by_phase.get(phase)) {
            println!("    cost: {}", format_cost(*cost));
        }
    }

    println!();
    println!("{}", "By role".bold());
    for (role, totals) in &summary.by_role {
        print_totals(role, totals);
    }

    if let Some(cost) = &summary.cost {
        println!();
        println!("{}", "Cost".bold());
        println!("  {}: {}", cost.model_id, format_cost(cost.total).green());
    }
}

fn print_totals(label: &str, totals: &UsageTotals) {
    println!(
        "  {}: {} exchanges, prompt_tokens={} completion_tokens={} total_tokens={}",
        label, totals.exchanges, totals.prompt_tokens, totals.completion_tokens, totals.total_tokens
    );
}

fn run_budget(catalog: Arc<ModelCatalog>, model: &str, messages: &Path) -> Result<()> {
    let raw = fs::read_to_string(messages)?;
    let messages: Vec<ChatMessage> = serde_json::from_str(&raw)?;
    let calculator = TokenBudgetCalculator::with_estimator(catalog);
    let mut request = RequestConfig::new();
    let budget = calculator.apply(&messages, model, &mut request)?;

    let report = serde_json::json!({
        "budget": budget,
        "request": request,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
