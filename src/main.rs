use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dividend_requalifier::{
    AnalysisConfig, Analyzer, Chooser, DividendSummary, ExdateLookup, InteractivePrompt,
    NonInteractive, ReplayChooser, StaticMarketData, SymbolResolver, TypeRuleSet,
};
use std::path::PathBuf;

/// Requalify dividends whose shares were not held long enough
#[derive(Parser)]
#[command(
    name = "divreq",
    version,
    about = "Requalify dividends whose shares were not held long enough",
    long_about = "Checks every qualified and Section 199A dividend against the closed lots \
                  around its ex-dividend date, splits out the disqualified part as a \
                  non-qualified dividend, and writes the corrected dividends as CSV."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Selections CSV from an earlier run; new answers are written back
    #[arg(long, global = true)]
    selections: Option<PathBuf>,

    /// Analysis config JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Never prompt; anything that needs an answer is an error
    #[arg(long, global = true)]
    non_interactive: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze dividends against closed lots and write the adjusted dividends
    Dividends {
        /// Closed lots CSV files
        #[arg(short = 'l', long = "lots", required = true, num_args = 1..)]
        lots: Vec<PathBuf>,

        /// Dividend CSV files
        #[arg(short = 'd', long = "dividends", required = true, num_args = 1..)]
        dividends: Vec<PathBuf>,

        /// Tax year (default: last year)
        #[arg(short = 'y', long)]
        year: Option<i32>,

        /// Offline exdates JSON instead of Yahoo
        #[arg(long)]
        exdates: Option<PathBuf>,

        /// Offline cusip,symbol CSV instead of Yahoo
        #[arg(long)]
        symbols: Option<PathBuf>,

        /// Directory for the adjusted dividends CSV
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Extra dividend type rules JSON
        #[arg(long)]
        type_rules: Option<PathBuf>,
    },
    /// Print the 1099-DIV summary of dividend files
    Summarize {
        /// Dividend CSV files
        #[arg(short = 'd', long = "dividends", required = true, num_args = 1..)]
        dividends: Vec<PathBuf>,

        /// Per security / date / type breakdown
        #[arg(long)]
        verbose: bool,

        /// Extra dividend type rules JSON
        #[arg(long)]
        type_rules: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    // stdout is for prompts and reports
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    tracing::info!("divreq {}", dividend_requalifier::VERSION);

    let mut config = AnalysisConfig::load(cli.config.as_deref())?;
    if cli.selections.is_some() {
        config.selections_file = cli.selections.clone();
    }

    let inner: Box<dyn Chooser> = if cli.non_interactive {
        Box::new(NonInteractive)
    } else {
        Box::new(InteractivePrompt::stdio())
    };
    let chooser = ReplayChooser::new(inner);
    if let Some(path) = &config.selections_file {
        let imported = chooser.load(path)?;
        tracing::info!("Imported {} selections", imported);
    }

    let result = run(cli.command, config.clone(), &chooser);

    // answers given before a failure are still worth keeping
    if let Err(e) = chooser.save(config.selections_file.as_deref()) {
        tracing::error!("Failed to record selections: {:#}", e);
    }

    result
}

fn run(command: Commands, mut config: AnalysisConfig, chooser: &dyn Chooser) -> Result<()> {
    match command {
        Commands::Dividends {
            lots,
            dividends,
            year,
            exdates,
            symbols,
            output_dir,
            type_rules,
        } => {
            if let Some(year) = year {
                config.tax_year = year;
            }
            if exdates.is_some() {
                config.exdates_file = exdates;
            }
            if symbols.is_some() {
                config.symbols_file = symbols;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if type_rules.is_some() {
                config.type_rules_file = type_rules;
            }

            run_dividends(&config, chooser, &lots, &dividends)
        }
        Commands::Summarize {
            dividends,
            verbose,
            type_rules,
        } => {
            if type_rules.is_some() {
                config.type_rules_file = type_rules;
            }
            run_summarize(&config, chooser, &dividends, verbose)
        }
    }
}

fn load_rules(config: &AnalysisConfig) -> Result<TypeRuleSet> {
    let mut rules = TypeRuleSet::builtin();
    if let Some(path) = &config.type_rules_file {
        let extra = TypeRuleSet::from_file(path)?;
        tracing::info!("Loaded {} type rules from {}", extra.rule_count(), path.display());
        rules.extend(extra.into_rules());
    }
    Ok(rules)
}

fn load_static(config: &AnalysisConfig) -> Result<StaticMarketData> {
    let mut data = StaticMarketData::new();
    if let Some(path) = &config.exdates_file {
        data = data.load_exdates(path)?;
    }
    if let Some(path) = &config.symbols_file {
        data = data.load_symbols(path)?;
    }
    Ok(data)
}

fn run_dividends(
    config: &AnalysisConfig,
    chooser: &dyn Chooser,
    lots: &[PathBuf],
    dividends: &[PathBuf],
) -> Result<()> {
    let rules = load_rules(config)?;
    let offline = load_static(config)?;

    #[cfg(feature = "yahoo")]
    let yahoo = dividend_requalifier::YahooClient::new(chooser)?;

    #[cfg(feature = "yahoo")]
    let resolver: &dyn SymbolResolver = if config.symbols_file.is_some() { &offline } else { &yahoo };
    #[cfg(feature = "yahoo")]
    let lookup: &dyn ExdateLookup = if config.is_offline() { &offline } else { &yahoo };

    #[cfg(not(feature = "yahoo"))]
    let (resolver, lookup): (&dyn SymbolResolver, &dyn ExdateLookup) = {
        if !config.is_offline() {
            anyhow::bail!("Built without Yahoo support: pass --exdates (and --symbols for CUSIP-only inputs)");
        }
        (&offline, &offline)
    };

    let analyzer = Analyzer::new(config, chooser, &rules, resolver, lookup);
    let outcome = analyzer
        .analyze_qualified_dividends(lots, dividends)
        .context("Qualified dividends analysis failed")?;

    match &outcome.output {
        Some(path) => println!("Adjusted dividends written to {}", path.display()),
        None => println!("No dividends were disqualified; nothing written"),
    }
    println!("{}", outcome.report.summary());
    Ok(())
}

fn run_summarize(
    config: &AnalysisConfig,
    chooser: &dyn Chooser,
    dividends: &[PathBuf],
    verbose: bool,
) -> Result<()> {
    let rules = load_rules(config)?;
    let offline = StaticMarketData::new();
    let analyzer = Analyzer::new(config, chooser, &rules, &offline, &offline);

    let summaries = analyzer.summarize(dividends, verbose).context("Summarizing dividends failed")?;

    for file in &summaries {
        println!(">>> {}", file.path.display());
        if let Some(breakdown) = file.breakdown.as_ref().filter(|b| !b.is_empty()) {
            print!("{}", breakdown.render());
        }
        println!("{}", file.summary.render());
    }

    if summaries.len() > 1 {
        let total: DividendSummary = summaries.iter().map(|f| f.summary).sum();
        println!(">>> Aggregated Total");
        println!("{}", total.render());
    }
    Ok(())
}
