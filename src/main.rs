use anyhow::Context;
use clap::{Parser, Subcommand};

use tokencost::cli;
use tokencost::cli::analyze_cmd::EventQuery;
use tokencost::core::config::AppConfig;

#[derive(Parser)]
#[command(name = "tkc", about = "LLM token usage cost analytics", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text|json)
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Full report: totals, top models, daily spend, budget, anomalies, recommendations
    Report {
        #[command(flatten)]
        query: EventQuery,

        /// Budget amount in dollars (overrides the config)
        #[arg(long)]
        budget: Option<f64>,
    },
    /// Price a single call
    Cost {
        #[arg(short, long)]
        provider: String,

        #[arg(short, long)]
        model: String,

        /// Input tokens
        #[arg(long)]
        input: u64,

        /// Output tokens
        #[arg(long)]
        output: u64,
    },
    /// Group costs by model, provider and/or date
    Aggregate {
        #[command(flatten)]
        query: EventQuery,

        /// Comma-separated dimensions: model, provider, date
        #[arg(short, long, value_delimiter = ',')]
        group_by: Vec<String>,

        /// Keep only the N most expensive buckets
        #[arg(long)]
        top: Option<usize>,
    },
    /// Evaluate spend against a budget
    Budget {
        #[arg(long)]
        amount: f64,

        #[arg(long)]
        spend: f64,

        /// Warning threshold as a fraction of the amount
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Flag days whose spend deviates from the trailing baseline
    Anomalies {
        #[command(flatten)]
        query: EventQuery,

        /// Minimum |z| to flag
        #[arg(long)]
        threshold: Option<f64>,

        /// Baseline points needed before a day is judged
        #[arg(long)]
        min_samples: Option<usize>,
    },
    /// Suggest cheaper models and usage optimizations
    Recommend {
        #[command(flatten)]
        query: EventQuery,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Print the config file path
    Path,
}

/// Log to stderr; `TKC_LOG` takes precedence over `--verbose`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("TKC_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("tokencost={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // A broken config file must not stop `config check` from reporting it
    let config = match &cli.command {
        Commands::Config { .. } => AppConfig::default(),
        _ => AppConfig::load().context("Failed to load config")?,
    };

    let format = if cli.json {
        cli::output::OutputFormat::Json
    } else {
        let id = cli
            .format
            .as_deref()
            .unwrap_or(config.settings.default_format.as_str());
        cli::output::OutputFormat::from_id(id)
            .with_context(|| format!("Unknown format '{}' (expected text or json)", id))?
    };

    let output_opts = cli::output::OutputOptions {
        format,
        pretty: cli.pretty,
        use_color: cli::output::detect_color(!cli.no_color, &config.settings.color),
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Report { query, budget } => {
            cli::analyze_cmd::report(&query, budget, &config, &output_opts)?
        }
        Commands::Cost {
            provider,
            model,
            input,
            output,
        } => cli::analyze_cmd::cost(&provider, &model, input, output, &config, &output_opts)?,
        Commands::Aggregate {
            query,
            group_by,
            top,
        } => cli::analyze_cmd::aggregate_cmd(&query, &group_by, top, &config, &output_opts)?,
        Commands::Budget {
            amount,
            spend,
            threshold,
        } => cli::analyze_cmd::budget(amount, spend, threshold, &config, &output_opts)?,
        Commands::Anomalies {
            query,
            threshold,
            min_samples,
        } => cli::analyze_cmd::anomalies(&query, threshold, min_samples, &config, &output_opts)?,
        Commands::Recommend { query } => {
            cli::analyze_cmd::recommend(&query, &config, &output_opts)?
        }
        Commands::Config { action } => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
            ConfigAction::Path => cli::config_cmd::path(&output_opts)?,
        },
    }

    Ok(())
}
