//! Journey runner entry point
//!
//! Run with: cargo run -p journey-e2e -- run --tag smoke

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use journey_e2e::playwright::{Browser, PlaywrightFactory};
use journey_e2e::runner::select_scenarios;
use journey_e2e::spec::{Fragment, Scenario};
use journey_e2e::{E2eResult, RunnerConfig, ScenarioRunner};

#[derive(Parser)]
#[command(name = "journey")]
#[command(about = "Run declarative browser journeys with Playwright")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "journey.toml", global = true)]
    config: PathBuf,

    /// Scenario directory (overrides config)
    #[arg(short, long, global = true)]
    scenarios: Option<PathBuf>,

    /// Fragment directory (overrides config)
    #[arg(long, global = true)]
    fragments: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios
    Run(RunArgs),

    /// List scenarios
    List {
        /// Only scenarios carrying this tag
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Print a scenario with fragments expanded
    Show {
        name: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Scenario names to run (all when omitted)
    names: Vec<String>,

    /// Run only scenarios matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Scenarios to run concurrently
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Default step timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Write JSON results here
    #[arg(short, long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    }
}

async fn run(cli: Cli) -> E2eResult<bool> {
    let mut config = RunnerConfig::load(&cli.config)?;
    config.apply_env(std::env::vars())?;
    if let Some(dir) = cli.scenarios {
        config.scenarios_dir = dir;
    }
    if let Some(dir) = cli.fragments {
        config.fragments_dir = Some(dir);
    }

    match cli.command {
        Commands::List { tag } => {
            let scenarios =
                select_scenarios(Scenario::load_all(&config.scenarios_dir)?, &[], tag.as_deref())?;
            for s in &scenarios {
                println!("{:<32} {:>3} steps  [{}]", s.name, s.steps.len(), s.tags.join(", "));
            }
            Ok(true)
        }
        Commands::Show { name } => {
            let scenarios =
                select_scenarios(Scenario::load_all(&config.scenarios_dir)?, &[name], None)?;
            let fragments = Fragment::load_all(&config.fragments_dir())?;
            for s in &scenarios {
                let expanded = journey_e2e::fragment::expand(s, &fragments)?;
                print!("{}", serde_yaml::to_string(&expanded)?);
            }
            Ok(true)
        }
        Commands::Run(args) => {
            if let Some(browser) = args.browser {
                config.playwright.browser = browser.parse::<Browser>()?;
            }
            if args.headed {
                config.playwright.headless = false;
            }
            if let Some(jobs) = args.jobs {
                config.jobs = jobs;
            }
            if let Some(timeout_ms) = args.timeout_ms {
                config.default_timeout_ms = timeout_ms;
            }
            config.validate()?;

            let factory = PlaywrightFactory::new(config.playwright.clone())?;
            let mut runner = ScenarioRunner::new(Arc::new(factory), config);
            runner.load_fragments()?;

            let scenarios = runner.select(&args.names, args.tag.as_deref())?;
            if scenarios.is_empty() {
                info!("No scenarios selected");
                return Ok(true);
            }

            let results = runner.run_all(&scenarios).await;

            for result in &results.results {
                for (var, value) in &result.captured {
                    println!("{}: {} = {}", result.name, var, value);
                }
            }

            if let Some(path) = args.report {
                runner.write_results(&results, &path)?;
            }

            Ok(results.failed == 0)
        }
    }
}
