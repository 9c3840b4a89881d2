//! dns-fuzz binary entry point.

use clap::Parser;
use dns_fuzz::{pipeline, telemetry, Config, Shutdown};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Expand domain patterns and record the names that resolve.
#[derive(Parser, Debug)]
#[command(name = "dns-fuzz")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML). Optional.
    #[arg(short, long, default_value = "dns-fuzz.toml")]
    config: PathBuf,

    /// Patterns file, overriding the configuration.
    patterns: Option<PathBuf>,

    /// Main wordlist for the `{fuzz*}` placeholders, overriding the configuration.
    wordlist: Option<PathBuf>,

    /// Actually run the resolver (otherwise batches are only generated).
    #[arg(long)]
    run_dns: bool,

    /// Skip patterns needing a missing main wordlist instead of aborting.
    #[arg(long)]
    skip_missing: bool,
}

fn load_config(args: &Args) -> Result<Config, config::ConfigError> {
    let mut config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()).required(false))
        .add_source(
            config::Environment::with_prefix("DNS_FUZZ")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    if let Some(patterns) = &args.patterns {
        config.pipeline.patterns_file = patterns.clone();
    }
    if let Some(wordlist) = &args.wordlist {
        config.wordlists.main = Some(wordlist.clone());
    }
    if args.run_dns {
        config.pipeline.run_resolution = true;
    }
    if args.skip_missing {
        config.pipeline.skip_missing_binding = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = telemetry::init(&config.telemetry) {
        eprintln!("failed to initialize telemetry: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        config_file = %args.config.display(),
        patterns = %config.pipeline.patterns_file.display(),
        run_resolution = config.pipeline.run_resolution,
        batch_size = config.pipeline.batch_size,
        "Starting dns-fuzz"
    );

    let (shutdown, worker) = Shutdown::new_signals();
    tokio::spawn(worker);

    match pipeline::run(&config, &shutdown).await {
        Ok(report) => {
            info!(
                ledger = %config.pipeline.ledger_path().display(),
                tested = report.tested(),
                new_positives = report.new_positives(),
                cancelled = report.cancelled(),
                "dns-fuzz complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("dns-fuzz aborted: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
