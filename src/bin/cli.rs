//! Grade Notifier CLI
//!
//! Local execution entry point.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use grade_notifier::{
    error::Result,
    models::{Config, LoggingConfig, Report},
    pipeline::{Poller, generate_notifications},
    services::{DiscordNotifier, FuxnotenClient, LogNotifier, Notifier, ReportParser},
    storage::{LocalStorage, SnapshotStore},
    utils::mask,
};

/// Grade Notifier - announces new school grades
#[derive(Parser, Debug)]
#[command(
    name = "grade-notifier",
    version,
    about = "Polls the grade portal and announces new grades"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll all accounts at the configured interval
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Log messages instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse a saved grade page and print the report JSON
    Parse {
        /// HTML file to parse
        html: PathBuf,
    },

    /// Print the messages a change between two snapshots would produce
    Diff {
        /// Previous snapshot (JSON)
        old: PathBuf,

        /// Current snapshot (JSON)
        new: PathBuf,

        /// Name used in the message prefix
        #[arg(long, default_value = "user")]
        user: String,

        /// Leave year averages out of the messages
        #[arg(long)]
        no_year_average: bool,
    },

    /// Validate the configuration
    Validate,

    /// Show accounts and their snapshot state
    Info,
}

/// Initialize logging from the verbosity flag and the `[logging]` section.
fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format_timestamp_secs();

    let mut file_error = None;
    if let Some(path) = &logging.file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => file_error = Some(e),
        }
    }
    builder.init();

    if let (Some(path), Some(e)) = (&logging.file, file_error) {
        log::warn!("Cannot open log file {}: {e}. Logging to stderr.", path.display());
    }
}

/// Load the configuration file, or defaults when there is none.
fn load_config(path: &Path) -> Result<Option<Config>> {
    if path.exists() {
        Config::load(path).map(Some)
    } else {
        Ok(None)
    }
}

fn read_report(path: &Path) -> Result<Report> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = load_config(&cli.config);
    let config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => Config::default(),
    };
    init_logging(cli.verbose, &config.logging);

    match loaded {
        Ok(Some(_)) => log::info!("Loaded configuration from {}", cli.config.display()),
        Ok(None) => log::info!("No {} found, using defaults", cli.config.display()),
        Err(e) => {
            log::error!("Config load failed from {}: {e}", cli.config.display());
            return Err(e);
        }
    }
    let config = config.with_process_env();

    match cli.command {
        Command::Run { once, dry_run } => {
            config.validate(!dry_run)?;

            let notifier: Box<dyn Notifier> = if dry_run {
                log::info!("Dry run: messages are logged, not sent");
                Box::new(LogNotifier)
            } else {
                Box::new(DiscordNotifier::new(&config.notifier)?)
            };
            let portal = FuxnotenClient::new(&config.portal);
            let storage = LocalStorage::new(&config.storage.dir);
            let poller = Poller::new(&config, &portal, notifier.as_ref(), &storage)?;

            log::info!("Grade notifier starting...");
            if once {
                let stats = poller.run_cycle().await;
                log::info!(
                    "{} messages for {} accounts ({} skipped)",
                    stats.messages,
                    stats.account_count,
                    stats.skipped
                );
            } else {
                poller.run_forever().await;
            }
        }

        Command::Parse { html } => {
            let content = std::fs::read_to_string(&html)?;
            let report = ReportParser::new()?.parse(&content);
            log::info!(
                "Parsed {} subjects over {} periods",
                report.subject_count(),
                report.period_labels.len()
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Diff {
            old,
            new,
            user,
            no_year_average,
        } => {
            let previous = read_report(&old)?;
            let current = read_report(&new)?;
            let messages = generate_notifications(&user, &current, &previous, !no_year_average);
            if messages.is_empty() {
                log::info!("No changes");
            }
            for message in messages {
                println!("{message}\n");
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate(true) {
                log::error!("Config validation failed: {e}");
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} accounts, every {} minutes)",
                config.accounts.len(),
                config.polling.interval_minutes
            );
        }

        Command::Info => {
            let storage = LocalStorage::new(&config.storage.dir);
            log::info!("Storage directory: {}", storage.root_dir().display());
            log::info!(
                "Portal: {}",
                if config.portal.debug_local {
                    config.portal.debug_local_url.as_str()
                } else {
                    config.portal.login_url.as_str()
                }
            );

            for account in &config.accounts {
                let login = match (&account.username, &account.password) {
                    (Some(username), Some(password)) => format!("{username} / {}", mask(password)),
                    _ => "no credentials".to_string(),
                };
                let snapshot = if storage.exists(&account.name).await? {
                    let report = storage.load(&account.name).await?;
                    format!(
                        "{} subjects, periods {:?}",
                        report.subject_count(),
                        report.effective_period_labels()
                    )
                } else {
                    "no snapshot yet".to_string()
                };
                log::info!("{} ({login}): {snapshot}", account.name);
            }
        }
    }

    Ok(())
}
