//! schemata CLI
//!
//! Command-line tool for applying versioned schema updates.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use schemata_updater::prelude::*;

/// Versioned, idempotent schema updates for MySQL.
#[derive(Parser)]
#[command(name = "schemata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (overrides the config file).
    #[arg(short, long, env = "SCHEMATA_DATABASE_URL")]
    database: Option<String>,

    /// Table prefix (overrides the config file).
    #[arg(short, long, env = "SCHEMATA_TABLE_PREFIX")]
    prefix: Option<String>,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the recorded version of each component.
    Status,

    /// List pending updates.
    Pending {
        /// Component to inspect (all if not specified).
        #[arg(long)]
        component: Option<String>,
    },

    /// Print the statements of pending updates without executing them.
    Sql {
        /// Component to inspect (all if not specified).
        #[arg(long)]
        component: Option<String>,
    },

    /// Apply pending updates.
    Update {
        /// Component to update (all if not specified).
        #[arg(long)]
        component: Option<String>,

        /// Stop at the first failing component.
        #[arg(long)]
        strict: bool,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Create the version table.
    Init,
}

type CliUpdater = Updater<MySqlStore, TableVersionStore<MySqlStore>>;

fn components(updater: &CliUpdater, component: Option<String>) -> Vec<String> {
    component.map_or_else(
        || updater.registry().components().map(str::to_string).collect(),
        |c| vec![c],
    )
}

fn print_report(report: &ComponentReport) {
    if report.is_up_to_date() {
        println!("{}: up to date", report.component);
        return;
    }
    for unit in &report.units {
        let status = match unit.status {
            UnitStatus::Applied => "applied",
            UnitStatus::Suppressed => "suppressed",
            UnitStatus::Planned => "planned",
        };
        println!(
            "{} {}: {status} ({} statements, {} ignored)",
            report.component,
            unit.version,
            unit.execution.outcomes.len(),
            unit.execution.ignored()
        );
        if let Some(error) = &unit.error {
            println!("    {error}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => UpdaterConfig::load(path)?,
        None => UpdaterConfig::default(),
    }
    .with_overrides(cli.database, cli.prefix);
    config.validate()?;

    // Connect to database
    let mut store = MySqlStore::connect(config.database_url()?).await?;
    if let Some(directory) = config.bulk_load_dir() {
        store = store.with_bulk_load_dir(directory);
    }

    let factory = config.factory();
    let versions = TableVersionStore::new(store.clone(), &factory);
    let updater = Updater::new(UpdatesRegistry::core()?, factory, store, versions);

    match cli.command {
        Commands::Init => {
            info!("Initializing version table...");
            updater.init().await?;
            info!("Version table created successfully.");
        }

        Commands::Status => {
            let recorded = updater.versions().applied_versions().await?;
            for component in updater.registry().components() {
                let current = recorded
                    .iter()
                    .find(|v| v.component == component)
                    .map_or("-", |v| v.version.as_str());
                let latest = updater
                    .registry()
                    .latest_version(component)
                    .map_or("-", SchemaVersion::as_str);
                println!("{component}: {current} (latest {latest})");
            }
            for version in recorded
                .iter()
                .filter(|v| updater.registry().units(&v.component).is_none())
            {
                println!(
                    "{}: {} (no updates registered, recorded {})",
                    version.component,
                    version.version,
                    version.applied_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        Commands::Pending { component } => {
            for component in components(&updater, component) {
                let pending = updater.pending(&component).await?;
                if pending.is_empty() {
                    println!("{component}: up to date");
                }
                for update in pending {
                    println!("{component} {}", update.version());
                }
            }
        }

        Commands::Sql { component } => {
            for component in components(&updater, component) {
                for (version, migrations) in updater.pending_migrations(&component).await? {
                    println!("-- {component} {version}");
                    for migration in migrations {
                        println!("{migration}");
                    }
                }
            }
        }

        Commands::Update {
            component,
            strict,
            dry_run,
        } => {
            let updater = updater.dry_run(dry_run);
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }

            match component {
                Some(component) => {
                    let report = updater.update_component(&component).await?;
                    print_report(&report);
                }
                None => {
                    let policy = if strict {
                        StopPolicy::Strict
                    } else {
                        StopPolicy::Isolated
                    };
                    let summary = updater.update_all(policy).await?;
                    for report in &summary.components {
                        print_report(report);
                    }
                    if !summary.is_success() {
                        warn!(
                            failed = summary.failures.len(),
                            "Some components failed to update"
                        );
                    }
                    summary.into_result()?;
                }
            }
        }
    }

    Ok(())
}
