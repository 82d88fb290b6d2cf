//! Tenant update orchestrator - daemon and operator CLI.
//!
//! `tupd run` triggers an update cycle on a cron schedule, `tupd trigger`
//! runs one cycle now, `status` and `kill` inspect and stop a run.

#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tup_common::{FileStore, UpdateFilter, UpdaterConfig, transaction};
use tupd::scheduler;
use tupd::{CommandExecutor, TenantsUpdater, TracingReporter, TriggerOutcome, UpdateContext};

#[derive(Parser)]
#[command(name = "tupd")]
#[command(author, version, about = "Tenant update orchestrator")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "TUP_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger update cycles on the configured cron schedule
    Run,
    /// Run one update cycle now
    Trigger {
        /// Only update this environment type
        #[arg(long)]
        env_type: Option<String>,
        /// Only update this cluster
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Print the current run state as JSON
    Status,
    /// Ask the running update to stop before its next tenant
    Kill,
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = UpdaterConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let store = Arc::new(FileStore::open(&config.state_path, config.update.lock_timeout));

    match cli.command {
        Commands::Status => {
            let state = store.read_document()?.run_state;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Kill => {
            transaction(store.as_ref(), |repo| repo.request_stop())?;
            info!("kill switch set; the running update stops before its next tenant");
        }
        Commands::Trigger { env_type, cluster } => {
            let mut filter = match env_type {
                Some(env_type) => UpdateFilter::only_type(env_type.as_str()),
                None => UpdateFilter::unrestricted(),
            };
            if let Some(cluster) = cluster {
                filter = filter.with_cluster(cluster);
            }
            let updater = build_updater(&config, store)?.with_filter(filter);
            let outcome = updater.update_all_tenants().await;
            scheduler::log_outcome(&outcome);
            println!("{}", serde_json::to_string(&outcome)?);
            if let TriggerOutcome::Failed(reason) = outcome {
                bail!("update run failed: {reason}");
            }
        }
        Commands::Run => {
            let updater = build_updater(&config, store)?;
            info!(commit = %config.commit, state = %config.state_path.display(), "starting tenant update daemon");

            let startup = updater.clone();
            tokio::spawn(async move {
                scheduler::log_outcome(&startup.update_all_tenants().await);
            });
            let mut jobs = scheduler::start(updater, &config.schedule)
                .await
                .context("failed to start update schedule")?;

            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            jobs.shutdown().await?;
        }
    }

    Ok(())
}

fn build_updater(config: &UpdaterConfig, store: Arc<FileStore>) -> Result<TenantsUpdater> {
    let Some(executor) = CommandExecutor::from_config(&config.executor) else {
        bail!("no update command configured ([executor] program)");
    };
    if config.version_managers.is_empty() {
        warn!("no version managers configured; only recovery runs will update tenants");
    }

    let ctx = UpdateContext {
        store: store.clone(),
        catalog: store,
        executor: Arc::new(executor),
        reporter: Arc::new(TracingReporter::new(config.commit.clone())),
        settings: config.update.clone(),
        commit: config.commit.clone(),
    };
    Ok(TenantsUpdater::new(
        ctx,
        Arc::new(config.version_registry()),
        config.default_env_types.clone(),
    ))
}
