use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use api_gov::cli::{Cli, Commands, ReportFormat};
use api_gov::cluster_index::KubeClusterIndex;
use api_gov::config::{self, RunMode};
use api_gov::error::{self, Result};
use api_gov::linter::ReferenceLinter;
use api_gov::metrics;
use api_gov::profile::DomainProfile;
use api_gov::report;
use api_gov::scheduler::Scheduler;
use api_gov::server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();
    metrics::init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "process_fatal");
            e.exit_code().max(1)
        }
    };
    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let mut config = config::Config::from_env()?;
    if let Some(path) = &cli.config {
        config.storage_path = std::path::PathBuf::from(path);
    }

    let linter: Arc<ReferenceLinter> = Arc::new(match &config.rule_set_path {
        Some(path) => ReferenceLinter::from_file(path).await?,
        None => ReferenceLinter::new(),
    });
    let profile = Arc::new(match &config.domain_profile_path {
        Some(path) => DomainProfile::from_file(path).await?,
        None => DomainProfile::default(),
    });
    let cluster_index = Arc::new(KubeClusterIndex::try_default().await?);

    match cli.command {
        Commands::Run => {
            let scheduler = Scheduler::new(config, cluster_index, linter, profile).await?;
            Ok(scheduler.run().await)
        }
        Commands::Check { format } => {
            let mut config = config;
            config.run_mode = RunMode::OneShot;
            let scheduler = Scheduler::new(config, cluster_index, linter, profile).await?;
            scheduler.run().await;
            print_report(&scheduler, format).await;
            Ok(0)
        }
        Commands::Serve { addr } => {
            let scheduler = Arc::new(Scheduler::new(config, cluster_index, linter, profile).await?);
            let shutdown_tx = scheduler.shutdown_handle();

            let scheduler_loop = scheduler.clone();
            let cycle_handle = tokio::spawn(async move { scheduler_loop.run().await });

            let socket_addr: SocketAddr = addr.parse().map_err(|e| {
                error::GovernanceError::ProcessFatal(format!("invalid --addr {addr}: {e}"))
            })?;
            let router = server::build_router(scheduler.clone());
            let listener = tokio::net::TcpListener::bind(socket_addr)
                .await
                .map_err(|e| error::GovernanceError::ProcessFatal(format!("bind {socket_addr}: {e}")))?;

            info!(%socket_addr, "serving REST + metrics adapter");
            tokio::select! {
                result = axum::serve(listener, router) => {
                    if let Err(e) = result {
                        error!(error = %e, "http server error");
                    }
                }
                code = cycle_handle => {
                    let _ = shutdown_tx.send(());
                    return Ok(code.unwrap_or(1));
                }
            }
            let _ = shutdown_tx.send(());
            Ok(0)
        }
        Commands::Report { format } => {
            let scheduler = Scheduler::new(config, cluster_index, linter, profile).await?;
            print_report(&scheduler, format).await;
            Ok(0)
        }
    }
}

async fn print_report(scheduler: &Scheduler, format: ReportFormat) {
    let summary = scheduler.aggregator().summary().await;
    let overviews = scheduler.aggregator().list().await;
    let recommendations = scheduler.aggregator().recommendations().await;
    let rendered = match format {
        ReportFormat::Text => report::render_text(&summary, &overviews, &recommendations),
        ReportFormat::Json => report::render_json(&summary, &overviews, &recommendations),
        ReportFormat::Markdown => report::render_markdown(&summary, &overviews, &recommendations),
    };
    println!("{rendered}");
}
