use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use vdisc_core::{JobResult, RunSummary};
use vdisc_sync::{build_interval_scheduler, run_guarded, DiscoveryPipeline, RunObserver, SyncConfig};
use vdisc_web::StatusBoard;

#[derive(Debug, Parser)]
#[command(name = "vdisc")]
#[command(about = "Enrich service catalogue components with security scan results")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run discovery once and exit; non-zero exit when preflight fails.
    Run,
    /// Run discovery on a fixed interval while serving /health and /status.
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = vdisc_sync::run_once_from_env().await?;
            print_summary(&summary);
            if summary.result == JobResult::Failed {
                bail!(
                    "{} failed: {}",
                    summary.job_name,
                    summary.error_details.join("; ")
                );
            }
        }
        Commands::Serve {
            port,
            interval_secs,
        } => {
            let mut config = SyncConfig::from_env();
            if let Some(port) = port {
                config.health_port = port;
            }
            if let Some(secs) = interval_secs.filter(|s| *s > 0) {
                config.refresh_interval_secs = secs;
            }
            serve(config).await?;
        }
    }

    Ok(())
}

async fn serve(config: SyncConfig) -> Result<()> {
    let pipeline = Arc::new(DiscoveryPipeline::from_config(&config)?);
    let board = StatusBoard::default();
    let recorder = board.clone();
    let observer: RunObserver = Arc::new(move |summary: RunSummary| recorder.record(summary));
    let guard = Arc::new(tokio::sync::Mutex::new(()));

    let web = tokio::spawn(vdisc_web::serve(config.health_port, board));

    run_guarded(&pipeline, &guard, &observer).await;

    let mut sched = build_interval_scheduler(
        pipeline.clone(),
        guard.clone(),
        config.refresh_interval(),
        observer,
    )
    .await?;
    sched.start().await.context("starting scheduler")?;
    info!(
        every_secs = config.refresh_interval_secs,
        "discovery scheduled; press ctrl-c to stop"
    );

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("listening for ctrl-c")?;
            info!("shutting down");
        }
        res = web => {
            match res {
                Ok(Err(err)) => error!("health endpoint stopped: {err:#}"),
                Err(err) => error!("health endpoint task failed: {err}"),
                Ok(Ok(())) => {}
            }
        }
    }
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "discovery complete: run_id={} result={} components={} enriched={} no_match={} no_report={} failed={} status_persisted={}",
        summary.run_id,
        summary.result,
        summary.components,
        summary.enriched,
        summary.no_match,
        summary.no_report,
        summary.failed,
        summary.status_persisted
    );
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => std::env::var("LOG_LEVEL")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_else(|_| "info".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_thread_names(true).compact().init();
}
