//! NRD Ingest - newly-registered-domain drop ingester

use anyhow::{Context, Result};
use clap::Parser;
use nrd_common::logging::{init_logging, LogConfig, LogLevel};
use nrd_common::parse_iso;
use nrd_ingest::{
    build_sink, AcquisitionPipeline, HttpBrowser, IngestConfig, IngestSink, PipelineConfig,
    Scheduler, SinkKind,
};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "nrd-ingest")]
#[command(author, version, about = "Newly-registered-domain drop ingester")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Storage backend, overrides NRD_SINK (clickhouse or mysql)
    #[arg(long, global = true)]
    sink: Option<String>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the pipeline once and exit
    Run {
        /// Treat this date (YYYY-MM-DD) as today
        #[arg(long)]
        date: Option<String>,
    },

    /// Run on the configured cron cadence until interrupted
    Schedule,

    /// Create the sink's database and table, then exit
    InitSchema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("nrd-ingest")
        .filter_directives("sqlx=warn,hyper=info,reqwest=info")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env().context("loading configuration")?;
    if let Some(sink) = cli.sink.as_deref() {
        config.sink.kind = sink.parse::<SinkKind>()?;
        config.sink.validate()?;
    }

    let sink = build_sink(&config.sink).context("building sink")?;

    match cli.command {
        Command::InitSchema => {
            sink.ensure_schema()
                .await
                .with_context(|| format!("provisioning {} schema", sink.kind()))?;
            info!(sink = %sink.kind(), "Schema is ready");
        },
        Command::Run { date } => {
            let pipeline = build_pipeline(&config, sink)?;
            let outcome = match date {
                Some(date) => pipeline.run_for(parse_iso(&date)?).await?,
                None => pipeline.run().await?,
            };
            println!("{}", outcome);
        },
        Command::Schedule => {
            let pipeline = Arc::new(build_pipeline(&config, sink)?);
            let mut scheduler = Scheduler::new(pipeline, &config.schedule)?
                .run_on_start(config.run_on_start)
                .start()
                .await?;

            info!(
                cadence = %config.schedule,
                download_dir = %config.download_dir.display(),
                "Scraper is scheduled, waiting for triggers"
            );

            shutdown_signal().await;
            scheduler
                .shutdown()
                .await
                .context("stopping scheduler")?;
            info!("Scheduler stopped");
        },
    }

    Ok(())
}

fn build_pipeline(config: &IngestConfig, sink: Arc<dyn IngestSink>) -> Result<AcquisitionPipeline> {
    let browser = HttpBrowser::new(
        &config.user_agent,
        config.navigation_timeout(),
        config.download_timeout(),
    )?;

    Ok(AcquisitionPipeline::new(
        PipelineConfig::from(config),
        Arc::new(browser),
        sink,
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
