//! Slidecast worker binary.
//!
//! Usage: `slidecast-worker <source.mp4> [--duration <seconds>]`

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slidecast_engines::HttpEngineClient;
use slidecast_models::{Job, UploadMetadata};
use slidecast_store::StoreConfig;
use slidecast_worker::{metrics, EngineSet, PipelineOrchestrator, WorkerConfig, WorkerError};

struct Args {
    source: String,
    duration: Option<f64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut source = None;
    let mut duration = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--duration" => {
                let value = args.next().context("--duration needs a value")?;
                duration = Some(value.parse::<f64>().context("--duration must be a number")?);
            }
            _ if source.is_none() => source = Some(arg),
            other => bail!("unexpected argument: {}", other),
        }
    }
    let source = source.context("usage: slidecast-worker <source> [--duration <seconds>]")?;
    Ok(Args { source, duration })
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("slidecast=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for HTTPS engine endpoints)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        bail!("failed to install rustls crypto provider");
    }

    dotenvy::dotenv().ok();
    init_tracing()?;

    let args = parse_args()?;
    info!("Starting slidecast-worker");

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("METRICS_ADDR is not a socket address")?;
        metrics::init_prometheus(addr)?;
        info!("Prometheus metrics on {}", addr);
    }

    let config = WorkerConfig::from_env();
    config.validate()?;
    info!("Worker config: {:?}", config);

    let store = slidecast_store::connect(&StoreConfig::from_env()).await?;
    let client = HttpEngineClient::from_env()?;
    match client.health_check().await {
        Ok(true) => info!("Engine service is healthy"),
        Ok(false) => warn!("Engine service reports unhealthy; engine calls may fail"),
        Err(e) => warn!("Engine service health check failed: {}", e),
    }
    let engines = EngineSet::production(&config, client);
    let orchestrator = Arc::new(PipelineOrchestrator::new(config, store, engines));

    let metadata = args
        .duration
        .map(UploadMetadata::with_duration)
        .unwrap_or_default();
    let job_id = orchestrator.submit(Job::new(args.source, metadata)).await?;

    let cancel_handle = {
        let orchestrator = Arc::clone(&orchestrator);
        let job_id = job_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal, cancelling job {}", job_id);
                if let Err(e) = orchestrator.cancel(&job_id).await {
                    warn!("Failed to cancel job {}: {}", job_id, e);
                }
            }
        })
    };

    let outcome = orchestrator.run_pipeline(&job_id).await;
    cancel_handle.abort();

    let status = orchestrator.get_status(&job_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    match orchestrator.get_timeline(&job_id).await {
        Ok(timeline) => println!("{}", serde_json::to_string_pretty(&timeline)?),
        Err(WorkerError::TimelineNotReady(_)) => {}
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = outcome {
        error!("Job {} failed: {}", job_id, e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
    Ok(())
}
