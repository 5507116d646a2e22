mod args;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use args::Args;
use bolt_downlinks::config::{PreparedGateway, TransmissionConfig};
use bolt_downlinks::delivery::{BackupSink, Cancellation, RunContext, RunReport, deliver};
use bolt_downlinks::gateway::{HttpGateway, build_client};
use bolt_downlinks::logging;
use bolt_downlinks::output::write_json;
use clap::Parser as _;
use reqwest::Client;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let args = Args::parse();

    let config = TransmissionConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration: {:?}", args.config))?;

    let level = args
        .log_level
        .clone()
        .or_else(|| config.logging.level.clone())
        .unwrap_or_else(|| "info".to_owned());
    logging::init(&level, config.logging.logs_directory.as_deref(), args.timezone)
        .context("failed to initialize logging")?;

    let prepared = config
        .prepare(|name| std::env::var(name).ok())
        .context("failed to prepare gateways")?;

    let options = config.client.options()?;
    let client = build_client(&options).context("failed to build HTTP client")?;

    let cancel = Cancellation::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, finishing devices in flight");
                cancel.cancel("operator abort");
            }
        }
    });

    let mut report = RunReport::default();
    for gateway in prepared {
        report.merge(run_gateway(&config, gateway, &client, &cancel).await);
    }

    if let Some(path) = &args.report {
        write_json(path, &report, 2).with_context(|| format!("failed to write report: {path:?}"))?;
    }

    println!("{}", report.summary());
    if let Some(reason) = &report.aborted {
        println!("aborted: {reason}");
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}

/// Runs one gateway with its own cancellation, so an authentication
/// failure there leaves the other gateways alone. Ctrl-C reaches all of them.
async fn run_gateway(
    config: &TransmissionConfig,
    gateway: PreparedGateway,
    client: &Client,
    cancel: &Cancellation,
) -> RunReport {
    let PreparedGateway {
        label,
        base_url,
        credentials,
        store,
        settings,
    } = gateway;

    let mut ctx = RunContext::new(label.clone(), settings).with_cancellation(cancel.child());
    if let Some(dir) = &config.backup_dir {
        ctx = ctx.with_backup(BackupSink::new(dir, &label));
    }

    info!(gateway = %label, devices = store.len(), "starting delivery");
    let http = HttpGateway::new(client.clone(), base_url, credentials);
    deliver(Arc::new(http), Arc::new(store), Arc::new(ctx)).await
}
