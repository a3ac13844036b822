// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use gear_metrics::{GearRegistry, LogSink, Sampler, Sink, config_path, load_config, reload_gears};
use log::{info, warn};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let config = load_config(&path)?;

    simple_logger::init_with_level(config.log_level())?;
    info!(
        "gear-metricsd starting (version {})",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        "loaded {} ({} gear(s), batch mode {:?})",
        path.display(),
        config.gears.len(),
        config.batch_mode
    );

    let registry = Arc::new(GearRegistry::with_gears(config.gears.clone())?);
    let sink: Arc<dyn Sink> = Arc::new(LogSink);
    let mut sampler = Sampler::new(
        config.cgget_collector()?,
        Arc::clone(&registry),
        sink,
        config.sampling_interval(),
    );
    match config.fleet_command() {
        Some(fleet) => {
            info!("fleet metrics command: {}", fleet.spec());
            sampler = sampler.with_fleet_command(fleet);
        }
        None => info!("fleet metrics command disabled"),
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampler_task = tokio::spawn(sampler.run(shutdown_rx));

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT");
                break;
            }
            _ = sighup.recv() => {
                info!("received SIGHUP, reloading gears");
                if let Err(e) = reload_gears(&path, &registry) {
                    warn!("gear reload failed, keeping the current set: {e:#}");
                }
            }
        }
    }

    info!("gear-metricsd shutting down");
    // The receiver is gone only if the sampler already exited.
    let _ = shutdown_tx.send(true);
    sampler_task.await.context("sampler task failed")?;
    info!("gear-metricsd stopped");
    Ok(())
}
