// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The sampling loop.
//!
//! A [`Sampler`] alternates between [`SamplerState::Idle`] and
//! [`SamplerState::Collecting`]. Each tick snapshots the gear registry,
//! collects every gear through a [`GearCollector`], publishes the readings,
//! then runs the fleet metrics command if one is configured. A tick that
//! takes at least the sampling interval is followed immediately by the next
//! one; otherwise the loop sleeps out the remainder. Ticks never overlap.
//!
//! Shutdown is cooperative: the loop watches a `watch::Receiver<bool>` while
//! idle and checks it before each tick, but never abandons a tick midway.
//! Each external command is bounded by its own timeout instead.

use crate::collector::GearCollector;
use crate::process::FleetCommand;
use crate::registry::GearRegistry;
use crate::sink::Sink;
use crate::state::SamplerState;
use log::{debug, info, trace, warn};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, sleep_until};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub gears: usize,
    pub events: u64,
    pub lines_shipped: u64,
    pub errors: usize,
    pub duration: Duration,
}

impl TickReport {
    pub fn overran(&self, interval: Duration) -> bool {
        self.duration >= interval
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gears={} events={} lines_shipped={} errors={} duration={:.3}s",
            self.gears,
            self.events,
            self.lines_shipped,
            self.errors,
            self.duration.as_secs_f64()
        )
    }
}

pub struct Sampler<C> {
    collector: C,
    registry: Arc<GearRegistry>,
    sink: Arc<dyn Sink>,
    fleet: Option<FleetCommand>,
    interval: Duration,
    state: SamplerState,
    ticks: u64,
}

impl<C: GearCollector> Sampler<C> {
    pub fn new(
        collector: C,
        registry: Arc<GearRegistry>,
        sink: Arc<dyn Sink>,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            registry,
            sink,
            fleet: None,
            interval,
            state: SamplerState::Idle,
            ticks: 0,
        }
    }

    pub fn with_fleet_command(mut self, fleet: FleetCommand) -> Self {
        self.fleet = Some(fleet);
        self
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn transition(&mut self, next: SamplerState) {
        if self.state.can_transition_to(next) {
            debug!("[sampler] {} -> {next}", self.state);
        } else {
            warn!("[sampler] unexpected transition {} -> {next}", self.state);
        }
        self.state = next;
    }

    /// Run one Collecting phase. Failures are logged and counted in the
    /// report, never returned.
    pub async fn tick(&mut self) -> TickReport {
        self.transition(SamplerState::Collecting);
        self.ticks += 1;
        let started = Instant::now();

        let gears = self.registry.snapshot();
        let mut report = TickReport {
            gears: gears.len(),
            ..TickReport::default()
        };

        if gears.is_empty() {
            debug!("[sampler] no gears to sample");
        } else {
            let sink = self.sink.as_ref();
            let mut published = 0u64;
            let collection = self
                .collector
                .collect(&gears, OffsetDateTime::now_utc(), |event| {
                    let label = gears.get(&event.gear_id).map_or("", String::as_str);
                    trace!("[sampler] {event}");
                    sink.publish(
                        label,
                        &event.gear_id,
                        &event.metric_name,
                        event.metric_subkey.as_deref(),
                        &event.value,
                    );
                    published += 1;
                })
                .await;
            report.events = published;
            report.errors = collection.errors.len();

            if let Some(fleet) = &self.fleet {
                match fleet.run(sink).await {
                    Ok(shipped) => report.lines_shipped = shipped,
                    Err(e) => {
                        warn!("[fleet] {e}");
                        report.errors += 1;
                    }
                }
            }
        }

        report.duration = started.elapsed();
        self.transition(SamplerState::Idle);
        report
    }

    /// Tick until `shutdown` turns true or its sender goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "[sampler] sampling every {}s",
            self.interval.as_secs_f64()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.tick().await;
            debug!("[sampler] tick {}: {report}", self.ticks);

            if report.overran(self.interval) {
                warn!(
                    "[sampler] tick took {:.3}s, at or over the {}s interval; starting the next one now",
                    report.duration.as_secs_f64(),
                    self.interval.as_secs_f64()
                );
                continue;
            }

            let next_tick = Instant::now() + (self.interval - report.duration);
            tokio::select! {
                _ = sleep_until(next_tick) => {}
                // Err means the sender is gone, which is treated as shutdown.
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.transition(SamplerState::Stopped);
        info!("[sampler] stopped after {} tick(s)", self.ticks);
    }
}
