// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::errors::CollectError;
use crate::event::MetricEvent;
use crate::parser::{CggetParser, ParseRules};
use crate::process::{CommandSpec, run_streaming};
use crate::registry::GearSet;
use log::{debug, warn};
use serde::Deserialize;
use std::future::Future;
use time::OffsetDateTime;
use tokio::time::{Duration, Instant};

/// How gears are spread over `cgget` invocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// One invocation naming every gear's cgroup.
    #[default]
    Batched,
    /// One invocation per gear, for tools that only accept a single path.
    PerGear,
}

/// The cgroup parameters to read, grouped by the shape of their output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricFamilies {
    /// `key: value`
    pub scalar: Vec<String>,
    /// `key: child value` followed by indented `child value` lines.
    pub hierarchical: Vec<String>,
    /// `key: v0 v1 v2 ...`
    pub multivalue: Vec<String>,
}

impl MetricFamilies {
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.scalar
            .iter()
            .chain(&self.hierarchical)
            .chain(&self.multivalue)
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.all().next().is_none()
    }
}

/// Outcome of one collection over a gear set.
#[derive(Debug, Default)]
pub struct Collection {
    pub invocations: usize,
    pub events: u64,
    pub dropped_lines: u64,
    /// Failed invocations. Events parsed before a failure were still
    /// delivered.
    pub errors: Vec<CollectError>,
}

/// Reads the current metric values for a set of gears.
pub trait GearCollector: Send + Sync {
    /// Collect every configured metric for `gears`, handing each event to
    /// `on_event` as soon as it is parsed.
    fn collect<F>(
        &self,
        gears: &GearSet,
        observed_at: OffsetDateTime,
        on_event: F,
    ) -> impl Future<Output = Collection> + Send
    where
        F: FnMut(MetricEvent) + Send;
}

/// Collects gear metrics by running `cgget` and parsing its output.
#[derive(Debug, Clone)]
pub struct CggetCollector {
    cgget: CommandSpec,
    cgroup_root: String,
    families: MetricFamilies,
    mode: BatchMode,
    limit: Duration,
    rules: ParseRules,
}

impl CggetCollector {
    /// `cgget` is the base command line; metric and path arguments are
    /// appended to it on every invocation.
    pub fn new(
        cgget: CommandSpec,
        cgroup_root: impl Into<String>,
        families: MetricFamilies,
        mode: BatchMode,
        limit: Duration,
    ) -> Self {
        let cgroup_root = cgroup_root.into();
        let rules = ParseRules::new(&cgroup_root, families.multivalue.iter().cloned());
        Self {
            cgget,
            cgroup_root,
            families,
            mode,
            limit,
            rules,
        }
    }

    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    /// cgroup path of a gear, e.g. `/openshift/<gear>`.
    pub fn gear_path(&self, gear_id: &str) -> String {
        format!("{}/{gear_id}", self.cgroup_root.trim_end_matches('/'))
    }

    /// `cgget -r <metric> ... <path> ...`, or `cgget -a <path> ...` when no
    /// metrics are configured.
    pub fn invocation<'a>(&self, gear_ids: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        let mut args = self.cgget.args.clone();
        if self.families.is_empty() {
            args.push("-a".to_string());
        } else {
            for metric in self.families.all() {
                args.push("-r".to_string());
                args.push(metric.to_string());
            }
        }
        args.extend(gear_ids.into_iter().map(|gear| self.gear_path(gear)));
        CommandSpec::new(self.cgget.program.clone(), args)
    }

    /// Run one invocation through a fresh parser, recording the outcome in
    /// `collection`. The invocation is killed if it is still running at
    /// `deadline`.
    async fn run_invocation<F>(
        &self,
        spec: &CommandSpec,
        deadline: Instant,
        observed_at: OffsetDateTime,
        on_event: &mut F,
        collection: &mut Collection,
    ) where
        F: FnMut(MetricEvent) + Send,
    {
        let mut parser = CggetParser::new(&self.rules, observed_at);
        let result = run_streaming(spec, deadline, |chunk| {
            for event in parser.feed(chunk) {
                on_event(event);
            }
        })
        .await;

        let stats = parser.stats();
        for event in parser.finish() {
            on_event(event);
        }

        collection.invocations += 1;
        collection.events += stats.events;
        collection.dropped_lines += stats.dropped_lines;
        debug!(
            "[cgget] `{spec}`: {} line(s), {} event(s)",
            stats.lines, stats.events
        );
        if stats.dropped_lines > 0 {
            debug!(
                "[cgget] dropped {} unparseable line(s) from `{spec}`",
                stats.dropped_lines
            );
        }
        if let Err(e) = result {
            warn!("[cgget] {e}");
            collection.errors.push(e);
        }
    }
}

impl GearCollector for CggetCollector {
    async fn collect<F>(&self, gears: &GearSet, observed_at: OffsetDateTime, mut on_event: F) -> Collection
    where
        F: FnMut(MetricEvent) + Send,
    {
        let mut collection = Collection::default();
        if gears.is_empty() {
            return collection;
        }

        // One budget covers the whole collection, however many invocations
        // it takes.
        let deadline = Instant::now() + self.limit;
        match self.mode {
            BatchMode::Batched => {
                let spec = self.invocation(gears.keys().map(String::as_str));
                self.run_invocation(&spec, deadline, observed_at, &mut on_event, &mut collection)
                    .await;
            }
            BatchMode::PerGear => {
                for (done, gear_id) in gears.keys().enumerate() {
                    let spec = self.invocation([gear_id.as_str()]);
                    if Instant::now() >= deadline {
                        warn!(
                            "[cgget] collection exceeded {}s, skipping {} gear(s)",
                            self.limit.as_secs_f64(),
                            gears.len() - done
                        );
                        collection.errors.push(CollectError::Timeout {
                            command: spec.to_string(),
                            timeout: self.limit,
                        });
                        break;
                    }
                    self.run_invocation(&spec, deadline, observed_at, &mut on_event, &mut collection)
                        .await;
                }
            }
        }
        collection
    }
}
