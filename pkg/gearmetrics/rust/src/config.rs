// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::collector::{BatchMode, CggetCollector, MetricFamilies};
use crate::process::{CommandSpec, FleetCommand};
use crate::registry::{GearRegistry, GearSet, validate_gear_id};
use anyhow::{Context, Result, bail};
use log::{Level, info};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/openshift/gear-metrics.yaml";

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "GEAR_METRICS_CONFIG";

const DEFAULT_SCALAR_METRICS: &[&str] = &[
    "cpu.cfs_period_us",
    "cpu.cfs_quota_us",
    "cpu.rt_period_us",
    "cpu.rt_runtime_us",
    "cpu.shares",
    "cpuacct.usage",
    "freezer.state",
    "memory.failcnt",
    "memory.limit_in_bytes",
    "memory.max_usage_in_bytes",
    "memory.memsw.failcnt",
    "memory.memsw.limit_in_bytes",
    "memory.memsw.max_usage_in_bytes",
    "memory.memsw.usage_in_bytes",
    "memory.move_charge_at_immigrate",
    "memory.soft_limit_in_bytes",
    "memory.swappiness",
    "memory.usage_in_bytes",
    "memory.use_hierarchy",
    "net_cls.classid",
    "notify_on_release",
];

const DEFAULT_HIERARCHICAL_METRICS: &[&str] =
    &["cpu.stat", "cpuacct.stat", "memory.oom_control", "memory.stat"];

const DEFAULT_MULTIVALUE_METRICS: &[&str] = &["cpuacct.usage_percpu"];

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_scalar_metrics() -> Vec<String> {
    owned(DEFAULT_SCALAR_METRICS)
}

fn default_hierarchical_metrics() -> Vec<String> {
    owned(DEFAULT_HIERARCHICAL_METRICS)
}

fn default_multivalue_metrics() -> Vec<String> {
    owned(DEFAULT_MULTIVALUE_METRICS)
}

fn default_cgget_command() -> Vec<String> {
    owned(&["cgget"])
}

fn default_cgroup_root() -> String {
    "/openshift".to_string()
}

fn default_fleet_metrics_command() -> Vec<String> {
    owned(&["oo-admin-ctl-gears", "metricsall"])
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    pub sampling_interval_seconds: u64,
    /// Bound on each external command; defaults to the sampling interval.
    #[serde(default)]
    pub collection_timeout_seconds: Option<u64>,
    #[serde(default = "default_scalar_metrics")]
    pub scalar_metric_names: Vec<String>,
    #[serde(default = "default_hierarchical_metrics")]
    pub hierarchical_metric_names: Vec<String>,
    #[serde(default = "default_multivalue_metrics")]
    pub multivalue_metric_names: Vec<String>,
    /// Program and leading arguments; metric and path arguments are appended.
    #[serde(default = "default_cgget_command")]
    pub cgget_command: Vec<String>,
    #[serde(default = "default_cgroup_root")]
    pub cgroup_root: String,
    #[serde(default)]
    pub batch_mode: BatchMode,
    /// Empty disables the fleet command.
    #[serde(default = "default_fleet_metrics_command")]
    pub fleet_metrics_command: Vec<String>,
    #[serde(default)]
    pub gears: GearSet,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Read, parse and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<MetricsConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: MetricsConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating {}", path.display()))?;
    Ok(config)
}

/// Reload `path` and swap its gear set into `registry`. Nothing changes if
/// the file no longer loads.
pub fn reload_gears(path: &Path, registry: &GearRegistry) -> Result<()> {
    let config = load_config(path)?;
    registry
        .replace(config.gears)
        .context("replacing gear set")?;
    info!(
        "reloaded gears from {} (generation {})",
        path.display(),
        registry.generation()
    );
    Ok(())
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sampling_interval_seconds == 0 {
            bail!("sampling_interval_seconds must be greater than zero");
        }
        if self.collection_timeout_seconds == Some(0) {
            bail!("collection_timeout_seconds must be greater than zero");
        }

        let mut seen = HashSet::new();
        for (key, names) in [
            ("scalar_metric_names", &self.scalar_metric_names),
            ("hierarchical_metric_names", &self.hierarchical_metric_names),
            ("multivalue_metric_names", &self.multivalue_metric_names),
        ] {
            for name in names {
                if name.is_empty() || name.contains(char::is_whitespace) {
                    bail!("{key}: invalid metric name {name:?}");
                }
                if !seen.insert(name.as_str()) {
                    bail!("{key}: metric {name:?} is listed more than once");
                }
            }
        }

        if self.cgget_command.first().is_none_or(|program| program.is_empty()) {
            bail!("cgget_command must name a program");
        }
        if self
            .fleet_metrics_command
            .first()
            .is_some_and(|program| program.is_empty())
        {
            bail!("fleet_metrics_command must name a program or be empty");
        }
        if !self.cgroup_root.starts_with('/') {
            bail!("cgroup_root must be an absolute path, got {:?}", self.cgroup_root);
        }
        for gear_id in self.gears.keys() {
            validate_gear_id(gear_id).context("gears")?;
        }
        if Level::from_str(&self.log_level).is_err() {
            bail!("log_level: unknown level {:?}", self.log_level);
        }
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_seconds)
    }

    pub fn collection_timeout(&self) -> Duration {
        self.collection_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.sampling_interval())
    }

    /// Falls back to INFO for a level that did not pass validation.
    pub fn log_level(&self) -> Level {
        Level::from_str(&self.log_level).unwrap_or(Level::Info)
    }

    pub fn metric_families(&self) -> MetricFamilies {
        MetricFamilies {
            scalar: self.scalar_metric_names.clone(),
            hierarchical: self.hierarchical_metric_names.clone(),
            multivalue: self.multivalue_metric_names.clone(),
        }
    }

    pub fn cgget_collector(&self) -> Result<CggetCollector> {
        let cgget = CommandSpec::from_argv(&self.cgget_command)
            .context("cgget_command must name a program")?;
        Ok(CggetCollector::new(
            cgget,
            &self.cgroup_root,
            self.metric_families(),
            self.batch_mode,
            self.collection_timeout(),
        ))
    }

    pub fn fleet_command(&self) -> Option<FleetCommand> {
        CommandSpec::from_argv(&self.fleet_metrics_command)
            .map(|spec| FleetCommand::new(spec, self.collection_timeout()))
    }
}
