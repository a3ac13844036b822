// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::info;

/// Log target used for metric lines, so they can be filtered apart from the
/// daemon's own diagnostics.
pub const METRIC_TARGET: &str = "gear_metrics::metric";

/// Where parsed readings go.
///
/// A sink owns formatting, transport and its own failure handling. The
/// sampler never retries or buffers a publish.
pub trait Sink: Send + Sync {
    fn publish(
        &self,
        gear_label: &str,
        gear_id: &str,
        metric_name: &str,
        metric_subkey: Option<&str>,
        value: &str,
    );

    /// Forward one pre-formatted line from the fleet metrics command.
    fn ship_line(&self, line: &str);
}

/// Renders a reading in the `type=metric` line format consumed by the log
/// pipeline.
pub fn format_metric_line(
    gear_label: &str,
    gear_id: &str,
    metric_name: &str,
    metric_subkey: Option<&str>,
    value: &str,
) -> String {
    match metric_subkey {
        Some(subkey) => {
            format!("type=metric app={gear_label} gear={gear_id} {metric_name}.{subkey}={value}")
        }
        None => format!("type=metric app={gear_label} gear={gear_id} {metric_name}={value}"),
    }
}

/// Publishes every reading as an INFO record on [`METRIC_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl Sink for LogSink {
    fn publish(
        &self,
        gear_label: &str,
        gear_id: &str,
        metric_name: &str,
        metric_subkey: Option<&str>,
        value: &str,
    ) {
        info!(
            target: METRIC_TARGET,
            "{}",
            format_metric_line(gear_label, gear_id, metric_name, metric_subkey, value)
        );
    }

    fn ship_line(&self, line: &str) {
        info!(target: METRIC_TARGET, "{line}");
    }
}
