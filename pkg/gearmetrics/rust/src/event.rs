// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;
use time::OffsetDateTime;

/// A single reading parsed out of cgget output.
///
/// `value` is the token exactly as it appeared in the output. Nothing here
/// interprets it as a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricEvent {
    pub gear_id: String,
    /// Dotted cgroup parameter name, e.g. `memory.stat`.
    pub metric_name: String,
    /// Child key of a grouped parameter, or the position within a
    /// multi-value parameter.
    pub metric_subkey: Option<String>,
    pub value: String,
    pub observed_at: OffsetDateTime,
}

impl MetricEvent {
    /// Full metric key as shipped downstream: `name` or `name.subkey`.
    pub fn key(&self) -> String {
        match &self.metric_subkey {
            Some(subkey) => format!("{}.{subkey}", self.metric_name),
            None => self.metric_name.clone(),
        }
    }
}

impl fmt::Display for MetricEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gear={} {}={}", self.gear_id, self.key(), self.value)
    }
}
