// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Shared fixtures for unit tests.
#![allow(clippy::unwrap_used)]

use crate::sink::{Sink, format_metric_line};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A sink that remembers everything handed to it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    metrics: Mutex<Vec<String>>,
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Published readings, rendered in the shipped line format.
    pub fn metrics(&self) -> Vec<String> {
        self.metrics.lock().unwrap().clone()
    }

    /// Lines forwarded from the fleet command.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Sink for RecordingSink {
    fn publish(
        &self,
        gear_label: &str,
        gear_id: &str,
        metric_name: &str,
        metric_subkey: Option<&str>,
        value: &str,
    ) {
        self.metrics.lock().unwrap().push(format_metric_line(
            gear_label,
            gear_id,
            metric_name,
            metric_subkey,
            value,
        ));
    }

    fn ship_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// Write an executable script to `dir/name` and return its path.
pub fn write_script(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
