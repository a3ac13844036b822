// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// A failed external command run. None of these are fatal to the sampler;
/// the tick is logged and the next one proceeds as usual.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Exit {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("`{command}` did not finish within {}s", timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },
    #[error("failed reading output of `{command}`: {source}")]
    Read {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("gear id must not be empty")]
    EmptyGearId,
    #[error("invalid gear id {gear_id:?}: must not contain whitespace, '/' or ':'")]
    InvalidGearId { gear_id: String },
}
