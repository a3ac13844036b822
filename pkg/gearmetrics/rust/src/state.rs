// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    /// Waiting for the next tick.
    Idle,
    /// A collection is in flight.
    Collecting,
    /// Shutdown observed; no further ticks.
    Stopped,
}

impl SamplerState {
    pub(crate) fn can_transition_to(self, next: SamplerState) -> bool {
        use SamplerState::*;
        matches!(
            (self, next),
            (Idle, Collecting) | (Collecting, Idle) | (Idle, Stopped)
        )
    }
}

impl fmt::Display for SamplerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerState::Idle => write!(f, "idle"),
            SamplerState::Collecting => write!(f, "collecting"),
            SamplerState::Stopped => write!(f, "stopped"),
        }
    }
}
