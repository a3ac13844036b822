// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod collector;
pub mod config;
mod errors;
pub mod event;
pub mod parser;
pub mod process;
pub mod registry;
pub mod scheduler;
pub mod sink;
mod state;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export the public API
pub use collector::{BatchMode, CggetCollector, Collection, GearCollector, MetricFamilies};
pub use config::{MetricsConfig, config_path, load_config, reload_gears};
pub use errors::{CollectError, RegistryError};
pub use event::MetricEvent;
pub use parser::{CggetParser, LineBuffer, MAX_LINE_BYTES, ParseRules, ParserStats};
pub use process::{CommandSpec, FleetCommand};
pub use registry::{GearRegistry, GearSet};
pub use scheduler::{Sampler, TickReport};
pub use sink::{LogSink, Sink};
pub use state::SamplerState;
