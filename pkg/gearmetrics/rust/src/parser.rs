// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Incremental parser for `cgget` output.
//!
//! `cgget` prints one block per cgroup path:
//!
//! ```text
//! /openshift/52bd1ae46fc2fe5ad6000007:
//! cpu.rt_runtime_us: 0
//! cpu.stat: nr_periods 6266
//!         nr_throttled 0
//!         throttled_time 0
//! cpuacct.usage_percpu: 3180064217 3240110361
//!
//! /openshift/52bd1ae46fc2fe5ad6000008:
//! ...
//! ```
//!
//! Output arrives from a pipe in arbitrary chunks, so the parser carries any
//! unterminated tail over to the next [`CggetParser::feed`] call. Feeding the
//! same bytes split at any offsets yields the same events as feeding them in
//! one piece.
//!
//! Lines that fit none of the shapes above are dropped. Telemetry is best
//! effort and a garbled line must never stop the rest of the stream.

use crate::event::MetricEvent;
use log::debug;
use std::collections::HashSet;
use time::OffsetDateTime;

/// Lines longer than this are discarded whole, however they were chunked.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Splits a byte stream into lines without regard to chunk boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
    // Set once the pending line has grown past MAX_LINE_BYTES; cleared at the
    // next newline.
    discarding: bool,
    overlong: u64,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and call `on_line` for every line it completes. The
    /// line passed to `on_line` excludes the `\n` terminator.
    pub fn push(&mut self, chunk: &[u8], mut on_line: impl FnMut(&[u8])) {
        let mut rest = chunk;
        while let Some(pos) = memchr::memchr(b'\n', rest) {
            let (head, tail) = rest.split_at(pos);
            let after = tail.split_first().map_or(&[][..], |(_, after)| after);

            if self.discarding || self.partial.len() + head.len() > MAX_LINE_BYTES {
                self.overlong += 1;
            } else if self.partial.is_empty() {
                on_line(head);
            } else {
                self.partial.extend_from_slice(head);
                on_line(&self.partial);
            }

            self.partial.clear();
            self.discarding = false;
            rest = after;
        }

        if self.discarding {
            return;
        }
        if self.partial.len() + rest.len() > MAX_LINE_BYTES {
            self.partial.clear();
            self.discarding = true;
        } else {
            self.partial.extend_from_slice(rest);
        }
    }

    /// Drop any unterminated tail. Returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.partial.len();
        self.partial.clear();
        self.discarding = false;
        discarded
    }

    /// Bytes buffered since the last complete line.
    pub fn pending(&self) -> &[u8] {
        &self.partial
    }

    /// Number of lines dropped for exceeding [`MAX_LINE_BYTES`].
    pub fn overlong_lines(&self) -> u64 {
        self.overlong
    }
}

/// What the parser needs to know about the cgroup layout.
#[derive(Debug, Clone)]
pub struct ParseRules {
    header_prefix: String,
    multivalue_metrics: HashSet<String>,
}

impl ParseRules {
    /// `cgroup_root` is the parent of every gear cgroup, e.g. `/openshift`.
    pub fn new<I, S>(cgroup_root: &str, multivalue_metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header_prefix: format!("{}/", cgroup_root.trim_end_matches('/')),
            multivalue_metrics: multivalue_metrics.into_iter().map(Into::into).collect(),
        }
    }

    /// Gear id named by a block header such as `/openshift/<gear>:`.
    fn header_gear<'a>(&self, line: &'a str) -> Option<&'a str> {
        let gear = line
            .trim_end()
            .strip_prefix(&self.header_prefix)?
            .strip_suffix(':')?;
        let valid = !gear.is_empty()
            && !gear.contains(|c: char| c.is_whitespace() || c == '/' || c == ':');
        valid.then_some(gear)
    }

    fn is_multivalue(&self, metric: &str) -> bool {
        self.multivalue_metrics.contains(metric)
    }
}

impl Default for ParseRules {
    fn default() -> Self {
        Self::new("/openshift", ["cpuacct.usage_percpu"])
    }
}

/// Counters for one parser's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParserStats {
    pub lines: u64,
    pub events: u64,
    pub dropped_lines: u64,
}

/// Parses one `cgget` output stream. Create a fresh parser for every
/// invocation so that state left by a stream that died mid-block cannot leak
/// into the next one.
#[derive(Debug)]
pub struct CggetParser<'a> {
    lines: LineBuffer,
    state: BlockState<'a>,
}

#[derive(Debug)]
struct BlockState<'a> {
    rules: &'a ParseRules,
    observed_at: OffsetDateTime,
    gear: Option<String>,
    group: Option<String>,
    stats: ParserStats,
}

impl<'a> CggetParser<'a> {
    /// Every event produced by this parser is stamped with `observed_at`.
    pub fn new(rules: &'a ParseRules, observed_at: OffsetDateTime) -> Self {
        Self {
            lines: LineBuffer::new(),
            state: BlockState {
                rules,
                observed_at,
                gear: None,
                group: None,
                stats: ParserStats::default(),
            },
        }
    }

    /// Consume a chunk of output and return the events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<MetricEvent> {
        let mut events = Vec::new();
        let Self { lines, state } = self;
        lines.push(chunk, |line| state.consume(line, &mut events));
        state.stats.events += events.len() as u64;
        events
    }

    /// End of stream. Complete lines were already handled by [`feed`], so
    /// this only discards an unterminated trailing line. The returned list is
    /// therefore always empty; it exists so callers can treat both calls
    /// uniformly.
    ///
    /// [`feed`]: CggetParser::feed
    pub fn finish(mut self) -> Vec<MetricEvent> {
        let discarded = self.lines.finish();
        if discarded > 0 {
            debug!("[cgget] discarding {discarded} byte(s) of unterminated output");
        }
        Vec::new()
    }

    /// Gear whose block is currently open.
    pub fn current_gear(&self) -> Option<&str> {
        self.state.gear.as_deref()
    }

    /// Grouped metric whose continuation lines are currently expected.
    pub fn current_group(&self) -> Option<&str> {
        self.state.group.as_deref()
    }

    pub fn stats(&self) -> ParserStats {
        ParserStats {
            dropped_lines: self.state.stats.dropped_lines + self.lines.overlong_lines(),
            ..self.state.stats
        }
    }
}

impl BlockState<'_> {
    fn consume(&mut self, raw: &[u8], events: &mut Vec<MetricEvent>) {
        self.stats.lines += 1;
        let line = String::from_utf8_lossy(raw);

        if self.gear.is_none() {
            if let Some(gear) = self.rules.header_gear(&line) {
                self.gear = Some(gear.to_string());
                self.group = None;
            } else if !line.trim().is_empty() {
                self.drop_line(&line, "outside of a gear block");
            }
            return;
        }

        // Separator between gear blocks.
        if line.trim().is_empty() {
            self.gear = None;
            self.group = None;
            return;
        }

        if line.starts_with(char::is_whitespace) {
            let Some(group) = self.group.as_deref() else {
                self.drop_line(&line, "continuation without a group");
                return;
            };
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next()) {
                (Some(key), Some(value)) => self.emit(events, group, Some(key), value),
                _ => self.drop_line(&line, "continuation is not a key/value pair"),
            }
            return;
        }

        self.group = None;

        let Some((key, value)) = line.split_once(':') else {
            self.drop_line(&line, "no key separator");
            return;
        };
        let key = key.trim();
        let tokens: Vec<&str> = value.split_whitespace().collect();
        if key.is_empty() || tokens.is_empty() {
            self.drop_line(&line, "empty key or value");
            return;
        }

        if self.rules.is_multivalue(key) {
            for (index, token) in tokens.iter().enumerate() {
                self.emit(events, key, Some(&index.to_string()), token);
            }
            return;
        }

        match tokens.as_slice() {
            [single] => self.emit(events, key, None, single),
            [child, value, ..] => {
                // The header line of a group carries the group's first pair.
                self.emit(events, key, Some(*child), value);
                self.group = Some(key.to_string());
            }
            [] => {}
        }
    }

    fn emit(
        &self,
        events: &mut Vec<MetricEvent>,
        metric_name: &str,
        metric_subkey: Option<&str>,
        value: &str,
    ) {
        let Some(gear) = self.gear.as_deref() else {
            return;
        };
        events.push(MetricEvent {
            gear_id: gear.to_string(),
            metric_name: metric_name.to_string(),
            metric_subkey: metric_subkey.map(String::from),
            value: value.to_string(),
            observed_at: self.observed_at,
        });
    }

    fn drop_line(&mut self, line: &str, reason: &str) {
        self.stats.dropped_lines += 1;
        debug!("[cgget] dropping line ({reason}): {line:?}");
    }
}
