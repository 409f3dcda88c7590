//! Summary command: stream lifetimes of one log.
//!
//! This module implements `h2wtf summary`, which reads the whole log, then
//! prints one row per stream with the offset of each lifecycle event and the
//! number of busy workers at that moment.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Duration;
use h2wtf_core::{EventCell, LifetimeReport, RuleSet, StreamFilter, StreamRegistry};
use h2wtf_log::{LogError, LogReader, LogRecord, format_elapsed};
use serde::Serialize;

use super::Outcome;
use crate::Config;

const STREAM_WIDTH: usize = 12;
const CREATED_WIDTH: usize = 16;
const BUSY_WIDTH: usize = 4;
const CELL_WIDTH: usize = 12;
const STATUS_WIDTH: usize = 6;
const ERROR_WIDTH: usize = 5;
const CLEANUP_WIDTH: usize = 12;

/// Options of one summary run.
#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    pub streams: Vec<String>,
    pub frames: bool,
    pub echo: bool,
    pub json: bool,
}

// ========== Collection ==========

/// Feeds records into the registry, optionally echoing the ones it accepts.
pub fn collect<I>(
    records: I,
    mut registry: StreamRegistry,
    mut echo: Option<&mut dyn Write>,
) -> Result<StreamRegistry>
where
    I: IntoIterator<Item = Result<LogRecord, LogError>>,
{
    let mut count = 0usize;
    for record in records {
        let record = record?;
        count += 1;
        if registry.observe(&record) {
            if let Some(out) = echo.as_mut() {
                writeln!(out, "{record}")?;
            }
        }
    }
    tracing::debug!(records = count, streams = registry.len(), "log collected");
    Ok(registry)
}

// ========== Human-Readable Output ==========

/// Formats an offset as signed seconds with microseconds.
pub fn format_offset(d: Duration) -> String {
    let sign = if d < Duration::zero() { '-' } else { '+' };
    let micros = d.abs().num_microseconds().unwrap_or(i64::MAX);
    format!("{sign}{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}

fn format_cell(cell: EventCell) -> String {
    match cell {
        EventCell::Offset { offset, in_use } => format!("{}/{in_use}", format_offset(offset)),
        EventCell::Missing => "-".to_string(),
        EventCell::NotApplicable => "n/a".to_string(),
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn table_line(fields: &[String]) -> String {
    fields.join("  ").trim_end().to_string()
}

/// Formats the report as a table.
pub fn format_report(report: &LifetimeReport) -> String {
    let mut output = String::new();

    let mut header = vec![
        format!("{:<STREAM_WIDTH$}", "STREAM"),
        format!("{:<CREATED_WIDTH$}", "CREATED"),
        format!("{:>BUSY_WIDTH$}", "BUSY"),
    ];
    header.extend(
        report
            .columns()
            .iter()
            .map(|c| format!("{:<CELL_WIDTH$}", c.as_str())),
    );
    header.extend([
        format!("{:<STATUS_WIDTH$}", "STATUS"),
        format!("{:<ERROR_WIDTH$}", "ERROR"),
        "CONN CLEANUP".to_string(),
    ]);
    writeln!(output, "{}", table_line(&header)).unwrap();

    let mut widths = vec![STREAM_WIDTH, CREATED_WIDTH, BUSY_WIDTH];
    widths.extend(report.columns().iter().map(|_| CELL_WIDTH));
    widths.extend([STATUS_WIDTH, ERROR_WIDTH, CLEANUP_WIDTH]);
    let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    writeln!(output, "{}", table_line(&rule)).unwrap();

    for row in report.rows() {
        let mut fields = vec![
            format!("{:<STREAM_WIDTH$}", row.key.to_string()),
            format!(
                "{:<CREATED_WIDTH$}",
                format!("+{}", format_elapsed(row.created_at))
            ),
            format!("{:>BUSY_WIDTH$}", row.in_use_at_created),
        ];
        fields.extend(
            row.cells
                .iter()
                .map(|c| format!("{:<CELL_WIDTH$}", format_cell(*c))),
        );
        fields.extend([
            format!("{:<STATUS_WIDTH$}", or_dash(row.status)),
            format!("{:<ERROR_WIDTH$}", or_dash(row.error_code)),
            or_dash(row.connection_cleanup.map(format_offset)),
        ]);
        writeln!(output, "{}", table_line(&fields)).unwrap();
    }

    let connections = report.rows().iter().filter(|r| r.is_connection).count();
    writeln!(output).unwrap();
    writeln!(
        output,
        "streams: {}, connections: {connections}, peak busy workers: {}",
        report.rows().len() - connections,
        report.peak_in_use()
    )
    .unwrap();

    output
}

// ========== JSON Output ==========

/// An observed event in JSON output.
#[derive(Debug, Serialize)]
pub struct JsonEvent {
    pub offset_us: i64,
    pub in_use: i64,
}

/// One stream or connection in JSON output.
#[derive(Debug, Serialize)]
pub struct JsonRow {
    pub id: String,
    pub connection: bool,
    pub created_us: i64,
    pub in_use: i64,
    /// Column events; `null` when not seen, absent when not applicable.
    pub events: BTreeMap<String, Option<JsonEvent>>,
    pub status: Option<u16>,
    pub error_code: Option<u32>,
    pub connection_cleanup_us: Option<i64>,
}

/// JSON output structure.
#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub columns: Vec<String>,
    pub peak_in_use: i64,
    pub streams: Vec<JsonRow>,
}

fn micros(d: Duration) -> i64 {
    d.num_microseconds().unwrap_or(i64::MAX)
}

/// Converts the report to its JSON shape.
pub fn json_report(report: &LifetimeReport) -> JsonReport {
    let streams = report
        .rows()
        .iter()
        .map(|row| {
            let events = report
                .columns()
                .iter()
                .zip(&row.cells)
                .filter_map(|(name, cell)| {
                    let event = match *cell {
                        EventCell::Offset { offset, in_use } => Some(JsonEvent {
                            offset_us: micros(offset),
                            in_use,
                        }),
                        EventCell::Missing => None,
                        EventCell::NotApplicable => return None,
                    };
                    Some((name.to_string(), event))
                })
                .collect();
            JsonRow {
                id: row.key.to_string(),
                connection: row.is_connection,
                created_us: micros(row.created_at),
                in_use: row.in_use_at_created,
                events,
                status: row.status,
                error_code: row.error_code,
                connection_cleanup_us: row.connection_cleanup.map(micros),
            }
        })
        .collect();

    JsonReport {
        columns: report.columns().iter().map(ToString::to_string).collect(),
        peak_in_use: report.peak_in_use(),
        streams,
    }
}

// ========== Command Entry Point ==========

/// Builds the classification rules and filter for a run.
pub fn prepare(config: &Config, options: &SummaryOptions) -> Result<StreamRegistry> {
    let rules: RuleSet = config.rule_set(options.frames)?;
    let filter = StreamFilter::parse(&options.streams)?;
    Ok(StreamRegistry::new(rules).with_filter(filter))
}

/// Runs the summary command.
pub fn run(path: &Path, config: &Config, options: &SummaryOptions) -> Result<Outcome> {
    let registry = prepare(config, options)?;
    let reader =
        LogReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut stdout = io::stdout().lock();
    let echo: Option<&mut dyn Write> = if options.echo {
        Some(&mut stdout)
    } else {
        None
    };
    let registry =
        collect(reader, registry, echo).with_context(|| format!("failed to read {}", path.display()))?;

    let report = LifetimeReport::build(&registry, &config.columns);
    if report.is_empty() {
        eprintln!("No matching streams found in {}.", path.display());
        return Ok(Outcome::NoData);
    }

    if options.json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&json_report(&report))?)?;
    } else {
        if options.echo {
            writeln!(stdout)?;
        }
        write!(stdout, "{}", format_report(&report))?;
    }

    Ok(Outcome::Data)
}
