//! Reader for Apache httpd error logs.
//!
//! Turns raw error log lines into [`LogRecord`]s: timestamp, time elapsed
//! since the first record of the run, module and level, process/thread ids,
//! source tag and the free-text message.
//!
//! # Error Policy
//!
//! Lines that do not look like log lines are skipped with a warning. A line
//! that does look like one but carries an unparsable timestamp is fatal: every
//! derived timing would be meaningless, so [`LogReader`] yields the error and
//! stops.

mod timestamp;

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Duration, NaiveDateTime};
use regex::{Captures, Regex};
use thiserror::Error;

pub use timestamp::{TimestampError, parse_timestamp};

/// The default httpd 2.4 `ErrorLogFormat` layout.
static HTTPD_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(?P<timestamp>[^\]]+)\] \[(?P<module>\S+):(?P<level>\S+)\] \[pid (?P<pid>\d+):tid (?P<tid>\d+)\] (?:(?P<source>\S+): )?(?:\[client (?P<client>\S+)\] )?(?P<message>.*)$",
    )
    .unwrap()
});

/// Log reading errors.
#[derive(Debug, Error)]
pub enum LogError {
    /// Reading the underlying input failed.
    #[error("failed to read log: {0}")]
    Io(#[from] io::Error),
    /// A recognized line carried a timestamp in no supported format.
    #[error("invalid timestamp on line {line}")]
    Timestamp {
        line: usize,
        #[source]
        source: TimestampError,
    },
    /// A custom line pattern failed to compile.
    #[error("invalid line pattern: {0}")]
    Pattern(#[from] regex::Error),
    /// A custom line pattern lacks a group the parser relies on.
    #[error("line pattern must define a `{0}` group")]
    MissingGroup(&'static str),
}

/// One structured httpd log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// 1-based line number in the input.
    pub line: usize,
    /// Absolute time of the entry (UTC when the log carried an offset).
    pub timestamp: NaiveDateTime,
    /// Time since the first record of this run.
    pub elapsed: Duration,
    /// Emitting module, e.g. `http2`.
    pub module: String,
    /// Log level, e.g. `debug` or `trace2`.
    pub level: String,
    pub pid: u32,
    pub tid: u64,
    /// Source location tag, e.g. `h2_stream.c(540)`.
    pub source: Option<String>,
    /// Remote client address, when the entry is bound to a connection.
    pub client: Option<String>,
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} {}/{} {}:{} [{}] {}",
            format_elapsed(self.elapsed),
            self.pid,
            self.tid,
            self.module,
            self.level,
            self.source.as_deref().unwrap_or(""),
            self.message
        )
    }
}

/// Formats a duration as `H:MM:SS.ffffff`.
pub fn format_elapsed(d: Duration) -> String {
    let sign = if d < Duration::zero() { "-" } else { "" };
    let micros = d.abs().num_microseconds().unwrap_or(i64::MAX);
    let secs = micros / 1_000_000;
    format!(
        "{sign}{}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        micros % 1_000_000
    )
}

/// Turns text lines into [`LogRecord`]s.
///
/// The parser is stateful: the first record it produces defines elapsed time
/// zero, and it counts lines to report positions.
#[derive(Debug, Clone)]
pub struct LineParser {
    pattern: Regex,
    started: Option<NaiveDateTime>,
    lines: usize,
}

impl Default for LineParser {
    fn default() -> Self {
        Self {
            pattern: HTTPD_LINE_RE.clone(),
            started: None,
            lines: 0,
        }
    }
}

impl LineParser {
    /// Creates a parser for the default httpd error log layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser for a custom `ErrorLogFormat`.
    ///
    /// The pattern must define `timestamp` and `message` groups; `module`,
    /// `level`, `pid`, `tid`, `source` and `client` are picked up when present.
    pub fn with_pattern(pattern: &str) -> Result<Self, LogError> {
        let pattern = Regex::new(pattern)?;
        for required in ["timestamp", "message"] {
            if !pattern.capture_names().flatten().any(|name| name == required) {
                return Err(LogError::MissingGroup(required));
            }
        }
        Ok(Self {
            pattern,
            started: None,
            lines: 0,
        })
    }

    /// Parses the next line of input.
    ///
    /// Returns `Ok(None)` for blank or unrecognized lines.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<LogRecord>, LogError> {
        self.lines += 1;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }

        let Some(caps) = self.pattern.captures(line) else {
            tracing::warn!(line = self.lines, "not a recognized log line: {line}");
            return Ok(None);
        };

        let (Some(pid), Some(tid)) = (number::<u32>(&caps, "pid"), number::<u64>(&caps, "tid"))
        else {
            tracing::warn!(line = self.lines, "process ids out of range: {line}");
            return Ok(None);
        };

        let raw_ts = caps.name("timestamp").map_or("", |m| m.as_str());
        let timestamp = parse_timestamp(raw_ts).map_err(|source| LogError::Timestamp {
            line: self.lines,
            source,
        })?;
        let started = *self.started.get_or_insert(timestamp);

        let text = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        Ok(Some(LogRecord {
            line: self.lines,
            timestamp,
            elapsed: timestamp - started,
            module: text("module").unwrap_or_default(),
            level: text("level").unwrap_or_default(),
            pid,
            tid,
            source: text("source"),
            client: text("client"),
            message: text("message").unwrap_or_default(),
        }))
    }
}

/// Reads a numeric group, defaulting to zero when the group did not take part.
fn number<T: FromStr + Default>(caps: &Captures<'_>, name: &str) -> Option<T> {
    caps.name(name)
        .map_or_else(|| Some(T::default()), |m| m.as_str().parse().ok())
}

/// Lazy, read-once sequence of [`LogRecord`]s.
///
/// Yields `Err` at most once; iteration ends after a fatal error.
pub struct LogReader<R> {
    reader: R,
    parser: LineParser,
    buf: Vec<u8>,
    done: bool,
}

impl LogReader<BufReader<File>> {
    /// Opens a log file with the default line layout.
    pub fn open(path: &Path) -> Result<Self, LogError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LogReader<R> {
    /// Reads records from any buffered source.
    pub fn new(reader: R) -> Self {
        Self::with_parser(reader, LineParser::new())
    }

    /// Reads records using a preconfigured parser.
    pub const fn with_parser(reader: R, parser: LineParser) -> Self {
        Self {
            reader,
            parser,
            buf: Vec::new(),
            done: false,
        }
    }

    fn fail(&mut self, err: LogError) -> Option<Result<LogRecord, LogError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<LogRecord, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    // Invalid UTF-8 only garbles the offending line
                    let line = String::from_utf8_lossy(&self.buf).into_owned();
                    match self.parser.parse_line(&line) {
                        Ok(Some(record)) => return Some(Ok(record)),
                        Ok(None) => {}
                        Err(err) => return self.fail(err),
                    }
                }
                Err(err) => return self.fail(err.into()),
            }
        }
        None
    }
}
