//! Event classification.
//!
//! A [`RuleSet`] is an ordered list of [`EventRule`]s. For each record of the
//! protocol module, rules are tried in order and the first whose pattern
//! matches the start of the message wins. Order matters: a generic pattern
//! placed before a more specific one shadows it.
//!
//! # Identity Groups
//!
//! Patterns name the identity parts with capture groups:
//! - `session` (required): the connection id
//! - `stream` (optional): the HTTP/2 stream number, 0 when absent
//! - `child` (optional): the child process, the record's pid when absent

use std::str::FromStr;
use std::sync::LazyLock;

use h2wtf_log::LogRecord;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::event_type::EventName;
use crate::types::StreamKey;

/// Module tag of the httpd HTTP/2 implementation.
pub const HTTP2_MODULE: &str = "http2";

const SSID: &str = r"(?P<session>\d+)-(?P<stream>\d+)";

static HTTPD_RULES: LazyLock<Vec<EventRule>> = LazyLock::new(|| {
    let stream_rule = |name: EventName, pattern: &str| {
        EventRule::new(name, &pattern.replace("{SSID}", SSID)).unwrap()
    };
    vec![
        stream_rule(
            EventName::CREATED,
            r"AH03082: h2_stream\({SSID},IDLE\): created",
        )
        .creating(),
        stream_rule(
            EventName::SCHEDULED,
            r"h2_stream\({SSID},.*\): schedule .* chunked",
        ),
        // h2_task ids drift from the ids used on the main connection
        stream_rule(
            EventName::STARTED,
            r"h2_task\({SSID}\): process connection",
        )
        .aliasing(),
        stream_rule(
            EventName::RESPONSE,
            r"(?:AH\d+: )?h2_stream\({SSID}(?:,[^)]*)?\): submit response \d+",
        ),
        stream_rule(
            EventName::ENDED,
            r"h2_mplx\({SSID}\): request done, \d+\.\d+ ms elapsed",
        ),
        stream_rule(
            EventName::ERROR,
            r"(?:AH\d+: )?h2_stream\({SSID}(?:,[^)]*)?\): reset, error=\d+",
        ),
        stream_rule(
            EventName::CLEANUP,
            r"h2_stream\({SSID},CLEANUP\): cleanup",
        ),
        stream_rule(
            EventName::DESTROYED,
            r"h2_stream\({SSID},CLEANUP\): destroy",
        ),
        stream_rule(
            EventName::RESET,
            r"AH03067: h2_stream\({SSID}\): RST_STREAM ",
        ),
        EventRule::new(
            EventName::CREATED,
            r"(?:AH\d+: )?h2_session\((?P<session>\d+)(?:,[^)]*)?\): created",
        )
        .unwrap()
        .creating(),
        EventRule::new(
            EventName::CLEANUP,
            r"(?:AH\d+: )?h2_session\((?P<session>\d+)(?:,[^)]*)?\): (?:pool_)?cleanup",
        )
        .unwrap(),
    ]
});

static FRAME_RULE: LazyLock<EventRule> = LazyLock::new(|| {
    EventRule::new(
        EventName::FRAME,
        r"AH0306[68]: h2_session\((?P<session>\d+).*FRAME\[.*stream=(?P<stream>\d+)",
    )
    .unwrap()
});

/// Rule construction errors.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The pattern is not a valid regular expression.
    #[error("invalid pattern for event '{event}'")]
    Pattern {
        event: EventName,
        #[source]
        source: Box<regex::Error>,
    },
    /// The pattern cannot yield a stream identity.
    #[error("pattern for event '{event}' must define a `session` group")]
    MissingSession { event: EventName },
}

/// One classification rule.
#[derive(Debug, Clone)]
pub struct EventRule {
    name: EventName,
    pattern: Regex,
    creating: bool,
    aliasing: bool,
}

impl EventRule {
    /// Compiles a rule. The pattern is anchored at the start of the message.
    pub fn new(name: EventName, pattern: &str) -> Result<Self, RuleError> {
        let pattern = Regex::new(&format!("^(?:{pattern})")).map_err(|e| RuleError::Pattern {
            event: name.clone(),
            source: Box::new(e),
        })?;
        if !pattern.capture_names().flatten().any(|g| g == "session") {
            return Err(RuleError::MissingSession { event: name });
        }
        Ok(Self {
            name,
            pattern,
            creating: false,
            aliasing: false,
        })
    }

    /// Marks the rule as able to instantiate a new stream.
    #[must_use]
    pub fn creating(mut self) -> Self {
        self.creating = true;
        self
    }

    /// Marks the rule's identities as possibly drifted from the creating one.
    #[must_use]
    pub fn aliasing(mut self) -> Self {
        self.aliasing = true;
        self
    }

    pub const fn name(&self) -> &EventName {
        &self.name
    }

    pub const fn is_creating(&self) -> bool {
        self.creating
    }

    pub const fn is_aliasing(&self) -> bool {
        self.aliasing
    }

    /// Extracts the raw identity if the rule matches the record's message.
    pub fn matches(&self, record: &LogRecord) -> Option<StreamKey> {
        let caps = self.pattern.captures(&record.message)?;

        let child = group::<u32>(&caps, "child").unwrap_or(Ok(record.pid));
        let session = group::<u64>(&caps, "session").unwrap_or(Ok(0));
        let stream = group::<u32>(&caps, "stream").unwrap_or(Ok(0));
        if let (Ok(child), Ok(session), Ok(stream)) = (child, session, stream) {
            Some(StreamKey::new(child, session, stream))
        } else {
            tracing::debug!(event = %self.name, line = record.line, "identifier out of range");
            None
        }
    }
}

fn group<T: FromStr>(caps: &Captures<'_>, name: &str) -> Option<Result<T, T::Err>> {
    caps.name(name).map(|m| m.as_str().parse())
}

/// A record matched by a rule.
#[derive(Debug, Clone, Copy)]
pub struct Classified<'a> {
    pub rule: &'a EventRule,
    pub key: StreamKey,
}

/// Ordered rules for one protocol module.
#[derive(Debug, Clone)]
pub struct RuleSet {
    module: String,
    rules: Vec<EventRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::httpd()
    }
}

impl RuleSet {
    pub fn new(module: impl Into<String>, rules: Vec<EventRule>) -> Self {
        Self {
            module: module.into(),
            rules,
        }
    }

    /// Stream and connection lifecycle rules for httpd's `mod_http2`.
    pub fn httpd() -> Self {
        Self::new(HTTP2_MODULE, HTTPD_RULES.clone())
    }

    /// Appends the rule attributing individual frames to streams.
    #[must_use]
    pub fn with_frames(mut self) -> Self {
        self.rules.push(FRAME_RULE.clone());
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn rules(&self) -> &[EventRule] {
        &self.rules
    }

    /// Whether the record belongs to the protocol module at all.
    pub fn is_relevant(&self, record: &LogRecord) -> bool {
        record.module == self.module
    }

    /// Finds the first rule matching the record.
    pub fn classify<'a>(&'a self, record: &LogRecord) -> Option<Classified<'a>> {
        if !self.is_relevant(record) {
            return None;
        }
        self.rules
            .iter()
            .find_map(|rule| rule.matches(record).map(|key| Classified { rule, key }))
    }
}
